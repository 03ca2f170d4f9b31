//! Feishu contact API client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use dirsync_core::{RemoteDepartment, RemoteDirectory, RemoteError, RemoteUser};

use crate::api::{Department, Envelope, Page, User};
use crate::auth::TokenCache;
use crate::config::FeishuConfig;

const DEPARTMENTS_PATH: &str = "/open-apis/contact/v3/departments/0/children";
const USERS_PATH: &str = "/open-apis/contact/v3/users/find_by_department";

/// Id of the organization root on the Feishu side.
const ROOT_DEPARTMENT_ID: &str = "0";

/// Response codes meaning the tenant access token is invalid or expired.
const TOKEN_INVALID_CODES: [i64; 3] = [99_991_661, 99_991_663, 99_991_668];

/// Client for the Feishu contact API.
#[derive(Debug)]
pub struct FeishuClient {
    http_client: reqwest::Client,
    token_cache: TokenCache,
    base_url: String,
    page_size: u32,
}

impl FeishuClient {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: FeishuConfig) -> Result<Self, RemoteError> {
        config
            .validate()
            .map_err(|e| RemoteError::Request(format!("invalid Feishu configuration: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Request(format!("Failed to create HTTP client: {e}")))?;

        let token_cache = TokenCache::new(
            http_client.clone(),
            config.base_url.clone(),
            config.app_id,
            config.app_secret,
        );

        Ok(Self {
            http_client,
            token_cache,
            base_url: config.base_url,
            page_size: config.page_size,
        })
    }

    /// Fetch one page, refreshing the token once if the API rejects it.
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let mut refreshed = false;

        loop {
            let token = self.token_cache.get_token().await?;
            let response = self
                .http_client
                .get(&url)
                .bearer_auth(&token)
                .query(query)
                .send()
                .await
                .map_err(|e| RemoteError::Request(format!("GET {path} failed: {e}")))?;

            let status = response.status();
            let envelope: Envelope<Page<T>> = match response.json().await {
                Ok(envelope) => envelope,
                Err(e) if status.is_success() => {
                    return Err(RemoteError::Payload(format!(
                        "Failed to parse response of {path}: {e}"
                    )))
                }
                Err(_) => {
                    return Err(RemoteError::Request(format!(
                        "GET {path} failed with status {status}"
                    )))
                }
            };

            if TOKEN_INVALID_CODES.contains(&envelope.code) && !refreshed {
                warn!(code = envelope.code, "Access token rejected, refreshing");
                self.token_cache.invalidate().await;
                refreshed = true;
                continue;
            }
            if envelope.code != 0 {
                return Err(RemoteError::Api {
                    code: envelope.code,
                    message: envelope.msg,
                });
            }

            return envelope
                .data
                .ok_or_else(|| RemoteError::Payload(format!("response of {path} has no data")));
        }
    }

    /// Follow `page_token` until the listing is exhausted.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = query.to_vec();
            params.push(("page_size", self.page_size.to_string()));
            if let Some(token) = &page_token {
                params.push(("page_token", token.clone()));
            }

            let page: Page<T> = self.get_page(path, &params).await?;
            items.extend(page.items);

            if !page.has_more {
                return Ok(items);
            }
            match page.page_token.filter(|t| !t.is_empty()) {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next);
                }
                _ => {
                    return Err(RemoteError::Payload(format!(
                        "listing of {path} reports more pages without a new page token"
                    )))
                }
            }
        }
    }

    async fn department_users(&self, department_id: &str) -> Result<Vec<User>, RemoteError> {
        let query = [
            ("department_id", department_id.to_string()),
            ("department_id_type", "department_id".to_string()),
            ("user_id_type", "user_id".to_string()),
        ];
        self.list_all(USERS_PATH, &query).await
    }
}

#[async_trait]
impl RemoteDirectory for FeishuClient {
    #[instrument(skip(self))]
    async fn get_all_departments(&self) -> Result<Vec<RemoteDepartment>, RemoteError> {
        let query = [
            ("fetch_child", "true".to_string()),
            ("department_id_type", "department_id".to_string()),
        ];
        let departments: Vec<Department> = self.list_all(DEPARTMENTS_PATH, &query).await?;

        info!(count = departments.len(), "Fetched departments");
        Ok(departments.into_iter().map(RemoteDepartment::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_all_users(&self) -> Result<Vec<RemoteUser>, RemoteError> {
        let mut department_ids: Vec<String> = self
            .get_all_departments()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        department_ids.push(ROOT_DEPARTMENT_ID.to_string());

        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for department_id in &department_ids {
            let listed = self.department_users(department_id).await?;
            debug!(department_id = %department_id, count = listed.len(), "Fetched department users");
            for user in listed {
                if user.union_id.is_empty() || seen.insert(user.union_id.clone()) {
                    users.push(RemoteUser::from(user));
                }
            }
        }

        info!(count = users.len(), "Fetched users");
        Ok(users)
    }
}
