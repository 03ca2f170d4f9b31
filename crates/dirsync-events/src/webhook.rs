//! Webhook intake.
//!
//! Decodes the narrow subset of the Feishu event callback the engine acts
//! on. Anything else is ignored: an unexpected shape never mutates a store.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::handler::{DeletionOutcome, IdentityEventHandler};

/// Event type that triggers a deletion.
pub const USER_DELETED_EVENT: &str = "contact.user.deleted_v3";

const URL_VERIFICATION: &str = "url_verification";

#[derive(Debug, Default, Deserialize)]
struct WebhookBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    challenge: Option<String>,
    token: Option<String>,
    header: Option<EventHeader>,
    event: Option<EventBody>,
    encrypt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EventHeader {
    event_id: Option<String>,
    event_type: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EventBody {
    union_id: Option<String>,
    object: Option<EventObject>,
}

#[derive(Debug, Default, Deserialize)]
struct EventObject {
    union_id: Option<String>,
}

impl WebhookBody {
    fn token(&self) -> Option<&str> {
        self.header
            .as_ref()
            .and_then(|h| h.token.as_deref())
            .or(self.token.as_deref())
    }

    fn event_type(&self) -> Option<&str> {
        self.header.as_ref().and_then(|h| h.event_type.as_deref())
    }

    fn union_id(&self) -> Option<&str> {
        let event = self.event.as_ref()?;
        event
            .union_id
            .as_deref()
            .or_else(|| event.object.as_ref().and_then(|o| o.union_id.as_deref()))
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Result of dispatching one webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// URL verification handshake; the challenge must be echoed back.
    Challenge(String),
    /// A deletion event was handed to the handler.
    Processed(DeletionOutcome),
    /// The handler failed; the error has been logged.
    Failed(String),
    /// Not an event this service acts on.
    Ignored(String),
    /// The verification token did not match.
    Rejected,
}

/// Routes webhook payloads to an [`IdentityEventHandler`].
pub struct WebhookDispatcher {
    handler: Arc<dyn IdentityEventHandler>,
    verification_token: Option<SecretString>,
}

impl WebhookDispatcher {
    pub fn new(handler: Arc<dyn IdentityEventHandler>) -> Self {
        Self {
            handler,
            verification_token: None,
        }
    }

    /// Only accept payloads carrying this token.
    #[must_use]
    pub fn with_verification_token(mut self, token: SecretString) -> Self {
        self.verification_token = Some(token);
        self
    }

    fn token_matches(&self, body: &WebhookBody) -> bool {
        match &self.verification_token {
            None => true,
            Some(expected) => body
                .token()
                .is_some_and(|token| constant_time_eq(token, expected.expose_secret())),
        }
    }

    /// Handle one webhook body. Never fails: problems are logged and
    /// reported through the outcome.
    #[instrument(skip(self, body), fields(len = body.len()))]
    pub async fn dispatch(&self, body: &[u8]) -> WebhookOutcome {
        let payload: WebhookBody = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed webhook payload");
                return WebhookOutcome::Ignored("malformed payload".to_string());
            }
        };

        if payload.encrypt.is_some() {
            warn!("Ignoring encrypted webhook payload");
            return WebhookOutcome::Ignored("encrypted payloads are not supported".to_string());
        }

        if !self.token_matches(&payload) {
            warn!("Rejecting webhook with mismatched verification token");
            return WebhookOutcome::Rejected;
        }

        if payload.kind.as_deref() == Some(URL_VERIFICATION) {
            return match payload.challenge {
                Some(challenge) => {
                    info!("Answering URL verification challenge");
                    WebhookOutcome::Challenge(challenge)
                }
                None => WebhookOutcome::Ignored("verification without challenge".to_string()),
            };
        }

        let event_id = payload
            .header
            .as_ref()
            .and_then(|h| h.event_id.as_deref())
            .unwrap_or_default();

        match payload.event_type() {
            Some(USER_DELETED_EVENT) => {}
            Some(other) => {
                debug!(event_id, event_type = other, "Ignoring event type");
                return WebhookOutcome::Ignored(format!("event type {other} not handled"));
            }
            None => {
                debug!("Ignoring payload without event type");
                return WebhookOutcome::Ignored("missing event type".to_string());
            }
        }

        let Some(union_id) = payload.union_id() else {
            warn!(event_id, "Deletion event without union id");
            return WebhookOutcome::Ignored("missing union id".to_string());
        };

        match self.handler.user_deleted(union_id).await {
            Ok(outcome) => {
                info!(event_id, union_id, ?outcome, "Deletion event processed");
                WebhookOutcome::Processed(outcome)
            }
            Err(e) => {
                error!(event_id, union_id, error = %e, "Deletion event failed");
                WebhookOutcome::Failed(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("verification_token", &self.verification_token.as_ref().map(|_| "***REDACTED***"))
            .finish_non_exhaustive()
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
