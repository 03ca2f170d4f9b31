//! FeishuClient tests against a wiremock server.

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dirsync_connector_feishu::{FeishuClient, FeishuConfig};
use dirsync_core::{RemoteDirectory, RemoteError};

const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
const DEPARTMENTS_PATH: &str = "/open-apis/contact/v3/departments/0/children";
const USERS_PATH: &str = "/open-apis/contact/v3/users/find_by_department";

fn client(server: &MockServer) -> FeishuClient {
    FeishuClient::new(FeishuConfig::new("cli_test", "secret").with_base_url(server.uri())).unwrap()
}

fn page(items: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "code": 0,
        "msg": "success",
        "data": {
            "has_more": next.is_some(),
            "page_token": next,
            "items": items,
        }
    })
}

fn dept(id: &str, parent: &str, name: &str) -> Value {
    json!({
        "department_id": id,
        "parent_department_id": parent,
        "name": name,
        "open_department_id": format!("od-{id}"),
    })
}

fn user(user_id: &str, union_id: &str, email: &str, departments: &[&str]) -> Value {
    json!({
        "user_id": user_id,
        "union_id": union_id,
        "open_id": format!("ou_{user_id}"),
        "name": format!("User {user_id}"),
        "email": email,
        "mobile": "+8613800000000",
        "department_ids": departments,
    })
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": "t-abc",
            "expire": 7200,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_departments(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(DEPARTMENTS_PATH))
        .and(query_param("fetch_child", "true"))
        .and(query_param_is_missing("page_token"))
        .and(header("authorization", "Bearer t-abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![dept("d1", "0", "R&D")], Some("p2"))),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(DEPARTMENTS_PATH))
        .and(query_param("page_token", "p2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![dept("d2", "d1", "Platform")], None)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_departments_follow_pagination() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_departments(&server).await;

    let departments = client(&server).get_all_departments().await.unwrap();

    assert_eq!(departments.len(), 2);
    assert_eq!(departments[0].id, "d1");
    assert_eq!(departments[0].parent_id, "0");
    assert_eq!(departments[1].id, "d2");
    assert_eq!(departments[1].parent_id, "d1");
    assert_eq!(departments[1].name, "Platform");
}

#[tokio::test]
async fn test_users_are_listed_per_department_and_deduplicated() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_departments(&server).await;

    let mut alice = user("u1", "on_1", "alice@example.com", &["d1", "d2"]);
    alice["en_name"] = json!("Alice");
    for department_id in ["d1", "d2"] {
        Mock::given(method("GET"))
            .and(path(USERS_PATH))
            .and(query_param("department_id", department_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![alice.clone()], None)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .and(query_param("department_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![user("u2", "on_2", "", &["0"])],
            None,
        )))
        .mount(&server)
        .await;

    let users = client(&server).get_all_users().await.unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[0].union_id, "on_1");
    assert_eq!(users[0].username, "alice");
    assert_eq!(users[0].department_ids, vec!["d1".to_string(), "d2".to_string()]);
    assert_eq!(users[0].given_name.as_deref(), Some("Alice"));
    assert_eq!(users[1].username, "u2");
    assert_eq!(users[1].given_name, None);
}

#[tokio::test]
async fn test_api_error_code_is_reported() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(DEPARTMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 40004,
            "msg": "no dept authority error",
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_all_departments().await.unwrap_err();

    match err {
        RemoteError::Api { code, message } => {
            assert_eq!(code, 40004);
            assert!(message.contains("authority"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;

    Mock::given(method("GET"))
        .and(path(DEPARTMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 99991663,
            "msg": "invalid access token",
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DEPARTMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![dept("d1", "0", "R&D")], None)))
        .with_priority(2)
        .mount(&server)
        .await;

    let departments = client(&server).get_all_departments().await.unwrap();
    assert_eq!(departments.len(), 1);
}

#[tokio::test]
async fn test_token_is_cached_across_calls() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_departments(&server).await;

    let client = client(&server);
    client.get_all_departments().await.unwrap();
    client.get_all_departments().await.unwrap();
}

#[tokio::test]
async fn test_token_request_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 10003,
            "msg": "invalid app_id",
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_all_departments().await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)));
}

#[tokio::test]
async fn test_more_pages_without_token_is_payload_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(DEPARTMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "has_more": true, "items": [] }
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_all_departments().await.unwrap_err();
    assert!(matches!(err, RemoteError::Payload(_)));
}
