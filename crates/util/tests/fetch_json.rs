use reqwest::StatusCode;
use serde_json::json;
use settle_api::ControlPlaneClient;
use settle_util::http::{FetchError, fetch_json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> ControlPlaneClient {
    ControlPlaneClient::new(&server.uri(), Some("test-token")).expect("client for mock server")
}

#[tokio::test]
async fn fetch_json_decodes_success_body_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/requests/r-1/status"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "metadata": { "status": "RUNNING" } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let payload = fetch_json(&client, "/requests/r-1/status").await.expect("payload");
    assert_eq!(payload["metadata"]["status"], json!("RUNNING"));
}

#[tokio::test]
async fn fetch_json_reports_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shares/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "httpStatus": 404,
            "messages": [{ "errorCode": "309", "message": "Resource does not exist" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = fetch_json(&client, "/shares/gone").await.expect_err("not found");
    assert!(error.is_not_found());
    match error {
        FetchError::Status { status, message, .. } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message.as_deref(), Some("Resource does not exist"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_json_treats_empty_body_as_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let payload = fetch_json(&client, "/empty").await.expect("empty body");
    assert!(payload.is_null());
}

#[tokio::test]
async fn fetch_json_surfaces_malformed_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = fetch_json(&client, "/html").await.expect_err("html is not json");
    assert!(matches!(error, FetchError::Parse(_)), "{error:?}");
    assert_eq!(error.status(), None);
}

#[tokio::test]
async fn fetch_json_rejects_references_on_foreign_hosts() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let error = fetch_json(&client, "https://elsewhere.example.com/requests/1/status")
        .await
        .expect_err("foreign host");
    assert!(matches!(error, FetchError::Reference(_)), "{error:?}");
}
