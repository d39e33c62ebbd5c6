//! Gateway behaviour against a wiremock backend: envelopes, circuit breaker
//! and CSRF attachment.

use std::sync::Arc;
use std::time::Duration;

use coinwatch_client::error::{NETWORK_FAILURE, SERVICE_UNAVAILABLE};
use coinwatch_client::{
    ApiClient, ApiRequest, BreakerConfig, CircuitBreaker, ClientConfig, Failure, Url,
};
use http::StatusCode;
use reqwest::cookie::Jar;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(ClientConfig::new(server.uri())).unwrap()
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn success_returns_body_and_resets_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client.breaker().record_failure();
    client.breaker().record_failure();

    let response = client.gateway().request(ApiRequest::get(url(&server, "/ok"))).await;
    assert!(response.success);
    assert_eq!(response.data, Some(json!({"value": 7})));
    assert_eq!(client.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"detail": "invalid"})))
        .mount(&server)
        .await;

    let client = client(&server);
    let request = ApiRequest::post(url(&server, "/api/users/login/"))
        .with_body(json!({"username_or_email": "a", "password": "b"}))
        .without_refresh();
    let response = client.gateway().request(request).await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("invalid"));
    assert_eq!(response.data, Some(json!({"detail": "invalid"})));
    assert_eq!(response.failure, Some(Failure::Status(StatusCode::BAD_REQUEST)));
    assert_eq!(client.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn non_json_error_falls_back_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let response = client(&server)
        .gateway()
        .request(ApiRequest::get(url(&server, "/anything")))
        .await;
    assert_eq!(response.error.as_deref(), Some("HTTP 502"));
    assert_eq!(response.data, None);
}

#[tokio::test]
async fn request_body_is_sent_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/echo"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"a": [1, 2]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .gateway()
        .request(ApiRequest::put(url(&server, "/echo")).with_body(json!({"a": [1, 2]})))
        .await;
    assert!(response.success);
    assert_eq!(response.data, Some(serde_json::Value::Null));
}

#[tokio::test]
async fn fourth_call_short_circuits_then_recovers_after_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .expect(4)
        .mount(&server)
        .await;

    let mut config = ClientConfig::new(server.uri());
    config.breaker = BreakerConfig {
        max_consecutive_failures: 3,
        reset_after: Duration::from_millis(200),
    };
    let client = ApiClient::new(config).unwrap();
    let request = || ApiRequest::get(url(&server, "/flaky"));

    for _ in 0..3 {
        let response = client.gateway().request(request()).await;
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    let response = client.gateway().request(request()).await;
    assert_eq!(response.error.as_deref(), Some(SERVICE_UNAVAILABLE));
    assert_eq!(response.failure, Some(Failure::CircuitOpen));
    assert!(client.breaker().is_open());

    tokio::time::sleep(Duration::from_millis(250)).await;
    let response = client.gateway().request(request()).await;
    assert_eq!(response.error.as_deref(), Some("boom"));
    assert_eq!(client.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn breaker_is_shared_between_clients() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let breaker = CircuitBreaker::default();
    let first = ApiClient::builder(ClientConfig::new(server.uri()))
        .breaker(breaker.clone())
        .build()
        .unwrap();
    let second = ApiClient::builder(ClientConfig::new(server.uri()))
        .breaker(breaker.clone())
        .build()
        .unwrap();
    for _ in 0..3 {
        first.breaker().record_failure();
    }

    let response = second.gateway().request(ApiRequest::get(url(&server, "/x"))).await;
    assert_eq!(response.failure, Some(Failure::CircuitOpen));
}

#[tokio::test]
async fn transport_failure_is_counted() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = ApiClient::new(ClientConfig::new(format!("http://{address}"))).unwrap();
    let target = Url::parse(&format!("http://{address}/api/users/profile/")).unwrap();
    let response = client.gateway().request(ApiRequest::get(target)).await;

    assert_eq!(response.error.as_deref(), Some(NETWORK_FAILURE));
    assert_eq!(response.failure, Some(Failure::Transport));
    assert_eq!(client.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn unsafe_methods_fetch_csrf_token_when_cookie_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/csrf/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "from-endpoint"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/logout/"))
        .and(header("X-CSRFToken", "from-endpoint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "bye"})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).logout().await.unwrap();
}

#[tokio::test]
async fn csrf_cookie_wins_over_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/csrf/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "unused"})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/item"))
        .and(header("X-CSRFToken", "seeded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let jar = Arc::new(Jar::default());
    jar.add_cookie_str("csrftoken=seeded; Path=/", &url(&server, "/"));
    let client = ApiClient::builder(ClientConfig::new(server.uri()))
        .cookie_jar(jar)
        .build()
        .unwrap();

    assert_eq!(client.csrf().token_from_cookie(), "seeded");
    let response = client
        .gateway()
        .request(ApiRequest::delete(url(&server, "/item")))
        .await;
    assert!(response.success);
}

#[tokio::test]
async fn safe_methods_skip_csrf() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/csrf/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"csrfToken": "t"})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .gateway()
        .request(ApiRequest::get(url(&server, "/read")))
        .await;
    assert!(response.success);
}

#[tokio::test]
async fn ensure_csrf_falls_back_to_cookie_on_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/csrf/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let jar = Arc::new(Jar::default());
    jar.add_cookie_str("csrftoken=jar-token", &url(&server, "/"));
    let client = ApiClient::builder(ClientConfig::new(server.uri()))
        .cookie_jar(jar)
        .build()
        .unwrap();
    assert_eq!(client.csrf().ensure_csrf().await, "jar-token");

    let empty = ApiClient::new(ClientConfig::new(server.uri())).unwrap();
    assert_eq!(empty.csrf().ensure_csrf().await, "");
}
