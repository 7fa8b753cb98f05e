//! Credentials follow the logged-in session

use agora_client::HttpResourceClient;
use agora_sdk::{AgoraConfig, Platform, Session};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

struct NoToken;

impl Match for NoToken {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("X-User-Token")
    }
}

async fn options_for(server: &MockServer, matcher: impl Match + 'static, post: bool) {
    let body = if post {
        json!({"GET": {}, "POST": {}})
    } else {
        json!({"GET": {}})
    };
    Mock::given(method("OPTIONS"))
        .and(path("/rates/"))
        .and(matcher)
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_switches_token_header() {
    let server = MockServer::start().await;
    options_for(&server, NoToken, false).await;
    options_for(&server, header("X-User-Token", "token-a"), true).await;
    options_for(&server, header("X-User-Token", "token-b"), true).await;

    let config = AgoraConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let client = HttpResourceClient::new(config.client_config()).unwrap();
    let platform = Platform::new(config, Arc::new(client));

    assert!(!platform.permissions().can_post("/rates/").await.unwrap());

    platform.login(Session::authenticated("/principals/users/0000001/", "token-a"));
    assert!(platform.permissions().can_post("/rates/").await.unwrap());

    platform.login(Session::authenticated("/principals/users/0000002/", "token-b"));
    assert!(platform.permissions().can_post("/rates/").await.unwrap());
}

#[tokio::test]
async fn logout_drops_token() {
    let server = MockServer::start().await;
    options_for(&server, header("X-User-Token", "token-a"), true).await;
    options_for(&server, NoToken, false).await;

    let config = AgoraConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let client = HttpResourceClient::new(config.client_config()).unwrap();
    let platform = Platform::new(config, Arc::new(client));

    platform.login(Session::authenticated("/principals/users/0000001/", "token-a"));
    assert!(platform.permissions().can_post("/rates/").await.unwrap());

    platform.logout();
    assert!(!platform.permissions().can_post("/rates/").await.unwrap());
}
