mod common;

use anyhow::Result;
use asashio::api::state::AuthConfig;
use common::TestApp;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[tokio::test]
async fn browser_style_session_over_http() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let app = TestApp::new(AuthConfig::new(base_url.clone()))?;
    let router = app.router.clone();
    let server = tokio::spawn(async move { axum::serve(listener, router.into_make_service()).await });

    let client = reqwest::Client::builder().cookie_store(true).build()?;

    let response = client
        .post(format!("{base_url}/api/v1/user/register"))
        .json(&json!({"username": "heidi", "email": "heidi@example.com", "password": "open sesame"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(format!("{base_url}/api/v1/user/login"))
        .json(&json!({"username": "heidi", "password": "open sesame"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // the cookie jar now carries the session
    let response = client
        .get(format!("{base_url}/api/v1/user/info"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["data"]["username"], "heidi");

    let response = client
        .post(format!("{base_url}/api/v1/user/logout"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{base_url}/api/v1/user/info"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = client
        .get(format!("{base_url}/.well-known/openid-configuration"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["issuer"], base_url.as_str());

    server.abort();
    Ok(())
}
