#![allow(dead_code, clippy::unwrap_used)]

use anyhow::Result;
use asashio::{
    api::{
        self,
        state::{AppState, AuthConfig},
    },
    auth::{KeyPair, SessionClaims, TokenService, USER_AUDIENCE},
    identity::{Identity, IdentityStore, MemoryStore, Role, Status},
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub tokens: Arc<TokenService>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new(config: AuthConfig) -> Result<Self> {
        let tokens = Arc::new(TokenService::new(KeyPair::from_private_pem(
            SIGNING_KEY_PEM,
        )?)?);
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(config, Arc::clone(&tokens), store.clone()));
        Ok(Self {
            router: api::router(Arc::clone(&state)),
            state,
            tokens,
            store,
        })
    }

    /// Persist an identity directly, bypassing registration.
    pub async fn seed(&self, username: &str, role: Role, status: Status) -> Result<Identity> {
        let mut identity = Identity::new(
            username.to_string(),
            format!("{username}@example.com"),
            String::new(),
        );
        identity.role = role;
        identity.status = status;
        self.store.save(&identity).await
    }

    /// `Cookie` header value for a fresh session of `id`.
    pub fn session_cookie(&self, id: i64) -> Result<String> {
        let token = self.tokens.issue(
            &SessionClaims { id },
            USER_AUDIENCE,
            Duration::from_secs(3600),
        )?;
        Ok(format!("token={token}"))
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        use tower::ServiceExt;
        Ok(self.router.clone().oneshot(request).await?)
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_empty(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The `name=value` part of the response's `Set-Cookie` header.
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    value.split(';').next().map(str::to_string)
}
