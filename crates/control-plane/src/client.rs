// HTTP client for the Vigil API with transparent token refresh
// Decision: A 401 triggers at most one refresh-and-retry per request
// Decision: Concurrent 401s share one in-flight refresh, keyed by the refresh token
// being exchanged, so a single-use refresh token is never presented twice

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;
use vigil_core::Role;

use crate::api::ErrorResponse;
use crate::auth::{routes::LoginResponse, TokenPair};

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("{status}: {message} ({code})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("not logged in")]
    NotLoggedIn,
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e.to_string())
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, ClientError>>>;

/// Authenticated API client. Clones share tokens and in-flight refreshes.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<Mutex<Option<TokenPair>>>,
    inflight: Arc<Mutex<HashMap<String, SharedRefresh>>>,
    refreshes: Arc<AtomicUsize>,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self::with_http(reqwest::Client::builder().build()?, base_url))
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: Arc::new(Mutex::new(None)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.tokens.lock().clone()
    }

    pub fn set_tokens(&self, tokens: TokenPair) {
        *self.tokens.lock() = Some(tokens);
    }

    /// Refresh exchanges this client has sent to the server
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        role_requested: Option<Role>,
    ) -> Result<LoginResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({
                "username": username,
                "password": password,
                "roleRequested": role_requested,
            }))
            .send()
            .await?;
        let login: LoginResponse = decode(response).await?;

        self.set_tokens(TokenPair {
            access_token: login.access_token.clone(),
            refresh_token: login.refresh_token.clone(),
            token_type: login.token_type.clone(),
            expires_in: login.expires_in,
        });
        Ok(login)
    }

    /// Revoke the current refresh token and forget the session
    pub async fn logout(&self) -> Result<(), ClientError> {
        let Some(tokens) = self.tokens.lock().take() else {
            return Ok(());
        };
        let response = self
            .http
            .post(self.url("/api/auth/logout"))
            .json(&json!({ "refreshToken": tokens.refresh_token }))
            .send()
            .await?;
        decode::<serde_json::Value>(response).await.map(|_| ())
    }

    /// Refresh now, joining any refresh already in flight
    pub async fn refresh(&self) -> Result<TokenPair, ClientError> {
        let current = self.tokens().ok_or(ClientError::NotLoggedIn)?;
        self.refresh_from(current.refresh_token).await
    }

    async fn refresh_from(&self, refresh_token: String) -> Result<TokenPair, ClientError> {
        let shared = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.get(&refresh_token) {
                existing.clone()
            } else {
                // Already rotated by an exchange that has finished
                if let Some(current) = self.tokens.lock().clone() {
                    if current.refresh_token != refresh_token {
                        return Ok(current);
                    }
                }

                let fut = self.exchange(refresh_token.clone()).boxed().shared();
                inflight.insert(refresh_token, fut.clone());
                fut
            }
        };
        shared.await
    }

    fn exchange(
        &self,
        refresh_token: String,
    ) -> impl std::future::Future<Output = Result<TokenPair, ClientError>> + Send + 'static {
        let http = self.http.clone();
        let url = self.url("/api/auth/refresh");
        let tokens = self.tokens.clone();
        let inflight = self.inflight.clone();
        let refreshes = self.refreshes.clone();

        async move {
            refreshes.fetch_add(1, Ordering::SeqCst);
            let result = match http
                .post(url)
                .json(&json!({ "refreshToken": refresh_token }))
                .send()
                .await
            {
                Ok(response) => decode::<TokenPair>(response).await,
                Err(e) => Err(e.into()),
            };

            {
                let mut stored = tokens.lock();
                let still_current = stored
                    .as_ref()
                    .is_some_and(|t| t.refresh_token == refresh_token);
                match &result {
                    Ok(pair) => *stored = Some(pair.clone()),
                    Err(ClientError::Api { status: 401, .. }) if still_current => *stored = None,
                    Err(_) => {}
                }
            }
            inflight.lock().remove(&refresh_token);
            result
        }
    }

    /// Send an authorized request, refreshing once on 401
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let tokens = self.tokens().ok_or(ClientError::NotLoggedIn)?;

        let response = self
            .request(method.clone(), path, &tokens.access_token, body)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }

        tracing::debug!(path, "Access token rejected, refreshing");
        let refreshed = self.refresh_from(tokens.refresh_token).await?;
        let response = self
            .request(method, path, &refreshed.access_token, body)
            .await?;
        decode(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json::<(), T>(Method::GET, path, None).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, Some(body)).await
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => (err.code, err.error),
        Err(_) => ("UNKNOWN".to_string(), body),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}
