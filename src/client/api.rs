use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::uploads::{ImageRule, UploadRejection};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum ClientError {
    Transport(reqwest::Error),
    Status { status: StatusCode, body: String },
    Upload(UploadRejection),
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "Request failed: {}", e),
            ClientError::Status { status, body } => write!(f, "API returned {}: {}", status, body),
            ClientError::Upload(rejection) => write!(f, "Upload rejected: {}", rejection),
            ClientError::Decode(e) => write!(f, "Failed to decode response: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e)
    }
}

impl From<UploadRejection> for ClientError {
    fn from(rejection: UploadRejection) -> Self {
        ClientError::Upload(rejection)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Access and refresh tokens shared by every clone of a client.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Tokens>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, access_token: impl Into<String>, refresh_token: impl Into<String>) {
        let mut tokens = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        tokens.access_token = Some(access_token.into());
        tokens.refresh_token = Some(refresh_token.into());
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Tokens::default();
    }

    pub fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    pub fn snapshot(&self) -> Tokens {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    api_base: String,
    tokens: TokenStore,
}

impl ApiClient {
    /// `base_url` is the server origin; requests go to `<base_url>/api/...`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: format!("{}/api", base_url.trim_end_matches('/')),
            tokens: TokenStore::new(),
        })
    }

    pub fn with_tokens(mut self, tokens: TokenStore) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let request = match self.tokens.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            debug!("Clearing stored tokens after 401");
            self.tokens.clear();
        }
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(self.http.get(self.url(path))).await?;
        Self::decode(response).await
    }

    pub async fn get_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.send(self.http.get(self.url(path)).query(query)).await?;
        Self::decode(response).await
    }

    /// Raw body, used for CSV exports.
    pub async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let response = self.send(self.http.get(self.url(path))).await?;
        Ok(response.text().await?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.http.post(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.http.patch(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send(self.http.delete(self.url(path))).await?;
        Ok(())
    }

    /// Exchanges credentials for a token pair and keeps it for later calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ClientError> {
        let pair: TokenPair = self
            .post("token", &Credentials { username, password })
            .await?;
        self.tokens.set(&pair.access_token, &pair.refresh_token);
        Ok(pair)
    }

    pub async fn refresh(&self) -> Result<TokenPair, ClientError> {
        let current = self.tokens.refresh_token().ok_or_else(|| ClientError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "No refresh token stored".to_string(),
        })?;
        let pair: TokenPair = self
            .post(
                "token/refresh",
                &RefreshBody {
                    refresh_token: &current,
                },
            )
            .await?;
        self.tokens.set(&pair.access_token, &pair.refresh_token);
        Ok(pair)
    }

    /// Checks the file against `rule` locally, then posts it as multipart field `field`.
    pub async fn upload_image<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        rule: ImageRule,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<T, ClientError> {
        rule.check(filename, content_type, bytes.len())?;

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part(field.to_string(), part);

        let response = self
            .send(self.http.post(self.url(path)).multipart(form))
            .await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::get,
        Json, Router,
    };

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_paths_join_onto_api_base() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.url("events"), "http://localhost:8000/api/events");
        assert_eq!(
            client.url("/projects/1/sync_state"),
            "http://localhost:8000/api/projects/1/sync_state"
        );
    }

    #[test]
    fn test_token_store_is_shared_across_clones() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        let clone = client.clone();

        client.tokens().set("access", "refresh");
        assert_eq!(clone.tokens().access_token().as_deref(), Some("access"));

        clone.tokens().clear();
        assert_eq!(client.tokens().snapshot(), Tokens::default());
    }

    #[tokio::test]
    async fn test_rejected_upload_never_reaches_network() {
        // Nothing listens on the discard port; a request would fail with Transport.
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let oversized = vec![0u8; ImageRule::COVER.max_bytes + 1];

        let err = client
            .upload_image::<serde_json::Value>(
                "projects/1/cover",
                "image",
                ImageRule::COVER,
                "cover.png",
                "image/png",
                oversized,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Upload(UploadRejection::TooLarge { .. })));

        let err = client
            .upload_image::<serde_json::Value>(
                "me/image",
                "image",
                ImageRule::PROFILE,
                "avatar.gif",
                "image/gif",
                vec![1, 2, 3],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Upload(UploadRejection::UnsupportedType { .. })));
    }

    #[tokio::test]
    async fn test_bearer_header_is_attached() {
        let router = Router::new().route(
            "/api/me",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({ "auth": auth }))
            }),
        );
        let client = ApiClient::new(&serve(router).await).unwrap();
        client.tokens().set("abc", "def");

        let body: serde_json::Value = client.get("me").await.unwrap();
        assert_eq!(body["auth"], "Bearer abc");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_tokens() {
        let router = Router::new().route(
            "/api/projects",
            get(|| async { (AxumStatus::UNAUTHORIZED, "expired") }),
        );
        let client = ApiClient::new(&serve(router).await).unwrap();
        client.tokens().set("stale", "stale-refresh");

        let err = client.get::<serde_json::Value>("projects").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(client.tokens().snapshot(), Tokens::default());
    }

    #[tokio::test]
    async fn test_other_errors_keep_tokens() {
        let router = Router::new().route(
            "/api/management",
            get(|| async { (AxumStatus::FORBIDDEN, "nope") }),
        );
        let client = ApiClient::new(&serve(router).await).unwrap();
        client.tokens().set("valid", "refresh");

        let err = client.get::<serde_json::Value>("management").await.unwrap_err();

        assert!(err.is_forbidden());
        assert_eq!(client.tokens().access_token().as_deref(), Some("valid"));
    }
}
