use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{
    cookie::{CookieStore, Jar},
    Client, Method, Response, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::credentials::CredentialStore;
use crate::domain::RefreshResponse;
use crate::error::{ApiError, RefreshError};

const REFRESH_PATH: &str = "/auth/refresh-token";

/// A request that can be sent again verbatim after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Decode(format!("failed to encode {} body: {}", self, e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Which response status means "the access token is stale, renew it".
///
/// The service answers 403 for expired or invalid tokens. Any other status,
/// including other 4xx codes, is surfaced to the caller untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    stale_token_status: StatusCode,
}

impl RefreshPolicy {
    pub fn new(stale_token_status: StatusCode) -> Self {
        Self { stale_token_status }
    }

    /// Build a policy from a raw status code, e.g. from a config file.
    pub fn from_code(code: u16) -> Result<Self, ApiError> {
        StatusCode::from_u16(code)
            .map(Self::new)
            .map_err(|e| ApiError::Config(format!("refresh status {}: {}", code, e)))
    }

    pub fn is_stale(&self, status: StatusCode) -> bool {
        status == self.stale_token_status
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }
}

#[derive(Deserialize)]
struct ServerMessage {
    message: String,
}

type RefreshHandle = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// HTTP transport that attaches the bearer token and renews it when the
/// server reports it stale.
///
/// At most one refresh call is in flight at any time. Requests rejected while
/// a refresh is pending subscribe to it and replay (or fail) once it settles.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    client: Client,
    base_url: String,
    jar: Arc<Jar>,
    store: CredentialStore,
    policy: RefreshPolicy,
    in_flight: Arc<Mutex<Option<RefreshHandle>>>,
}

impl AuthenticatedTransport {
    pub fn new(
        base_url: &str,
        store: CredentialStore,
        policy: RefreshPolicy,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let refresh_url = Url::parse(&format!("{}{}", base_url, REFRESH_PATH))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let jar = Arc::new(Jar::default());
        for (name, value) in store.renewal_cookies() {
            jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &refresh_url);
        }

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            jar,
            store,
            policy,
            in_flight: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.endpoint(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        builder
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("failed to call {}: {}", request, e)))
    }

    /// Send an authenticated request and return the successful response.
    ///
    /// Fails with [`ApiError::Unauthenticated`] without touching the network
    /// when no session exists.
    #[instrument(name = "AuthenticatedTransport::send", skip(self, request), fields(call = %request))]
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let token = self
            .store
            .access_token()
            .ok_or(ApiError::Unauthenticated)?;

        let response = self.dispatch(request, Some(&token)).await?;
        if !self.policy.is_stale(response.status()) {
            return check_status(response).await;
        }

        tracing::debug!("access token rejected, renewing session");
        let renewed = self.renewed_token(&token).await?;

        tracing::debug!("replaying request with renewed token");
        let response = self.dispatch(request, Some(&renewed)).await?;
        check_status(response).await
    }

    pub async fn json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn empty(&self, request: &ApiRequest) -> Result<(), ApiError> {
        let response = self.send(request).await?;
        response.bytes().await?;
        Ok(())
    }

    /// Send a request without credentials (login, register).
    pub async fn public_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        let response = check_status(self.dispatch(request, None).await?).await?;
        let body = response.json::<T>().await?;
        self.sync_renewal_cookies();
        Ok(body)
    }

    /// The token to replay with after `rejected` was refused.
    ///
    /// If the store already holds a different token, a refresh settled since
    /// `rejected` was read and that token is used directly. Otherwise the
    /// caller joins the pending refresh or starts one.
    async fn renewed_token(&self, rejected: &str) -> Result<String, ApiError> {
        let handle = {
            let mut slot = self.in_flight.lock().await;
            match self.store.access_token() {
                None => return Err(ApiError::Unauthenticated),
                Some(current) if current != rejected => return Ok(current),
                Some(_) => {}
            }

            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("joining pending session renewal");
                    pending.clone()
                }
                None => {
                    let handle = self.clone().refresh_cycle().boxed().shared();
                    *slot = Some(handle.clone());
                    handle
                }
            }
        };

        handle.await.map_err(|e| {
            tracing::debug!("session renewal failed: {}", e);
            ApiError::Unauthenticated
        })
    }

    /// One refresh call. Clears the session on failure and empties the
    /// in-flight slot once the store reflects the outcome.
    #[instrument(name = "AuthenticatedTransport::refresh", skip(self))]
    async fn refresh_cycle(self) -> Result<String, RefreshError> {
        let outcome = self.request_new_token().await;
        match &outcome {
            Ok(_) => tracing::debug!("session renewed"),
            Err(e) => {
                tracing::warn!("Session renewal failed, signing out: {}", e);
                self.store.clear();
            }
        }

        self.in_flight.lock().await.take();
        outcome
    }

    async fn request_new_token(&self) -> Result<String, RefreshError> {
        let response = self
            .client
            .post(self.endpoint(REFRESH_PATH))
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RefreshError::Rejected(response.status().as_u16()));
        }

        let body = response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))?;

        let credential = self
            .store
            .replace_token(body.access_token)
            .ok_or(RefreshError::NoSession)?;
        self.sync_renewal_cookies();
        Ok(credential.access_token)
    }

    /// Persist the cookies the jar would send to the refresh endpoint, so the
    /// renewal credential outlives the process.
    fn sync_renewal_cookies(&self) {
        let Ok(refresh_url) = Url::parse(&self.endpoint(REFRESH_PATH)) else {
            return;
        };
        let Some(header_value) = self.jar.cookies(&refresh_url) else {
            return;
        };
        let Ok(header) = header_value.to_str() else {
            tracing::warn!("Ignoring non-ASCII cookie header from cookie jar");
            return;
        };

        let mut cookies = header
            .split(';')
            .filter_map(|segment| {
                let mut parts = segment.trim().splitn(2, '=');
                let name = parts.next()?.trim();
                let value = parts.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.to_string()))
            })
            .collect::<Vec<_>>();
        cookies.sort_by(|a, b| a.0.cmp(&b.0));

        if cookies != self.store.renewal_cookies() {
            self.store.set_renewal_cookies(&cookies);
        }
    }
}

impl fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .field("store", &self.store)
            .finish()
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::ServerRejected {
        status: status.as_u16(),
        message: server_message(&body, status),
    })
}

fn server_message(body: &str, status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ServerMessage>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
