//! [IdentityProvider] implementation talking to the identity backend over HTTP

use crate::{
    api::{AvailabilityResponse, EmailChangeRequest, ErrorResponse, ReauthenticateRequest},
    logging::LogRequestsMiddleware,
    settings::Settings,
};
use anyhow::Result;
use async_trait::async_trait;
use backit_core::{
    account::{AccountSnapshot, RefreshedAccount},
    AuthError, IdentityProvider,
};
use reqwest::{Client, Method, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::RetryTransientMiddleware;
use retry_policies::policies::ExponentialBackoffBuilder;
use serde::de::DeserializeOwned;
use url::Url;

/// Identity provider backed by the backit identity backend's HTTP API
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: ClientWithMiddleware,
    /// Never retries, for requests that mustn't happen twice
    once_client: ClientWithMiddleware,
    api_endpoint: Url,
    session_token: Option<String>,
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("api_endpoint", &self.api_endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpIdentityProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        let once_client = ClientBuilder::new(client.clone())
            .with(LogRequestsMiddleware)
            .build();

        let client = ClientBuilder::new(client)
            .with(LogRequestsMiddleware)
            .with(RetryTransientMiddleware::new_with_policy(
                ExponentialBackoffBuilder::default().build_with_max_retries(settings.max_retries),
            ))
            .build();

        Ok(Self {
            client,
            once_client,
            api_endpoint: settings.api_endpoint.clone(),
            session_token: settings.session_token.clone(),
        })
    }

    fn server_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_with(&self.client, method, path)
    }

    /// A request that's sent at most once, even if it fails transiently.
    /// Used for requests that send emails or count sign-in attempts.
    fn server_request_once(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_with(&self.once_client, method, path)
    }

    fn request_with(
        &self,
        client: &ClientWithMiddleware,
        method: Method,
        path: &str,
    ) -> RequestBuilder {
        let mut url = self.api_endpoint.clone();
        url.set_path(path);
        let request = client.request(method, url);
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AuthError> {
        let response = request.send().await.map_err(transport_error)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AuthError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::Unknown(format!("Unexpected response body: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[tracing::instrument(skip(self))]
    async fn current_account(&self) -> Result<AccountSnapshot, AuthError> {
        self.send_json(self.server_request(Method::GET, "/api/v0/account"))
            .await
    }

    #[tracing::instrument(skip(self, password))]
    async fn reauthenticate(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.send(
            self.server_request_once(Method::POST, "/api/v0/auth/reauthenticate")
                .json(&ReauthenticateRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                }),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn unlink_provider(&self, provider_id: &str) -> Result<(), AuthError> {
        self.send(self.server_request(
            Method::DELETE,
            &format!("/api/v0/account/providers/{provider_id}"),
        ))
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn send_verification_for_email_change(&self, new_email: &str) -> Result<(), AuthError> {
        self.send(
            self.server_request_once(Method::POST, "/api/v0/account/email/verify")
                .json(&EmailChangeRequest {
                    email: new_email.to_string(),
                }),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn check_email_available(&self, email: &str) -> Result<bool, AuthError> {
        let response: AvailabilityResponse = self
            .send_json(
                self.server_request(Method::GET, "/api/v0/account/email/available")
                    .query(&[("email", email)]),
            )
            .await?;
        Ok(response.available)
    }

    #[tracing::instrument(skip(self))]
    async fn refresh_account(&self) -> Result<RefreshedAccount, AuthError> {
        self.send_json(self.server_request(Method::POST, "/api/v0/account/refresh"))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), AuthError> {
        self.send(self.server_request(Method::POST, "/api/v0/auth/sign-out"))
            .await?;
        Ok(())
    }
}

fn transport_error(err: reqwest_middleware::Error) -> AuthError {
    match err {
        reqwest_middleware::Error::Reqwest(e) if e.is_connect() || e.is_timeout() => {
            AuthError::Network(e.to_string())
        }
        other => AuthError::Unknown(other.to_string()),
    }
}

async fn check_status(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::Credential),
        StatusCode::CONFLICT => Err(AuthError::Conflict),
        _ => {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.describe())
                .map_or_else(String::new, |d| format!(": {d}"));
            Err(AuthError::Unknown(format!("status code {status}{detail}")))
        }
    }
}
