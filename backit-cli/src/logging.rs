use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use task_local_extensions::Extensions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs every request to the identity backend and the status it answered with.
/// Error statuses are passed on, it's up to the caller to interpret them.
pub(crate) struct LogRequestsMiddleware;

#[async_trait::async_trait]
impl Middleware for LogRequestsMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        tracing::info!(
            url = %req.url(),
            method = %req.method(),
            "Running request"
        );
        match next.run(req, extensions).await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_client_error() {
                    tracing::warn!(?status, "Client error on response");
                } else if status.is_server_error() {
                    tracing::error!(?status, "Server error on response");
                } else {
                    let content_length = resp.content_length();
                    tracing::info!(?status, ?content_length, "Got response");
                }
                Ok(resp)
            }
            Err(e) => {
                tracing::error!(%e, "Request failed");
                Err(e)
            }
        }
    }
}

pub fn setup_tracing(ansi: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(ansi)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::from_default_env())
        .init();
}
