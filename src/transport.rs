use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::PortalSection;
use crate::error::TransportError;

/// The authenticated channel to the portal. Implementations carry the
/// session cookies; the view token travels inside each form body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET the full benefits page (baseline render).
    async fn fetch_page(&self) -> Result<String, TransportError>;

    /// POST one partial/ajax form and return the raw `<partial-response>`.
    async fn submit(&self, form: &[(String, String)]) -> Result<String, TransportError>;
}

/// reqwest-backed transport. Requests are serialised behind one in-flight
/// lock: the portal has a single active view per session.
pub struct HttpTransport {
    http: reqwest::Client,
    page_url: Url,
    in_flight: Mutex<()>,
    connect_retries: u32,
    connect_backoff: Duration,
}

impl HttpTransport {
    pub fn new(portal: &PortalSection) -> anyhow::Result<Self> {
        let page_url = Url::parse(&portal.page_url)?;

        let jar = Jar::default();
        for cookie in portal.cookie.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            jar.add_cookie_str(cookie, &page_url);
        }

        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let http = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .default_headers(headers)
            .user_agent(portal.user_agent.clone())
            .timeout(portal.request_timeout())
            .build()?;

        Ok(Self {
            http,
            page_url,
            in_flight: Mutex::new(()),
            connect_retries: portal.connect_retries,
            connect_backoff: portal.connect_backoff(),
        })
    }

    /// Retries only failures where the request never left this machine.
    /// Anything that might have reached the portal is returned to the caller,
    /// which owns the decision about the session token.
    async fn with_connect_retry<F, Fut>(&self, what: &str, mut send: F) -> Result<String, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let _guard = self.in_flight.lock().await;
        let mut attempt = 0;
        loop {
            match send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(TransportError::Status(status.as_u16()));
                    }
                    let body = resp.text().await.map_err(TransportError::from_reqwest)?;
                    debug!(what, status = %status, body_len = body.len(), "portal response");
                    return Ok(body);
                }
                Err(e) => {
                    let err = TransportError::from_reqwest(e);
                    if !matches!(err, TransportError::Connect(_)) || attempt >= self.connect_retries {
                        return Err(err);
                    }
                    let backoff = connect_backoff(self.connect_backoff, attempt);
                    attempt += 1;
                    warn!(
                        what,
                        attempt,
                        retries = self.connect_retries,
                        error = %err,
                        "Connection failed, backing off {:.1}s",
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_page(&self) -> Result<String, TransportError> {
        self.with_connect_retry("page", || self.http.get(self.page_url.clone()).send())
            .await
    }

    async fn submit(&self, form: &[(String, String)]) -> Result<String, TransportError> {
        self.with_connect_retry("partial", || {
            self.http
                .post(self.page_url.clone())
                .header(
                    CONTENT_TYPE,
                    "application/x-www-form-urlencoded; charset=UTF-8",
                )
                .header("Faces-Request", "partial/ajax")
                .form(form)
                .send()
        })
        .await
    }
}

/// Doubling backoff after the `attempt`-th refused connection, saturating
/// instead of overflowing for large retry counts.
fn connect_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
