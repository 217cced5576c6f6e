use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep};

use crate::config::ServerConfig;
use crate::error::RelayError;

static RUSTLS_PROVIDER_INIT: Once = Once::new();

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
) -> Result<reqwest::Client, RelayError> {
    // No client-wide timeout: it would also cap how long a stream may run.
    reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the completion service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with connection pooling and timeouts from the server config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the underlying client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        RUSTLS_PROVIDER_INIT.call_once(|| {
            let _ = rustls::crypto::ring::default_provider().install_default();
        });

        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.connect_timeout_secs),
        )?;
        Ok(Self { client })
    }

    /// POST `body` to `url`. Any status is returned as a response; only
    /// failures to get a response at all are errors.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] on connect failure, TLS
    /// failure, or when `timeout` elapses before response headers arrive.
    pub async fn post(
        &self,
        url: &url::Url,
        headers: &http::HeaderMap,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = reqwest::Request::new(http::Method::POST, url.clone());
        *request.headers_mut() = headers.clone();
        *request.body_mut() = Some(reqwest::Body::from(body));
        *request.timeout_mut() = timeout;

        self.client
            .execute(request)
            .await
            .map_err(|err| RelayError::UpstreamUnavailable(describe_reqwest_error(&err)))
    }
}

pub(crate) fn describe_reqwest_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("Upstream request timed out: {err}")
    } else if err.is_connect() {
        format!("Failed to connect to upstream: {err}")
    } else {
        format!("Upstream request failed: {err}")
    }
}

pin_project! {
    /// Byte stream that fails when no chunk arrives within `idle`.
    ///
    /// The timer restarts on every chunk. After a timeout or an inner error
    /// the stream ends.
    pub struct IdleTimeout<S> {
        #[pin]
        inner: S,
        #[pin]
        sleep: Sleep,
        idle: Duration,
        done: bool,
    }
}

impl<S> IdleTimeout<S> {
    pub fn new(inner: S, idle: Duration) -> Self {
        Self {
            inner,
            sleep: tokio::time::sleep(idle),
            idle,
            done: false,
        }
    }
}

impl<S, E> Stream for IdleTimeout<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = Result<Bytes, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let deadline = Instant::now() + *this.idle;
                this.sleep.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.done = true;
                Poll::Ready(Some(Err(RelayError::UpstreamUnavailable(format!(
                    "Upstream stream read failed: {err}"
                )))))
            }
            Poll::Ready(None) => {
                *this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => match this.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    *this.done = true;
                    Poll::Ready(Some(Err(RelayError::UpstreamUnavailable(format!(
                        "Upstream sent no data for {}s",
                        this.idle.as_secs()
                    )))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
