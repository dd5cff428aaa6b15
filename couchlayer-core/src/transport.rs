//! Resilient request execution.
//!
//! [`Transport`] is the single path from the client to the network. It resolves a
//! [`RequestPath`] against the service endpoint, serializes the body, and sends
//! the request through an [`HttpBackend`] with a bounded number of attempts:
//!
//! - a response with a status below 500 is returned immediately, whatever it is
//! - a 5xx response or a failed send is retried after `retry_delay`
//! - when attempts run out, the last 5xx response is returned as is, while a
//!   failed send becomes [`CouchError::Transport`]
//!
//! Status codes are never interpreted here; that is left to the caller.
//!
//! Each attempt is bounded by the configured timeout, clipped to the deadline of
//! an attached [`Cancellation`]. Once a cancellation fires, no further attempt is
//! made and [`CouchError::Cancelled`] is returned.

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    backend::{BackendError, HttpBackend, HttpRequest, HttpResponse, Method},
    endpoint::RequestPath,
    error::{CouchError, CouchResult},
};

/// Retry and timeout policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum number of attempts per request, including the first.
    pub max_attempts: usize,
    /// Delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout, in milliseconds.
    pub timeout_ms: u64,
}

impl TransportConfig {
    /// Returns the delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 2_000,
            timeout_ms: 30_000,
        }
    }
}

/// Caller-controlled cancellation: an explicit signal, a deadline, or both.
///
/// ```ignore
/// let (handle, cancellation) = Cancellation::pair();
/// let db = db.with_cancellation(cancellation.with_deadline(Instant::now() + Duration::from_secs(10)));
/// // elsewhere
/// handle.cancel();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// The sending half of a [`Cancellation`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels every operation observing the paired [`Cancellation`].
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Cancellation {
    /// Creates a cancellation signal and the handle that fires it.
    pub fn pair() -> (CancelHandle, Cancellation) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle { sender },
            Cancellation {
                signal: Some(receiver),
                deadline: None,
            },
        )
    }

    /// Creates a cancellation that fires at `deadline`.
    pub fn deadline(deadline: Instant) -> Self {
        Self {
            signal: None,
            deadline: Some(deadline),
        }
    }

    /// Creates a cancellation that fires after `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::deadline(Instant::now() + timeout)
    }

    /// Adds a deadline, keeping the earlier one if already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns `true` once the signal has fired or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(|signal| *signal.borrow())
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns the time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Completes when the signal fires or the deadline passes.
    pub async fn cancelled(&self) {
        let signal = async {
            match &self.signal {
                Some(signal) => {
                    let mut signal = signal.clone();
                    let closed = signal.wait_for(|cancelled| *cancelled).await.is_err();
                    // A dropped handle can never cancel.
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = signal => {}
            _ = deadline => {}
        }
    }
}

/// Sends requests with bounded retries and per-attempt timeouts.
#[derive(Debug, Clone)]
pub struct Transport {
    base: Url,
    backend: Arc<dyn HttpBackend>,
    config: TransportConfig,
    cancellation: Option<Cancellation>,
}

impl Transport {
    /// Creates a transport for the endpoint `base`.
    ///
    /// `base` should come from [`parse_endpoint`](crate::endpoint::parse_endpoint)
    /// so that its path ends with a slash.
    pub fn new(base: Url, backend: Arc<dyn HttpBackend>, config: TransportConfig) -> Self {
        Self {
            base,
            backend,
            config,
            cancellation: None,
        }
    }

    /// Returns the endpoint.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Returns the retry and timeout policy.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns a copy of this transport that observes `cancellation`.
    pub fn with_cancellation(&self, cancellation: Cancellation) -> Self {
        Self {
            cancellation: Some(cancellation),
            ..self.clone()
        }
    }

    /// Sends a request without a body.
    pub async fn send(&self, method: Method, path: &RequestPath) -> CouchResult<HttpResponse> {
        self.execute(method, path, None).await
    }

    /// Sends a request, serializing `body` as JSON when present.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &RequestPath,
        body: Option<&T>,
    ) -> CouchResult<HttpResponse>
    where
        T: Serialize + ?Sized + Sync,
    {
        let body = body.map(serde_json::to_vec).transpose()?;
        self.execute(method, path, body).await
    }

    #[instrument(skip(self, body), fields(method = %method, path = %path))]
    async fn execute(
        &self,
        method: Method,
        path: &RequestPath,
        body: Option<Vec<u8>>,
    ) -> CouchResult<HttpResponse> {
        let url = path.resolve(&self.base)?;
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let timeout = self.attempt_timeout()?;

            let mut request = HttpRequest::new(method, url.clone(), timeout)
                .with_header("Accept", "application/json");
            if let Some(body) = &body {
                request = request
                    .with_header("Content-Type", "application/json")
                    .with_body(body.clone());
            }

            debug!(attempt, "sending request");
            let outcome = tokio::select! {
                biased;
                _ = self.cancelled() => return Err(CouchError::Cancelled),
                outcome = tokio::time::timeout(timeout, self.backend.send(request)) => {
                    outcome.unwrap_or_else(|_| Err(BackendError::Timeout(timeout)))
                }
            };

            match outcome {
                Ok(response) if response.status < 500 => {
                    debug!(status = response.status, attempt, "received response");
                    return Ok(response);
                }
                Ok(response) if attempt >= attempts => {
                    warn!(status = response.status, attempt, "server error, attempts exhausted");
                    return Ok(response);
                }
                Ok(response) => {
                    warn!(status = response.status, attempt, "server error, retrying");
                }
                Err(err) if attempt >= attempts => {
                    warn!(error = %err, attempt, "request failed, attempts exhausted");
                    return Err(CouchError::Transport {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(error = %err, attempt, "request failed, retrying");
                }
            }

            self.pause().await?;
        }
    }

    /// Computes the timeout for the next attempt, failing if the caller's
    /// cancellation has already fired.
    fn attempt_timeout(&self) -> CouchResult<Duration> {
        let timeout = self.config.timeout();
        match &self.cancellation {
            Some(cancellation) if cancellation.is_cancelled() => Err(CouchError::Cancelled),
            Some(cancellation) => Ok(cancellation
                .remaining()
                .map_or(timeout, |remaining| remaining.min(timeout))),
            None => Ok(timeout),
        }
    }

    async fn pause(&self) -> CouchResult<()> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CouchError::Cancelled),
            _ = tokio::time::sleep(self.config.retry_delay()) => Ok(()),
        }
    }

    async fn cancelled(&self) {
        match &self.cancellation {
            Some(cancellation) => cancellation.cancelled().await,
            None => std::future::pending().await,
        }
    }
}
