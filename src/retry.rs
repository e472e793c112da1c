//! Bounded retry around a single probe
//!
//! Only verdicts that point at a passing condition (connection-level errors,
//! network changes, timeouts) are retried. Backoff grows linearly with the
//! attempt number.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::net_error::retryable_code_names;
use crate::prober::Prober;
use crate::verdict::{ProbeRequest, ProbeVerdict, TIMEOUT_REASON};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of probe invocations; zero behaves like one
    pub max_retries: u32,
    /// Wait before attempt `n + 1` is `backoff_step * n`
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_step: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_step: Duration) -> Self {
        Self {
            max_retries,
            backoff_step,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Something that can run one probe attempt.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, request: ProbeRequest, cancel: CancellationToken) -> ProbeVerdict;

    /// Forget learned network conditions.
    fn reset_network_context(&self) {}
}

#[async_trait]
impl UrlProbe for Prober {
    async fn probe(&self, request: ProbeRequest, cancel: CancellationToken) -> ProbeVerdict {
        self.probe_request(request, cancel).await
    }

    fn reset_network_context(&self) {
        self.deadline().reset();
    }
}

/// Whether another attempt could change this verdict.
pub fn is_retryable(verdict: &ProbeVerdict) -> bool {
    let reason = verdict.reason_str();
    reason.contains(TIMEOUT_REASON) || retryable_code_names().iter().any(|code| reason.contains(code))
}

/// Probe `url`, retrying transient failures. Always returns the last verdict.
pub async fn probe_with_retry<P>(
    probe: &P,
    url: &str,
    policy: &RetryPolicy,
    cancel: CancellationToken,
) -> ProbeVerdict
where
    P: UrlProbe + ?Sized,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let verdict = probe.probe(ProbeRequest::new(url), cancel.clone()).await;

        if verdict.is_valid || !is_retryable(&verdict) {
            return verdict;
        }
        if attempt >= attempts {
            warn!(
                "Giving up on {} after {} attempts: {}",
                url,
                attempt,
                verdict.reason_str()
            );
            return verdict;
        }
        if cancel.is_cancelled() {
            debug!("Not retrying cancelled probe for {}", url);
            return verdict;
        }

        let backoff = policy.backoff_step * attempt;
        debug!(
            "Retrying {} (attempt {}), waiting {}ms: {}",
            url,
            attempt + 1,
            backoff.as_millis(),
            verdict.reason_str()
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Retry backoff for {} cancelled", url);
                return verdict;
            }
            _ = sleep(backoff) => {}
        }

        attempt += 1;
    }
}
