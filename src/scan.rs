//! Scan session: checks many URLs with one shared deadline controller
//!
//! In-flight probes are tracked in an explicit map of cancellation handles so
//! a `cancelScan` request can stop all of them at once.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::Result;
use crate::prober::Prober;
use crate::retry::{RetryPolicy, UrlProbe, probe_with_retry};
use crate::url_utils::cleanup_url;
use crate::verdict::ProbeVerdict;

/// Tally of a finished scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Valid verdicts that still carry a reason
    pub advisory: usize,
}

impl ScanSummary {
    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a ProbeVerdict>) -> Self {
        let mut summary = Self::default();
        for verdict in verdicts {
            summary.record(verdict);
        }
        summary
    }

    pub fn record(&mut self, verdict: &ProbeVerdict) {
        self.total += 1;
        if verdict.is_valid {
            self.valid += 1;
            if verdict.is_advisory() {
                self.advisory += 1;
            }
        } else {
            self.invalid += 1;
        }
    }
}

pub struct ScanSession {
    prober: Arc<dyn UrlProbe>,
    retry: RetryPolicy,
    concurrency: usize,
    in_flight: Mutex<HashMap<Uuid, CancellationToken>>,
}

/// Removes a probe's handle from the in-flight map however the probe ends.
struct InFlightGuard<'a> {
    session: &'a ScanSession,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.session.lock_in_flight().remove(&self.id);
    }
}

impl ScanSession {
    pub fn new(config: &Config) -> Result<Self> {
        let prober = Prober::new(config)?;
        Ok(Self::with_probe(
            Arc::new(prober),
            config.retry_policy(),
            config.scan_concurrency,
        ))
    }

    pub fn with_probe(prober: Arc<dyn UrlProbe>, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            prober,
            retry,
            concurrency: concurrency.max(1),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check one URL with retries.
    pub async fn check_url(&self, url: &str) -> ProbeVerdict {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.lock_in_flight().insert(id, cancel.clone());
        let _guard = InFlightGuard { session: self, id };

        debug!("Checking {} as probe {}", url, id);
        probe_with_retry(self.prober.as_ref(), url, &self.retry, cancel).await
    }

    /// Check many URLs, at most `concurrency` at a time. Results follow input order.
    pub async fn scan_all(&self, urls: &[String]) -> Vec<(String, ProbeVerdict)> {
        info!("Scanning {} URLs with concurrency {}", urls.len(), self.concurrency);

        stream::iter(urls.iter().cloned())
            .map(|url| async move {
                let verdict = self.check_url(&url).await;
                (url, verdict)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Signal every in-flight probe. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let in_flight = self.lock_in_flight();
        for token in in_flight.values() {
            token.cancel();
        }
        if !in_flight.is_empty() {
            info!("Cancelled {} in-flight probes", in_flight.len());
        }
        in_flight.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Drop learned latency, e.g. after the network changed.
    pub fn reset_network_context(&self) {
        debug!("Resetting network context");
        self.prober.reset_network_context();
    }
}

/// Read a URL list: one per line, `#` starts a comment line. Entries are
/// cleaned and de-duplicated, first occurrence wins.
pub async fn load_url_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    let mut seen = HashSet::new();

    let urls: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(cleanup_url)
        .filter(|url| seen.insert(url.clone()))
        .collect();

    debug!("Loaded {} URLs from {}", urls.len(), path.as_ref().display());
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::ProbeRequest;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Hangs until cancelled, then reports a timeout.
    #[derive(Default)]
    struct StallingProbe {
        resets: AtomicUsize,
    }

    #[async_trait]
    impl UrlProbe for StallingProbe {
        async fn probe(&self, _request: ProbeRequest, cancel: CancellationToken) -> ProbeVerdict {
            cancel.cancelled().await;
            ProbeVerdict::invalid("Request Timeout")
        }

        fn reset_network_context(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Valid for hosts containing "up", 404 otherwise, after a host-specific delay.
    struct StaticProbe {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl UrlProbe for StaticProbe {
        async fn probe(&self, request: ProbeRequest, _cancel: CancellationToken) -> ProbeVerdict {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = if request.url.contains("slow") { 500 } else { 100 };
            sleep(Duration::from_millis(delay)).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            if request.url.contains("up") {
                ProbeVerdict::valid()
            } else {
                ProbeVerdict::invalid("Page not found")
            }
        }
    }

    #[test]
    fn test_summary_counts() {
        let verdicts = [
            ProbeVerdict::valid(),
            ProbeVerdict::valid().with_reason("Site is responding but slow"),
            ProbeVerdict::invalid("Page not found"),
        ];
        let summary = ScanSummary::from_verdicts(&verdicts);
        assert_eq!(
            summary,
            ScanSummary {
                total: 3,
                valid: 2,
                invalid: 1,
                advisory: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_preserves_order_and_bounds_concurrency() {
        let probe = Arc::new(StaticProbe {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let session = ScanSession::with_probe(probe.clone(), RetryPolicy::default(), 2);

        let urls: Vec<String> = [
            "https://slow-up.example/",
            "https://up.example/",
            "https://gone.example/",
            "https://up2.example/",
        ]
        .iter()
        .map(|u| u.to_string())
        .collect();

        let results = session.scan_all(&urls).await;
        let order: Vec<&str> = results.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(order, urls.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(results[0].1.is_valid);
        assert!(!results[2].1.is_valid);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_in_flight_probes() {
        let session = Arc::new(ScanSession::with_probe(
            Arc::new(StallingProbe::default()),
            RetryPolicy::default(),
            5,
        ));

        let scan = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let urls = vec!["https://a.example/".to_string(), "https://b.example/".to_string()];
                session.scan_all(&urls).await
            })
        };

        sleep(Duration::from_millis(100)).await;
        assert_eq!(session.in_flight(), 2);
        assert_eq!(session.cancel_all(), 2);

        let results = scan.await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, v)| v.reason_str() == "Request Timeout"));
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.cancel_all(), 0);
    }

    #[test]
    fn test_reset_network_context_reaches_probe() {
        let probe = Arc::new(StallingProbe::default());
        let session = ScanSession::with_probe(probe.clone(), RetryPolicy::default(), 1);

        session.reset_network_context();
        assert_eq!(probe.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_url_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# bookmarks export").unwrap();
        writeln!(file, "https://example.com/docs").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  https://example.com/docs/  ").unwrap();
        writeln!(file, "https://example.com//a//b.html").unwrap();
        file.flush().unwrap();

        let urls = load_url_list(file.path()).await.unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com/docs/".to_string(),
                "https://example.com/a/b.html".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(load_url_list("/nonexistent/urls.txt").await.is_err());
    }
}
