//! Probe orchestration
//!
//! A probe races the content fetch against the transport-event stream under a
//! deadline. Whichever produces a terminal signal first decides the verdict
//! through the resolution gate; resolution tears down the fetch, the event
//! subscription and the timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::classifier::{Classifier, ObservationSource, is_special_protocol};
use crate::config::Config;
use crate::deadline::DeadlineController;
use crate::errors::Result;
use crate::events::{TransportEvent, TransportEventHub, TransportEventKind};
use crate::fetch::{ContentFetcher, FetchOutcome, HttpFetcher};
use crate::gate::ResolutionGate;
use crate::url_utils::url_patterns;
use crate::verdict::{ProbeRequest, ProbeVerdict, RequestLog};

/// Runs single probe attempts.
pub struct Prober {
    fetcher: Arc<dyn ContentFetcher>,
    deadline: Arc<DeadlineController>,
    classifier: Classifier,
}

/// Mutable state of one racing probe.
struct ProbeContext {
    url: Url,
    log: RequestLog,
    had_response: bool,
    latency_recorded: bool,
}

impl Prober {
    /// Build a prober with the HTTP fetcher and a fresh deadline controller.
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::from_config(config)?;
        Ok(Self::with_parts(
            Arc::new(fetcher),
            Arc::new(DeadlineController::new(config.deadline_settings())),
            Classifier::new(config.status_policy()),
        ))
    }

    pub fn with_parts(
        fetcher: Arc<dyn ContentFetcher>,
        deadline: Arc<DeadlineController>,
        classifier: Classifier,
    ) -> Self {
        Self {
            fetcher,
            deadline,
            classifier,
        }
    }

    pub fn deadline(&self) -> &Arc<DeadlineController> {
        &self.deadline
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Probe `url` with the adaptive deadline and no external cancellation.
    pub async fn probe(&self, url: &str) -> ProbeVerdict {
        self.probe_request(ProbeRequest::new(url), CancellationToken::new())
            .await
    }

    /// Probe once. Cancelling `cancel` resolves the probe as a timeout with
    /// no response.
    #[instrument(skip(self, request, cancel), fields(url = %request.url))]
    pub async fn probe_request(&self, request: ProbeRequest, cancel: CancellationToken) -> ProbeVerdict {
        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Rejecting {}: {}", request.url, e);
                return ProbeVerdict::invalid_url();
            }
        };

        if is_special_protocol(url.as_str()) {
            debug!("Special protocol {}, skipping network probe", url.scheme());
            return ProbeVerdict::special_protocol();
        }

        let deadline = request
            .deadline
            .unwrap_or_else(|| self.deadline.current_timeout());

        self.race(url, deadline, cancel).await
    }

    async fn race(&self, url: Url, deadline: Duration, cancel: CancellationToken) -> ProbeVerdict {
        debug!("Racing probe for {} with {}ms deadline", url, deadline.as_millis());

        let hub = TransportEventHub::new();
        let mut subscription = hub.subscribe(url_patterns(&url));
        let gate = ResolutionGate::new();
        let mut ctx = ProbeContext {
            log: RequestLog::new(url.as_str()),
            url: url.clone(),
            had_response: false,
            latency_recorded: false,
        };

        let fetcher = Arc::clone(&self.fetcher);
        let fetch_hub = hub.clone();
        let abort = gate.teardown_token();
        let mut fetch = tokio::spawn(async move { fetcher.fetch(&url, &fetch_hub, abort).await });
        let mut fetch_done = false;

        let timer = sleep(deadline);
        tokio::pin!(timer);

        while !gate.is_resolved() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Probe for {} cancelled", ctx.url);
                    gate.try_resolve(self.classifier.classify_deadline(false));
                }
                Some(event) = subscription.recv() => {
                    if let Some(verdict) = self.on_event(&mut ctx, event) {
                        gate.try_resolve(verdict);
                    }
                }
                joined = &mut fetch, if !fetch_done => {
                    fetch_done = true;
                    let outcome = joined.unwrap_or_else(|e| {
                        warn!("Content fetch task for {} failed: {}", ctx.url, e);
                        FetchOutcome::Aborted
                    });

                    // Events emitted before the fetch returned outrank its outcome.
                    while !gate.is_resolved() {
                        let Some(event) = subscription.try_recv() else {
                            break;
                        };
                        if let Some(verdict) = self.on_event(&mut ctx, event) {
                            gate.try_resolve(verdict);
                        }
                    }

                    if !gate.is_resolved() {
                        if let Some(verdict) = self.on_fetch_outcome(&mut ctx, &outcome) {
                            gate.try_resolve(verdict);
                        }
                    }
                }
                _ = &mut timer => {
                    debug!(
                        "Deadline reached for {} after {}ms, response seen: {}",
                        ctx.url,
                        ctx.log.elapsed_ms(),
                        ctx.had_response
                    );
                    gate.try_resolve(self.classifier.classify_deadline(ctx.had_response));
                }
            }
        }

        ctx.log.seal();
        drop(subscription);
        debug!("Listeners left for {}: {}", ctx.url, hub.listener_count());

        let verdict = gate
            .take()
            .unwrap_or_else(|| self.classifier.classify_deadline(ctx.had_response));
        ctx.log.summarize(ctx.had_response, &verdict);
        verdict
    }

    fn on_event(&self, ctx: &mut ProbeContext, event: TransportEvent) -> Option<ProbeVerdict> {
        ctx.had_response = true;

        match &event.kind {
            TransportEventKind::ResponseStarted { status } | TransportEventKind::Completed { status } => {
                ctx.log.record_status(*status);
                self.record_latency(ctx);
            }
            TransportEventKind::BeforeRedirect { redirect_url } => {
                ctx.log.record_redirect(&event.url, redirect_url);
            }
            TransportEventKind::ErrorOccurred { error } => {
                ctx.log.record_error(&error.to_string());
            }
        }

        self.classifier
            .classify(&event.observation(), &ctx.url, ctx.log.final_url.as_deref())
    }

    fn on_fetch_outcome(&self, ctx: &mut ProbeContext, outcome: &FetchOutcome) -> Option<ProbeVerdict> {
        match outcome {
            FetchOutcome::Responded { status } => {
                debug!("Content fetch for {} answered {}", ctx.url, status);
                ctx.had_response = true;
                self.record_latency(ctx);
            }
            FetchOutcome::Failed { message } => {
                debug!("Content fetch for {} failed: {}", ctx.url, message);
            }
            FetchOutcome::Aborted => {}
        }

        self.classifier
            .classify(&outcome.observation(), &ctx.url, ctx.log.final_url.as_deref())
    }

    fn record_latency(&self, ctx: &mut ProbeContext) {
        if !ctx.latency_recorded {
            ctx.latency_recorded = true;
            self.deadline.record_latency(ctx.log.elapsed_ms());
        }
    }
}
