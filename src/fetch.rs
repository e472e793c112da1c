//! Content-fetch channel
//!
//! Issues a plain GET for the probed URL purely to provoke network signals.
//! The body is never read. Every hop of the request publishes lifecycle
//! events to the probe's [`TransportEventHub`].

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, LOCATION, PRAGMA};
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::classifier::{Observation, ObservationSource};
use crate::config::Config;
use crate::errors::{ProberError, Result};
use crate::events::{TransportEvent, TransportEventHub};
use crate::net_error::NetErrorCode;
use crate::url_utils::without_fragment;

/// How the fetch itself ended.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// An HTTP response arrived
    Responded { status: u16 },
    /// The fetch failed without an HTTP status
    Failed { message: String },
    /// The probe was resolved (or cancelled) before the fetch finished
    Aborted,
}

impl ObservationSource for FetchOutcome {
    fn observation(&self) -> Observation {
        match self {
            FetchOutcome::Responded { .. } => Observation::Responding,
            FetchOutcome::Failed { .. } => Observation::Blocked,
            FetchOutcome::Aborted => Observation::None,
        }
    }
}

/// Performs the content fetch for one probe.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url`, publishing lifecycle events to `events`, and stop early
    /// once `abort` is cancelled.
    async fn fetch(&self, url: &Url, events: &TransportEventHub, abort: CancellationToken) -> FetchOutcome;
}

/// reqwest-backed fetcher that follows redirects hop by hop.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, max_redirects: usize) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent)
            .build()
            .map_err(ProberError::Http)?;

        Ok(Self {
            client,
            max_redirects,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.user_agent, config.max_redirects)
    }

    async fn send(&self, url: &Url) -> reqwest::Result<Response> {
        self.client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
    }
}

fn redirect_target(response: &Response, current: &Url) -> Option<Url> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, events: &TransportEventHub, abort: CancellationToken) -> FetchOutcome {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let request_url = without_fragment(&current);

            let result = tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    debug!("Content fetch for {} aborted", request_url);
                    return FetchOutcome::Aborted;
                }
                result = self.send(&current) => result,
            };

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    let code = NetErrorCode::from_reqwest(&err);
                    debug!("Content fetch for {} failed with {}: {}", request_url, code, err);
                    events.publish(TransportEvent::error(request_url, code));
                    return FetchOutcome::Failed {
                        message: err.to_string(),
                    };
                }
            };

            let status = response.status().as_u16();
            events.publish(TransportEvent::response_started(request_url.clone(), status));

            if response.status().is_redirection() {
                if let Some(next) = redirect_target(&response, &current) {
                    events.publish(TransportEvent::before_redirect(
                        request_url.clone(),
                        without_fragment(&next),
                    ));
                    if hops < self.max_redirects {
                        current = next;
                        hops += 1;
                        continue;
                    }
                    debug!("Redirect limit {} reached at {}", self.max_redirects, request_url);
                }
            }

            events.publish(TransportEvent::completed(request_url, status));
            return FetchOutcome::Responded { status };
        }
    }
}
