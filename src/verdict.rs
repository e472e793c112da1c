//! Probe request, verdict and diagnostic log structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::Result;

pub const SPECIAL_PROTOCOL_REASON: &str = "Special protocol URL";
pub const INVALID_URL_REASON: &str = "Invalid URL format";
pub const TIMEOUT_REASON: &str = "Request Timeout";
pub const SLOW_REASON: &str = "Site is responding but slow";

/// One probe call. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeRequest {
    pub url: String,
    pub deadline: Option<Duration>,
}

impl ProbeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Outcome of a probe, serialized as the `checkUrl` response record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeVerdict {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_url: Option<String>,
}

impl ProbeVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
            redirect_url: None,
            alternate_url: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
            redirect_url: None,
            alternate_url: None,
        }
    }

    pub fn special_protocol() -> Self {
        Self::valid().with_reason(SPECIAL_PROTOCOL_REASON)
    }

    pub fn invalid_url() -> Self {
        Self::invalid(INVALID_URL_REASON)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_redirect(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn with_alternate(mut self, alternate_url: impl Into<String>) -> Self {
        self.alternate_url = Some(alternate_url.into());
        self
    }

    pub fn reason_str(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }

    /// Valid, but with something worth telling the user.
    pub fn is_advisory(&self) -> bool {
        self.is_valid && self.reason.as_deref().is_some_and(|r| !r.is_empty())
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRecord {
    pub from: String,
    pub to: String,
    pub observed_at_ms: u64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub code: String,
    pub observed_at_ms: u64,
}

/// Per-probe diagnostic record. Sealed when the verdict is produced; a sealed
/// log ignores every further mutation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub redirects: Vec<RedirectRecord>,
    pub errors: Vec<ErrorRecord>,
    pub status_code: Option<u16>,
    pub final_url: Option<String>,
    #[serde(skip)]
    started: Instant,
    #[serde(skip)]
    sealed: bool,
}

impl RequestLog {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            started_at: Utc::now(),
            redirects: Vec::new(),
            errors: Vec::new(),
            status_code: None,
            final_url: None,
            started: Instant::now(),
            sealed: false,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn record_redirect(&mut self, from: &str, to: &str) {
        if self.sealed {
            return;
        }
        debug!("Redirect: {} -> {}", from, to);
        self.redirects.push(RedirectRecord {
            from: from.to_string(),
            to: to.to_string(),
            observed_at_ms: self.elapsed_ms(),
        });
        self.final_url = Some(to.to_string());
    }

    pub fn record_error(&mut self, code: &str) {
        if self.sealed {
            return;
        }
        debug!("Transport error: {}", code);
        self.errors.push(ErrorRecord {
            code: code.to_string(),
            observed_at_ms: self.elapsed_ms(),
        });
    }

    pub fn record_status(&mut self, status: u16) {
        if self.sealed {
            return;
        }
        self.status_code = Some(status);
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Emit the request summary for a resolved probe.
    pub fn summarize(&self, had_response: bool, verdict: &ProbeVerdict) {
        info!(
            url = %self.url,
            duration_ms = self.elapsed_ms(),
            had_response,
            status_code = ?self.status_code,
            redirects = self.redirects.len(),
            errors = self.errors.len(),
            final_url = self.final_url.as_deref().unwrap_or(&self.url),
            is_valid = verdict.is_valid,
            reason = verdict.reason_str(),
            "Probe resolved"
        );

        match self.to_json() {
            Ok(log) => debug!(log = %log, "Request log"),
            Err(e) => warn!("Failed to serialize request log for {}: {}", self.url, e),
        }
    }

    /// The log as one JSON object, timestamps included.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
