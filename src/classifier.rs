//! Maps what the two observation channels saw to a verdict
//!
//! The classifier is a fixed, ordered decision table with no I/O. Every
//! ambiguous case resolves to a valid verdict carrying an explanatory reason.

use std::collections::BTreeSet;
use url::Url;

use crate::net_error::{ErrorClass, NetErrorCode};
use crate::url_utils::swap_scheme;
use crate::verdict::{ProbeVerdict, SLOW_REASON, TIMEOUT_REASON};

/// Schemes that are never probed over the network.
pub const SPECIAL_PROTOCOLS: [&str; 8] = [
    "chrome:",
    "chrome-extension:",
    "edge:",
    "about:",
    "file:",
    "data:",
    "javascript:",
    "brave:",
];

pub const ACCESS_RESTRICTED_REASON: &str =
    "Site blocks automated access but might be accessible in browser";
pub const CERTIFICATE_REASON: &str = "Site has certificate issues but might be accessible";
pub const TEMPORARILY_UNAVAILABLE_REASON: &str = "Server temporarily unavailable";

/// Tagged outcome produced by either observation channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// Final HTTP status of the request chain
    Completed { status: u16 },
    /// A hop in a redirect chain
    Redirected { to: String },
    /// Transport failure
    Errored { code: NetErrorCode },
    /// Something came back from the network, but nothing terminal yet
    Responding,
    /// The content fetch failed without any HTTP status
    Blocked,
    None,
}

impl Observation {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Observation::Completed { .. } | Observation::Errored { .. } | Observation::Blocked
        )
    }

    /// Anything that proves the destination answered in some way.
    pub fn is_partial_signal(&self) -> bool {
        !matches!(self, Observation::None | Observation::Blocked)
    }
}

/// Anything that can report an [`Observation`].
pub trait ObservationSource {
    fn observation(&self) -> Observation;
}

/// Status codes outside 2xx/3xx that are still treated as live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusPolicy {
    /// 4xx codes that indicate a gate (auth, rate limit) in front of a live site
    pub lenient: BTreeSet<u16>,
    /// 5xx codes that indicate a passing outage
    pub transient: BTreeSet<u16>,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::new([401, 403, 405, 406, 407, 408, 429], [503, 504])
    }
}

impl StatusPolicy {
    pub fn new(
        lenient: impl IntoIterator<Item = u16>,
        transient: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            lenient: lenient.into_iter().collect(),
            transient: transient.into_iter().collect(),
        }
    }

    pub fn is_lenient(&self, status: u16) -> bool {
        self.lenient.contains(&status)
    }

    pub fn is_transient(&self, status: u16) -> bool {
        self.transient.contains(&status)
    }
}

/// Whether a URL should short-circuit without touching the network.
pub fn is_special_protocol(url: &str) -> bool {
    let lowered = url.trim_start().to_ascii_lowercase();
    SPECIAL_PROTOCOLS.iter().any(|scheme| lowered.starts_with(scheme))
}

fn status_reason(status: u16) -> String {
    match status {
        401 => "Requires authentication".to_string(),
        403 => "Access restricted".to_string(),
        429 => "Too many requests".to_string(),
        _ => format!("Status code: {}", status),
    }
}

#[derive(Clone, Debug, Default)]
pub struct Classifier {
    policy: StatusPolicy,
}

impl Classifier {
    pub fn new(policy: StatusPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &StatusPolicy {
        &self.policy
    }

    /// Apply the table to one observation. Non-terminal observations yield `None`.
    pub fn classify(
        &self,
        observation: &Observation,
        url: &Url,
        final_url: Option<&str>,
    ) -> Option<ProbeVerdict> {
        match observation {
            Observation::Completed { status } => Some(self.classify_status(*status, url, final_url)),
            Observation::Errored { code } => Some(self.classify_transport_error(code, url)),
            Observation::Blocked => Some(self.classify_fetch_failure()),
            Observation::Redirected { .. } | Observation::Responding | Observation::None => None,
        }
    }

    pub fn classify_transport_error(&self, code: &NetErrorCode, url: &Url) -> ProbeVerdict {
        match code.class() {
            ErrorClass::Connection => {
                let verdict = ProbeVerdict::valid();
                match swap_scheme(url) {
                    Some(alternate) => verdict
                        .with_reason(format!(
                            "Connection failed ({}), might be temporary or try {}",
                            code,
                            alternate.scheme()
                        ))
                        .with_alternate(alternate.to_string()),
                    None => verdict.with_reason(format!(
                        "Connection failed ({}), might be temporary",
                        code
                    )),
                }
            }
            ErrorClass::AccessRestricted => ProbeVerdict::valid().with_reason(ACCESS_RESTRICTED_REASON),
            ErrorClass::Certificate => ProbeVerdict::valid().with_reason(CERTIFICATE_REASON),
            ErrorClass::Unclassified => ProbeVerdict::invalid(code.to_string()),
        }
    }

    pub fn classify_status(&self, status: u16, url: &Url, final_url: Option<&str>) -> ProbeVerdict {
        let redirected_to = final_url.filter(|target| !same_url(target, url));

        match status {
            200..=299 => match redirected_to {
                Some(target) => ProbeVerdict::valid().with_redirect(target),
                None => ProbeVerdict::valid(),
            },
            300..=399 => match redirected_to {
                Some(target) => ProbeVerdict::valid()
                    .with_reason(format!("Redirected to {}", target))
                    .with_redirect(target),
                None => ProbeVerdict::invalid("Redirect without target"),
            },
            s if self.policy.is_lenient(s) => ProbeVerdict::valid().with_reason(status_reason(s)),
            404 => ProbeVerdict::invalid("Page not found"),
            400..=499 => ProbeVerdict::invalid(format!("Client error: {}", status)),
            s if self.policy.is_transient(s) => {
                ProbeVerdict::valid().with_reason(TEMPORARILY_UNAVAILABLE_REASON)
            }
            501 => ProbeVerdict::invalid("Not Implemented"),
            502 => ProbeVerdict::invalid("Bad Gateway"),
            500..=599 => ProbeVerdict::invalid(format!("Server error: {}", status)),
            _ => ProbeVerdict::invalid(format!("HTTP Error: {}", status)),
        }
    }

    /// The content fetch failed opaquely: evidence of a security policy, not a dead host.
    pub fn classify_fetch_failure(&self) -> ProbeVerdict {
        ProbeVerdict::valid().with_reason(ACCESS_RESTRICTED_REASON)
    }

    /// Nothing terminal arrived before the deadline.
    pub fn classify_deadline(&self, had_partial_signal: bool) -> ProbeVerdict {
        if had_partial_signal {
            ProbeVerdict::valid().with_reason(SLOW_REASON)
        } else {
            ProbeVerdict::invalid(TIMEOUT_REASON)
        }
    }
}

fn same_url(candidate: &str, url: &Url) -> bool {
    match Url::parse(candidate) {
        Ok(parsed) => {
            let mut left = parsed;
            let mut right = url.clone();
            left.set_fragment(None);
            right.set_fragment(None);
            left == right
        }
        Err(_) => candidate == url.as_str(),
    }
}
