//! Link Prober Library
//!
//! Decides whether a URL is reachable by racing a content fetch against the
//! transport-level request lifecycle under an adaptive deadline, then mapping
//! what was observed to a verdict. Ambiguous outcomes lean toward "valid"
//! with an explanatory reason.

pub mod classifier;
pub mod config;
pub mod deadline;
pub mod errors;
pub mod events;
pub mod fetch;
pub mod gate;
pub mod message;
pub mod net_error;
pub mod prober;
pub mod retry;
pub mod scan;
pub mod url_utils;
pub mod verdict;

pub use classifier::{Classifier, Observation, ObservationSource, StatusPolicy};
pub use config::Config;
pub use deadline::{DeadlineController, DeadlineSettings};
pub use errors::{ProberError, Result};
pub use message::{ProbeMessage, ProbeResponse, serve};
pub use net_error::NetErrorCode;
pub use prober::Prober;
pub use retry::{RetryPolicy, UrlProbe, probe_with_retry};
pub use scan::{ScanSession, ScanSummary, load_url_list};
pub use verdict::{ProbeRequest, ProbeVerdict};
