//! Request-lifecycle events and the hub that routes them to listeners

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use crate::classifier::{Observation, ObservationSource};
use crate::net_error::NetErrorCode;

#[derive(Clone, Debug, PartialEq)]
pub enum TransportEventKind {
    /// Response headers arrived
    ResponseStarted { status: u16 },
    /// The request is about to follow a redirect
    BeforeRedirect { redirect_url: String },
    /// The request finished with this status
    Completed { status: u16 },
    /// The request failed below HTTP
    ErrorOccurred { error: NetErrorCode },
}

/// A lifecycle event for one request URL.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportEvent {
    pub url: String,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn response_started(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            kind: TransportEventKind::ResponseStarted { status },
        }
    }

    pub fn before_redirect(url: impl Into<String>, redirect_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: TransportEventKind::BeforeRedirect {
                redirect_url: redirect_url.into(),
            },
        }
    }

    pub fn completed(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            kind: TransportEventKind::Completed { status },
        }
    }

    pub fn error(url: impl Into<String>, error: NetErrorCode) -> Self {
        Self {
            url: url.into(),
            kind: TransportEventKind::ErrorOccurred { error },
        }
    }
}

impl ObservationSource for TransportEvent {
    fn observation(&self) -> Observation {
        match &self.kind {
            TransportEventKind::ResponseStarted { .. } => Observation::Responding,
            TransportEventKind::BeforeRedirect { redirect_url } => Observation::Redirected {
                to: redirect_url.clone(),
            },
            TransportEventKind::Completed { status } => Observation::Completed { status: *status },
            TransportEventKind::ErrorOccurred { error } => Observation::Errored { code: error.clone() },
        }
    }
}

#[derive(Debug)]
struct Listener {
    id: u64,
    patterns: HashSet<String>,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Debug, Default)]
struct HubInner {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Routes published events to every subscription whose patterns match the
/// event URL. Cloning shares the same hub.
#[derive(Clone, Debug, Default)]
pub struct TransportEventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl TransportEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for the given URL patterns.
    pub fn subscribe(&self, patterns: impl IntoIterator<Item = String>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Listener {
            id,
            patterns: patterns.into_iter().collect(),
            tx,
        });

        Subscription {
            id,
            hub: self.clone(),
            rx,
        }
    }

    /// Deliver an event. Returns the number of listeners that received it.
    ///
    /// A listener that receives a redirect also starts matching the redirect
    /// target, so the next hop reaches it without a round trip.
    pub fn publish(&self, event: TransportEvent) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        for listener in inner.listeners.iter_mut().filter(|l| l.patterns.contains(&event.url)) {
            if listener.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
            if let TransportEventKind::BeforeRedirect { redirect_url } = &event.kind {
                listener.patterns.insert(redirect_url.clone());
            }
        }
        if delivered == 0 {
            debug!("No listener for transport event on {}", event.url);
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.listeners.retain(|l| l.id != id);
    }
}

/// A registered listener. Dropping it unregisters it from the hub.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: TransportEventHub,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Next event already queued, if any.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
