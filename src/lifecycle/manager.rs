//! Lifecycle event fan-out.
//!
//! # Responsibilities
//! - Keep per-event subscriber lists in registration order
//! - Deliver events to every subscriber, isolating failures
//! - Sit between the plugin registry and its original event handler
//!
//! # Design Decisions
//! - The subscriber list is snapshotted before delivery, so callbacks may
//!   subscribe or unsubscribe while an event is dispatched
//! - An `Err` or a panic from one callback is logged and counted; the rest still run
//! - For plugin events the upstream handler always runs before subscribers

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::lifecycle::events::LifecycleEvent;
use crate::observability::metrics;
use crate::plugins::{PluginEventSink, PluginInfo};
use crate::routing::contributor::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What an event is about.
#[derive(Debug, Clone)]
pub enum LifecycleSubject {
    Plugin(PluginInfo),
    Server { host: String, port: u16 },
    None,
}

impl LifecycleSubject {
    pub fn plugin(&self) -> Option<&PluginInfo> {
        match self {
            LifecycleSubject::Plugin(info) => Some(info),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait LifecycleCallback: Send + Sync {
    fn on_event(
        &self,
        event: LifecycleEvent,
        subject_id: &str,
        subject: &LifecycleSubject,
    ) -> Result<(), CallbackError>;
}

impl<F> LifecycleCallback for F
where
    F: Fn(LifecycleEvent, &str, &LifecycleSubject) -> Result<(), CallbackError> + Send + Sync,
{
    fn on_event(
        &self,
        event: LifecycleEvent,
        subject_id: &str,
        subject: &LifecycleSubject,
    ) -> Result<(), CallbackError> {
        self(event, subject_id, subject)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    pub invoked: usize,
    pub failed: usize,
}

type Subscribers = Vec<(SubscriptionId, Arc<dyn LifecycleCallback>)>;

pub struct LifecycleManager {
    upstream: Option<Arc<dyn PluginEventSink>>,
    callbacks: RwLock<HashMap<LifecycleEvent, Subscribers>>,
    next_id: AtomicU64,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            upstream: None,
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap the plugin registry's original event handler.
    pub fn with_upstream(upstream: Arc<dyn PluginEventSink>) -> Self {
        Self {
            upstream: Some(upstream),
            ..Self::new()
        }
    }

    pub fn subscribe(
        &self,
        events: &[LifecycleEvent],
        callback: Arc<dyn LifecycleCallback>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            callbacks
                .entry(*event)
                .or_default()
                .push((id, callback.clone()));
        }
        tracing::debug!(subscription = %id, events = ?events, "Lifecycle callback subscribed");
        id
    }

    /// Remove `id` from `events`, or from every event when `None`.
    /// Returns how many registrations were removed.
    pub fn unsubscribe(&self, id: SubscriptionId, events: Option<&[LifecycleEvent]>) -> usize {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for (event, subscribers) in callbacks.iter_mut() {
            if events.is_some_and(|only| !only.contains(event)) {
                continue;
            }
            let before = subscribers.len();
            subscribers.retain(|(sub, _)| *sub != id);
            removed += before - subscribers.len();
        }
        removed
    }

    pub fn subscriber_count(&self, event: LifecycleEvent) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber in registration order.
    pub fn notify(
        &self,
        event: LifecycleEvent,
        subject_id: &str,
        subject: &LifecycleSubject,
    ) -> NotifyReport {
        if event.is_plugin_event() {
            if let (Some(upstream), Some(info)) = (&self.upstream, subject.plugin()) {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    upstream.on_plugin_event(event, subject_id, info)
                }));
                if let Err(panic) = outcome {
                    tracing::error!(
                        event = %event,
                        subject = %subject_id,
                        error = %panic_message(panic.as_ref()),
                        "Upstream plugin event handler panicked"
                    );
                }
            }
        }

        let snapshot: Subscribers = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned()
            .unwrap_or_default();

        let mut report = NotifyReport::default();
        for (id, callback) in snapshot {
            report.invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                callback.on_event(event, subject_id, subject)
            }))
            .unwrap_or_else(|panic| Err(CallbackError(panic_message(panic.as_ref()))));

            if let Err(e) = outcome {
                report.failed += 1;
                metrics::record_callback_failure(event.as_str());
                tracing::error!(
                    event = %event,
                    subject = %subject_id,
                    subscription = %id,
                    error = %e,
                    "Error in lifecycle callback"
                );
            }
        }

        tracing::debug!(
            event = %event,
            subject = %subject_id,
            invoked = report.invoked,
            failed = report.failed,
            "Lifecycle event dispatched"
        );
        report
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginEventSink for LifecycleManager {
    fn on_plugin_event(&self, event: LifecycleEvent, id: &str, info: &PluginInfo) {
        self.notify(event, id, &LifecycleSubject::Plugin(info.clone()));
    }
}
