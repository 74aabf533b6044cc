//! Lifecycle event kinds.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    Loaded,
    Unloaded,
    Enabled,
    Disabled,
    Startup,
    AfterStartup,
    Shutdown,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 7] = [
        LifecycleEvent::Loaded,
        LifecycleEvent::Unloaded,
        LifecycleEvent::Enabled,
        LifecycleEvent::Disabled,
        LifecycleEvent::Startup,
        LifecycleEvent::AfterStartup,
        LifecycleEvent::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Loaded => "loaded",
            LifecycleEvent::Unloaded => "unloaded",
            LifecycleEvent::Enabled => "enabled",
            LifecycleEvent::Disabled => "disabled",
            LifecycleEvent::Startup => "startup",
            LifecycleEvent::AfterStartup => "after_startup",
            LifecycleEvent::Shutdown => "shutdown",
        }
    }

    /// Events raised by the plugin registry rather than the server.
    pub fn is_plugin_event(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::Loaded
                | LifecycleEvent::Unloaded
                | LifecycleEvent::Enabled
                | LifecycleEvent::Disabled
        )
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown lifecycle event {0:?}")]
pub struct UnknownEvent(pub String);

impl FromStr for LifecycleEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}
