//! Plugin collaborator interface.
//!
//! # Responsibilities
//! - Describe installed plugins ([`PluginInfo`]) and where to find them ([`PluginRegistry`])
//! - Expose optional plugin capabilities as typed accessors on [`Plugin`]
//! - Forward plugin state changes to a [`PluginEventSink`]
//!
//! # Design Decisions
//! - A plugin opts into a capability by returning `Some(self)` from its accessor;
//!   nothing is looked up by name
//! - [`StaticPluginRegistry`] never holds its lock while calling the sink

use std::sync::{Arc, PoisonError, RwLock};

use crate::lifecycle::events::LifecycleEvent;
use crate::routing::contributor::{AccessValidatorContributor, BodySizeContributor, RouteContributor};

/// Called when the server comes up.
pub trait StartupHook: Send + Sync {
    fn on_startup(&self, host: &str, port: u16);

    fn on_after_startup(&self) {}
}

/// Called once when the server shuts down.
pub trait ShutdownHook: Send + Sync {
    fn on_shutdown(&self);
}

/// A plugin that serves UI pages.
pub trait UiPlugin: Send + Sync {
    /// Whether recorded requests for this plugin may be replayed.
    fn preemptive_caching_enabled(&self) -> bool {
        true
    }
}

/// Capability accessors. Every accessor defaults to "not implemented".
pub trait Plugin: Send + Sync {
    fn startup(&self) -> Option<&dyn StartupHook> {
        None
    }

    fn shutdown(&self) -> Option<&dyn ShutdownHook> {
        None
    }

    fn ui(&self) -> Option<&dyn UiPlugin> {
        None
    }

    fn routes(&self) -> Option<&dyn RouteContributor> {
        None
    }

    fn body_sizes(&self) -> Option<&dyn BodySizeContributor> {
        None
    }

    fn access_validator(&self) -> Option<&dyn AccessValidatorContributor> {
        None
    }
}

#[derive(Clone)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub implementation: Option<Arc<dyn Plugin>>,
}

impl PluginInfo {
    pub fn new(id: impl Into<String>, implementation: Arc<dyn Plugin>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            implementation: Some(implementation),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The implementation if the plugin is enabled.
    pub fn active(&self) -> Option<&Arc<dyn Plugin>> {
        if self.enabled {
            self.implementation.as_ref()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("implementation", &self.implementation.is_some())
            .finish()
    }
}

pub trait PluginRegistry: Send + Sync {
    fn plugin_info(&self, id: &str) -> Option<PluginInfo>;

    fn plugins(&self) -> Vec<PluginInfo>;

    fn enabled_plugins(&self) -> Vec<PluginInfo> {
        self.plugins().into_iter().filter(|p| p.active().is_some()).collect()
    }
}

/// Receives loaded/unloaded/enabled/disabled notifications.
pub trait PluginEventSink: Send + Sync {
    fn on_plugin_event(&self, event: LifecycleEvent, id: &str, info: &PluginInfo);
}

/// In-memory registry.
#[derive(Default)]
pub struct StaticPluginRegistry {
    plugins: RwLock<Vec<PluginInfo>>,
    sink: RwLock<Option<Arc<dyn PluginEventSink>>>,
}

impl StaticPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(self, info: PluginInfo) -> Self {
        self.add(info);
        self
    }

    pub fn set_sink(&self, sink: Arc<dyn PluginEventSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// The currently installed sink, if any.
    pub fn sink(&self) -> Option<Arc<dyn PluginEventSink>> {
        self.sink.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Install a plugin, replacing any plugin with the same id.
    pub fn add(&self, info: PluginInfo) {
        {
            let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
            plugins.retain(|p| p.id != info.id);
            plugins.push(info.clone());
        }
        tracing::info!(plugin = %info.id, enabled = info.enabled, "Plugin loaded");
        self.emit(LifecycleEvent::Loaded, &info);
    }

    pub fn remove(&self, id: &str) -> Option<PluginInfo> {
        let removed = {
            let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
            let index = plugins.iter().position(|p| p.id == id)?;
            plugins.remove(index)
        };
        tracing::info!(plugin = %id, "Plugin unloaded");
        self.emit(LifecycleEvent::Unloaded, &removed);
        Some(removed)
    }

    /// Returns false if the plugin is unknown or already enabled.
    pub fn enable(&self, id: &str) -> bool {
        self.set_enabled(id, true, LifecycleEvent::Enabled)
    }

    pub fn disable(&self, id: &str) -> bool {
        self.set_enabled(id, false, LifecycleEvent::Disabled)
    }

    fn set_enabled(&self, id: &str, enabled: bool, event: LifecycleEvent) -> bool {
        let info = {
            let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
            match plugins.iter_mut().find(|p| p.id == id) {
                Some(p) if p.enabled != enabled => {
                    p.enabled = enabled;
                    p.clone()
                }
                _ => return false,
            }
        };
        tracing::info!(plugin = %id, event = %event, "Plugin state changed");
        self.emit(event, &info);
        true
    }

    fn emit(&self, event: LifecycleEvent, info: &PluginInfo) {
        let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(sink) = sink {
            sink.on_plugin_event(event, &info.id, info);
        }
    }
}

impl PluginRegistry for StaticPluginRegistry {
    fn plugin_info(&self, id: &str) -> Option<PluginInfo> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    fn plugins(&self) -> Vec<PluginInfo> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Bare;
    impl Plugin for Bare {}

    struct UiOnly;
    impl UiPlugin for UiOnly {}
    impl Plugin for UiOnly {
        fn ui(&self) -> Option<&dyn UiPlugin> {
            Some(self)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(LifecycleEvent, String)>>);

    impl PluginEventSink for Recorder {
        fn on_plugin_event(&self, event: LifecycleEvent, id: &str, _info: &PluginInfo) {
            self.0.lock().unwrap().push((event, id.to_string()));
        }
    }

    #[test]
    fn capability_accessors_default_to_none() {
        assert!(Bare.ui().is_none());
        assert!(UiOnly.ui().is_some());
        assert!(UiOnly.startup().is_none());
    }

    #[test]
    fn state_changes_reach_sink() {
        let sink = Arc::new(Recorder::default());
        let registry = StaticPluginRegistry::new();
        registry.set_sink(sink.clone());

        registry.add(PluginInfo::new("x", Arc::new(Bare)).disabled());
        assert!(registry.enable("x"));
        assert!(!registry.enable("x"));
        assert!(registry.disable("x"));
        assert!(registry.remove("x").is_some());
        assert!(!registry.enable("missing"));

        let events: Vec<_> = sink.0.lock().unwrap().iter().map(|(e, _)| *e).collect();
        assert_eq!(
            events,
            vec![
                LifecycleEvent::Loaded,
                LifecycleEvent::Enabled,
                LifecycleEvent::Disabled,
                LifecycleEvent::Unloaded
            ]
        );
    }

    #[test]
    fn enabled_plugins_filters_disabled() {
        let registry = StaticPluginRegistry::new()
            .with_plugin(PluginInfo::new("on", Arc::new(Bare)))
            .with_plugin(PluginInfo::new("off", Arc::new(Bare)).disabled());

        let enabled: Vec<_> = registry.enabled_plugins().into_iter().map(|p| p.id).collect();
        assert_eq!(enabled, vec!["on".to_string()]);
    }
}
