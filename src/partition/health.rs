//! Health monitoring
//!
//! Components of a partition report failures here: the log stream (through
//! `HealthReportingListener`) and the stream processor step when an install
//! fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::LogError;
use crate::log::LogStreamFailureListener;

/// Health of a single component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Sink for component health reports
pub trait HealthMonitor: Send + Sync {
    /// Start tracking `component` as healthy
    fn register_component(&self, component: &str);

    /// Stop tracking `component`
    fn remove_component(&self, component: &str);

    /// `component` failed because of `reason`
    fn report_failure(&self, component: &str, reason: &str);

    /// `component` recovered
    fn report_healthy(&self, component: &str);
}

/// Health monitor keeping the last reported status per component
#[derive(Debug, Default)]
pub struct ComponentHealthMonitor {
    components: RwLock<BTreeMap<String, HealthStatus>>,
}

impl ComponentHealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last status of `component`, if it is tracked
    pub fn status(&self, component: &str) -> Option<HealthStatus> {
        self.components.read().get(component).cloned()
    }

    /// Unhealthy if any tracked component is
    pub fn health(&self) -> HealthStatus {
        self.components
            .read()
            .iter()
            .find_map(|(name, status)| match status {
                HealthStatus::Healthy => None,
                HealthStatus::Unhealthy(reason) => {
                    Some(HealthStatus::Unhealthy(format!("{}: {}", name, reason)))
                }
            })
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Names of the tracked components
    pub fn components(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }
}

impl HealthMonitor for ComponentHealthMonitor {
    fn register_component(&self, component: &str) {
        self.components
            .write()
            .insert(component.to_string(), HealthStatus::Healthy);
    }

    fn remove_component(&self, component: &str) {
        self.components.write().remove(component);
    }

    fn report_failure(&self, component: &str, reason: &str) {
        tracing::warn!(component, reason, "component unhealthy");
        self.components
            .write()
            .insert(component.to_string(), HealthStatus::Unhealthy(reason.to_string()));
    }

    fn report_healthy(&self, component: &str) {
        self.components
            .write()
            .insert(component.to_string(), HealthStatus::Healthy);
    }
}

/// Forwards log stream faults and recoveries to a health monitor
pub struct HealthReportingListener {
    component: String,
    monitor: Arc<dyn HealthMonitor>,
}

impl HealthReportingListener {
    pub fn new(component: impl Into<String>, monitor: Arc<dyn HealthMonitor>) -> Self {
        Self {
            component: component.into(),
            monitor,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }
}

impl LogStreamFailureListener for HealthReportingListener {
    fn on_failure(&self, error: &LogError) {
        self.monitor.report_failure(&self.component, &error.to_string());
    }

    fn on_recovered(&self) {
        self.monitor.report_healthy(&self.component);
    }
}

