use crate::config::{self, ConfigError, LiveConfig};
use crate::events::EventBus;
use crate::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const MAINTENANCE_KEY: &str = "maintenance:sweep";

/// Shared wiring for one engine instance: configuration, the fan-out bus
/// and the session manager that owns every live session.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: LiveConfig,
    event_bus: EventBus,
    sessions: Arc<SessionManager>,
}

impl AppContext {
    pub fn new(config: LiveConfig) -> Result<Self, ConfigError> {
        config::validate(&config)?;
        let event_bus = EventBus::with_capacity(config.catchup_capacity);
        let sessions = SessionManager::new(event_bus.clone(), config.clone());
        Ok(Self::new_with_dependencies(config, event_bus, sessions))
    }

    /// Defaults, file and environment, in that order.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(config::load()?)
    }

    pub fn new_with_dependencies(
        config: LiveConfig,
        event_bus: EventBus,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            event_bus,
            sessions,
        }
    }

    pub fn new_for_tests() -> Self {
        Self::new(LiveConfig::default()).expect("test context")
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn event_bus(&self) -> EventBus {
        self.event_bus.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Arm the periodic eviction sweep. Timer-driven eviction covers the
    /// common path; the sweep catches sessions whose deadline was lost.
    pub fn start_maintenance(&self, every: Duration) {
        let sessions = Arc::clone(&self.sessions);
        debug!(every_secs = every.as_secs(), "maintenance sweep armed");
        self.sessions
            .timers()
            .schedule_repeating(MAINTENANCE_KEY, every, move || {
                sessions.sweep_expired();
            });
    }
}
