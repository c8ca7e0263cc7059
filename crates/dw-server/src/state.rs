//! Global daemon state

use std::sync::Arc;

use dw_core::config::ServerConfig;
use dw_core::directory::UserDirectory;
use dw_core::events::EventBus;

use crate::door::DoorOrchestrator;
use crate::session::SessionRegistry;

/// Global state for the doorway daemon.
///
/// Constructed once at process start and passed by reference to the
/// components that need it; there is no ambient global state.
pub struct ServerState {
    /// Configuration
    pub config: ServerConfig,
    /// Live session registry
    pub sessions: Arc<SessionRegistry>,
    /// Door launch orchestrator
    pub doors: Arc<DoorOrchestrator>,
    /// User directory collaborator
    pub directory: Arc<dyn UserDirectory>,
    /// Lifecycle event channel to statistics/dashboard collaborators
    pub events: EventBus,
}

impl ServerState {
    /// Create new daemon state
    pub fn new(
        config: ServerConfig,
        directory: Arc<dyn UserDirectory>,
        events: EventBus,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(config.max_sessions));
        let doors = Arc::new(DoorOrchestrator::new(
            &config,
            Arc::clone(&directory),
            events.clone(),
        ));

        Self {
            config,
            sessions,
            doors,
            directory,
            events,
        }
    }
}
