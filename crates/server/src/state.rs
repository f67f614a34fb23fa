//! Shared state behind the admission HTTP surface (spec.md §6). One entry
//! per admitted conversation, keyed by `context_id`, mirroring the
//! teacher's `AppState` session-bookkeeping shape with the sales-domain
//! session store swapped out for the conversation orchestrator it now
//! admits.

use std::sync::Arc;

use dashmap::DashMap;

use voice_agent_config::Settings;
use voice_agent_orchestrator::ConversationOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    sessions: Arc<DashMap<String, Arc<ConversationOrchestrator>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// `VOICE_AGENT_MAX_SESSIONS` (spec.md §6 ambient stack).
    pub fn at_capacity(&self) -> bool {
        self.session_count() >= self.settings.server.max_sessions
    }

    /// Retains the orchestrator while its room has at least one peer. The
    /// caller registers `orchestrator.on_closed` to call `remove` for the
    /// same `context_id` once the room empties (spec.md §3: "destroyed when
    /// the room has zero peers").
    pub fn insert(&self, context_id: String, orchestrator: Arc<ConversationOrchestrator>) {
        self.sessions.insert(context_id, orchestrator);
    }

    /// Drops this process's `Arc` to a closed session, freeing its slot
    /// against `max_sessions`.
    pub fn remove(&self, context_id: &str) {
        self.sessions.remove(context_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_capacity() {
        let state = AppState::new(Settings::default());
        assert_eq!(state.session_count(), 0);
        assert!(!state.at_capacity());
    }

    #[test]
    fn at_capacity_once_max_sessions_reached() {
        let mut settings = Settings::default();
        settings.server.max_sessions = 0;
        let state = AppState::new(settings);
        assert!(state.at_capacity());
    }

    #[test]
    fn remove_of_unknown_session_is_a_no_op() {
        let state = AppState::new(Settings::default());
        state.remove("does-not-exist");
        assert_eq!(state.session_count(), 0);
    }
}
