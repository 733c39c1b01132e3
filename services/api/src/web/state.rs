//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use narat_core::ports::{
    AnswerLogStore, IdentityProvider, QuestionCatalog, RecommendationScorer, RecommendationStore,
    SessionStore, UserStore,
};
use narat_core::recommendation::{RecommendationService, DEFAULT_CLAIM_LEASE_SECS};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub logs: Arc<dyn AnswerLogStore>,
    pub questions: Arc<dyn QuestionCatalog>,
    pub identity: Arc<dyn IdentityProvider>,
    pub recommendations: RecommendationService,
    /// Resolutions run here, detached from the request that started them, so a
    /// client disconnect cannot abort a scorer call or its persistence.
    pub resolutions: TaskTracker,
}

impl AppState {
    /// Wires every port from one storage adapter plus the two outbound services.
    pub fn new<S>(
        config: Arc<Config>,
        store: Arc<S>,
        scorer: Arc<dyn RecommendationScorer>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self
    where
        S: UserStore
            + SessionStore
            + AnswerLogStore
            + QuestionCatalog
            + RecommendationStore
            + 'static,
    {
        let claim_lease = chrono::Duration::from_std(config.resolve_claim_lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_CLAIM_LEASE_SECS));
        let recommendations = RecommendationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            scorer,
        )
        .with_claim_lease(claim_lease);

        Self {
            config,
            users: store.clone(),
            sessions: store.clone(),
            logs: store.clone(),
            questions: store,
            identity,
            recommendations,
            resolutions: TaskTracker::new(),
        }
    }
}
