pub mod domain;
pub mod memory;
pub mod ports;
pub mod recommendation;
pub mod scorer;

pub use domain::{
    AnswerLogEntry, Question, QuestionId, Recommendation, RecommendationQuestion,
    RecommendationState, RecommendationStrategy, RecommendedQuestion, Session, User,
    VerifiedIdentity,
};
pub use memory::InMemoryStore;
pub use ports::{
    AnswerLogStore, IdentityProvider, PortError, PortResult, QuestionCatalog,
    RecommendationScorer, RecommendationStore, SessionStore, UserStore,
};
pub use recommendation::{RecommendationError, RecommendationService};
pub use scorer::{ScorerRequest, ScorerResponse};
