use crate::model::ModelError;
use crate::response::ResponseError;

/// Typed error hierarchy for a single conversation turn.
///
/// Every variant is recoverable at the dispatch layer: the orchestrator
/// converts whatever reaches its top-level catch into a well-formed response
/// via the error hook chain. Construction-time problems are a separate type
/// ([`crate::state::ConfigError`]) and are fatal.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("unknown state: {name}")]
    UnknownState { name: String },

    #[error("unknown request type: {kind}")]
    UnknownRequestType { kind: String },

    #[error("unhandled state: no transition for intent {intent:?} in state {state}")]
    UnhandledState {
        state: String,
        intent: Option<String>,
    },

    #[error("session ended in error: {0}")]
    SessionEndedInError(String),

    #[error("request not authorized for this application")]
    Unauthorized,

    #[error("resolution requires an intent but the event carries none")]
    MissingIntent,

    #[error("missing transition: resolution produced no destination")]
    MissingTransition,

    #[error("resolution loop exceeded after {limit} hops")]
    ResolutionLoopExceeded { limit: usize },

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("render error: {0}")]
    Render(String),

    #[error("hook error: {0}")]
    Hook(String),
}

impl FlowError {
    /// Short classification string for logging and response metadata.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownState { .. } => "unknown_state",
            Self::UnknownRequestType { .. } => "unknown_request_type",
            Self::UnhandledState { .. } => "unhandled_state",
            Self::SessionEndedInError(_) => "session_ended_in_error",
            Self::Unauthorized => "unauthorized",
            Self::MissingIntent => "missing_intent",
            Self::MissingTransition => "missing_transition",
            Self::ResolutionLoopExceeded { .. } => "resolution_loop_exceeded",
            Self::Response(_) => "response",
            Self::Model(_) => "model",
            Self::Render(_) => "render",
            Self::Hook(_) => "hook",
        }
    }

    /// Whether the error came from a violated precondition rather than
    /// conversation data. Preconditions point at an adapter or graph bug.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingIntent | Self::MissingTransition)
    }
}
