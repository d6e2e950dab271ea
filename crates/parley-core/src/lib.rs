//! Platform-neutral data model for conversational-turn orchestration:
//! events, sessions, the response accumulator, conversation states and
//! transitions, the persisted model seam, and the turn-scoped error
//! taxonomy. Engine logic lives in `parley-engine`.

pub mod errors;
pub mod event;
pub mod ids;
pub mod model;
pub mod response;
pub mod state;
pub mod transition;
pub mod turn;

pub use errors::FlowError;
pub use event::{Event, Intent, RequestKind, Session};
pub use model::{ConversationModel, DefaultModel, DefaultModelFactory, ModelError, ModelFactory};
pub use response::{Response, ResponseError};
pub use state::{
    enter_fn, ConfigError, EnterHandler, State, StateGraph, StateGraphBuilder, TransitionTarget,
    DIE_STATE, ENTRY_STATE,
};
pub use transition::{Directive, Disposition, Resolution, Transition};
pub use turn::Turn;
