//! Conversational turn orchestration.
//!
//! This crate drives one turn of a voice/chat skill: a platform adapter
//! builds an [`Event`] and hands it to [`Application::execute`], which walks
//! the configured state graph, runs the lifecycle hook chains, writes
//! directives into the [`Response`], persists the conversation model, and
//! always hands a well-formed response back — failures included.
//!
//! Configuration happens once through [`ApplicationBuilder`]; the built
//! application is immutable and shared across turns.

pub mod app;
pub mod directives;
pub mod hooks;
pub mod persistence;
pub mod render;
pub mod resolver;

pub use app::{Application, ApplicationBuilder, FALLBACK_STATEMENT};
pub use directives::{DirectiveEngine, DirectiveHandler, DirectiveWriteback};
pub use hooks::{
    error_fn, last_some, lifecycle_fn, reply_fn, request_fn, state_fn, transition_fn,
    unhandled_fn, ErrorHook, HookList, HookRegistry, HookScope, LifecycleHook, ReplyHook,
    RequestHook, StateHook, TransitionHook, UnhandledHook,
};
pub use persistence::ModelPersistence;
pub use render::{PassthroughRenderer, RenderedView, Renderer, StaticRenderer};
pub use resolver::{TransitionResolver, DEFAULT_MAX_HOPS};

pub use parley_core::event::{Event, Intent, RequestKind, Session};
pub use parley_core::model::{ConversationModel, DefaultModel, DefaultModelFactory, ModelFactory};
pub use parley_core::response::{AttachedError, Response, ResponseError};
pub use parley_core::state::{enter_fn, ConfigError, EnterHandler, State, TransitionTarget};
pub use parley_core::transition::{Directive, Disposition, Resolution, Transition};
pub use parley_core::turn::Turn;
pub use parley_core::FlowError;
