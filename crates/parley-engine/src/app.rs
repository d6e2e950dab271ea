//! Dispatch orchestrator.
//!
//! [`Application`] is the top-level per-turn driver: it validates the
//! request, runs the start-of-turn hook chains, hands conversational turns
//! to the transition resolver, and guarantees that every turn — including a
//! failed one — ends with a well-formed response. Configuration happens
//! once through [`ApplicationBuilder`]; the built application is read-only
//! and shared across turns.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use parley_core::event::{Event, RequestKind};
use parley_core::model::{DefaultModelFactory, ModelFactory};
use parley_core::response::Response;
use parley_core::state::{ConfigError, State, StateGraph, StateGraphBuilder, ENTRY_STATE};
use parley_core::turn::Turn;
use parley_core::FlowError;

use crate::directives::{DirectiveEngine, DirectiveHandler, DirectiveWriteback};
use crate::hooks::{
    last_some, ErrorHook, HookRegistry, HookScope, LifecycleHook, ReplyHook, RequestHook,
    StateHook, TransitionHook, UnhandledHook,
};
use crate::persistence::ModelPersistence;
use crate::render::{PassthroughRenderer, Renderer};
use crate::resolver::{TransitionResolver, DEFAULT_MAX_HOPS};

/// Statement spoken when no error hook recovers a failed turn.
pub const FALLBACK_STATEMENT: &str = "An unrecoverable error occurred.";

macro_rules! hook_setters {
    ($($(#[$doc:meta])* $simple:ident / $with:ident => $field:ident: $trait:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $simple(&mut self, hook: Arc<$trait>) -> &mut Self {
                self.hooks.$field.add(hook, false, HookScope::Generic);
                self
            }

            pub fn $with(&mut self, hook: Arc<$trait>, run_last: bool, scope: HookScope) -> &mut Self {
                self.hooks.$field.add(hook, run_last, scope);
                self
            }
        )*
    };
}

/// Builder for [`Application`]. Collects the state graph, hook chains,
/// directive handlers, and adapter configuration, then freezes them.
pub struct ApplicationBuilder {
    graph: StateGraphBuilder,
    hooks: HookRegistry,
    renderer: Arc<dyn Renderer>,
    model_factory: Arc<dyn ModelFactory>,
    directive_handlers: Vec<Arc<dyn DirectiveHandler>>,
    allowed_application_ids: Vec<String>,
    max_hops: usize,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            graph: StateGraphBuilder::new(),
            hooks: HookRegistry::new(),
            renderer: Arc::new(PassthroughRenderer),
            model_factory: Arc::new(DefaultModelFactory),
            directive_handlers: Vec::new(),
            allowed_application_ids: Vec::new(),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// Get or insert a named state for configuration.
    pub fn state(&mut self, name: &str) -> &mut State {
        self.graph.state(name)
    }

    pub fn renderer(&mut self, renderer: Arc<dyn Renderer>) -> &mut Self {
        self.renderer = renderer;
        self
    }

    pub fn model_factory(&mut self, factory: Arc<dyn ModelFactory>) -> &mut Self {
        self.model_factory = factory;
        self
    }

    /// Add an application id to the allow-list. An empty allow-list admits
    /// every event.
    pub fn allow_application_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.allowed_application_ids.push(id.into());
        self
    }

    /// Cap for resolution hops within one turn.
    pub fn max_resolution_hops(&mut self, max_hops: usize) -> &mut Self {
        self.max_hops = max_hops;
        self
    }

    /// Register a directive handler under its key, replacing any built-in
    /// with the same key.
    pub fn directive_handler(&mut self, handler: Arc<dyn DirectiveHandler>) -> &mut Self {
        self.directive_handlers.push(handler);
        self
    }

    hook_setters! {
        /// Run at the start of every conversational turn.
        on_request_started / on_request_started_with => request_started: dyn LifecycleHook;
        /// Run when a conversational turn opens a new session.
        on_session_started / on_session_started_with => session_started: dyn LifecycleHook;
        /// Run when the turn settles on a terminal state or the platform
        /// closes the session.
        on_session_ended / on_session_ended_with => session_ended: dyn LifecycleHook;
        /// Recovery chain for failed turns; first produced response wins.
        on_error / on_error_with => error: dyn ErrorHook;
        /// Run before each resolution hop.
        on_before_state_changed / on_before_state_changed_with => before_state_changed: dyn StateHook;
        /// Run after each hop resolves; may mutate the transition.
        on_after_state_changed / on_after_state_changed_with => after_state_changed: dyn TransitionHook;
        /// Run once per conversational turn before the reply returns.
        on_before_reply_sent / on_before_reply_sent_with => before_reply_sent: dyn ReplyHook;
        /// Recovery chain for unmatched intents; last non-empty transition
        /// wins.
        on_unhandled_state / on_unhandled_state_with => unhandled_state: dyn UnhandledHook;
    }

    /// Register a handler for a platform-declared request type.
    pub fn on_request(&mut self, kind: RequestKind, hook: Arc<dyn RequestHook>) -> &mut Self {
        self.hooks.on_request(kind, hook, false, HookScope::Generic);
        self
    }

    pub fn on_request_with(
        &mut self,
        kind: RequestKind,
        hook: Arc<dyn RequestHook>,
        run_last: bool,
        scope: HookScope,
    ) -> &mut Self {
        self.hooks.on_request(kind, hook, run_last, scope);
        self
    }

    /// Validate the configuration and freeze the application. The default
    /// directive write-back and model persistence hooks are installed ahead
    /// of user hooks in the normal tier.
    pub fn build(self) -> Result<Application, ConfigError> {
        let graph = self.graph.build()?;

        let mut engine = DirectiveEngine::new(Arc::clone(&self.renderer));
        for handler in self.directive_handlers {
            engine.register(handler);
        }
        let engine = Arc::new(engine);

        let mut hooks = HookRegistry::new();
        hooks.after_state_changed.add(
            Arc::new(DirectiveWriteback::new(Arc::clone(&engine))),
            false,
            HookScope::Generic,
        );
        hooks.before_reply_sent.add(
            Arc::new(ModelPersistence::new(Arc::clone(&self.model_factory))),
            false,
            HookScope::Generic,
        );
        hooks.extend(self.hooks);

        Ok(Application {
            graph: Arc::new(graph),
            hooks,
            allowed_application_ids: self.allowed_application_ids,
            max_hops: self.max_hops,
        })
    }
}

/// The per-turn dispatch orchestrator. One call to [`Application::execute`]
/// per turn; it never errors outward.
pub struct Application {
    graph: Arc<StateGraph>,
    hooks: HookRegistry,
    allowed_application_ids: Vec<String>,
    max_hops: usize,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("graph", &self.graph)
            .field("allowed_application_ids", &self.allowed_application_ids)
            .field("max_hops", &self.max_hops)
            .finish_non_exhaustive()
    }
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    /// Drive one turn to completion. Whatever happens, the adapter gets a
    /// response back: failures are converted through the error hook chain.
    #[instrument(
        skip(self, event, response),
        fields(request_id = %event.request_id, kind = event.kind.name(), platform = %event.platform)
    )]
    pub async fn execute(&self, event: Event, response: Response) -> Response {
        let mut turn = Turn::new(event, response);
        match self.dispatch(&mut turn).await {
            Ok(()) => turn.into_response(),
            Err(error) => self.handle_errors(turn, error).await,
        }
    }

    async fn dispatch(&self, turn: &mut Turn) -> Result<(), FlowError> {
        self.check_application_id(&turn.event)?;

        let kind = turn.event.kind.clone();
        let platform = turn.event.platform.clone();

        if !kind.is_conversational() && !self.hooks.has_request_hooks(&kind) {
            return Err(FlowError::UnknownRequestType {
                kind: kind.name().to_string(),
            });
        }

        if kind.is_conversational() {
            for hook in self.hooks.request_started.ordered(Some(&platform)) {
                hook.call(turn).await?;
            }
            if let Some(message) = turn.event.session_error.clone() {
                return Err(FlowError::SessionEndedInError(message));
            }
            if turn.event.session.new {
                for hook in self.hooks.session_started.ordered(Some(&platform)) {
                    hook.call(turn).await?;
                }
            }
        }

        // The conversational kinds have built-in default handlers; hooks
        // registered for those kinds run afterwards and may replace the
        // default's response.
        match &kind {
            RequestKind::Intent => {
                self.run_state_machine(turn).await?;
            }
            RequestKind::SessionEnded => {
                for hook in self.hooks.session_ended.ordered(Some(&platform)) {
                    hook.call(turn).await?;
                }
            }
            RequestKind::Platform(_) => {}
        }
        self.run_request_hooks(&kind, turn).await
    }

    /// Run every hook registered for the request kind in order; the last
    /// non-empty response replaces the turn's, otherwise the original
    /// stands.
    async fn run_request_hooks(
        &self,
        kind: &RequestKind,
        turn: &mut Turn,
    ) -> Result<(), FlowError> {
        let platform = turn.event.platform.clone();
        let hooks = self.hooks.request_hooks(kind, Some(&platform));
        let mut results = Vec::with_capacity(hooks.len());
        for hook in hooks {
            results.push(hook.call(turn).await?);
        }
        if let Some(response) = last_some(results) {
            turn.response = response;
        }
        Ok(())
    }

    /// The default conversational turn handler.
    async fn run_state_machine(&self, turn: &mut Turn) -> Result<(), FlowError> {
        let platform = turn.event.platform.clone();
        let start = self.starting_state(&turn.event);
        debug!(start = %start, "running state machine");

        let resolver = TransitionResolver::new(
            &self.graph,
            self.hooks.before_state_changed.ordered(Some(&platform)),
            self.hooks.after_state_changed.ordered(Some(&platform)),
            self.hooks.unhandled_state.ordered(Some(&platform)),
        )
        .with_max_hops(self.max_hops);

        let resolution = resolver.resolve(turn, &start).await?;

        if resolution.is_terminal() {
            for hook in self.hooks.session_ended.ordered(Some(&platform)) {
                hook.call(turn).await?;
            }
        }
        for hook in self.hooks.before_reply_sent.ordered(Some(&platform)) {
            hook.call(turn, &resolution).await?;
        }
        Ok(())
    }

    /// New sessions start at "entry"; resumed sessions at their persisted
    /// state, with terminal names normalized back to "entry".
    fn starting_state(&self, event: &Event) -> String {
        if event.session.new {
            return ENTRY_STATE.to_string();
        }
        match event.persisted_state() {
            Some(name) if self.graph.is_terminal(name) => ENTRY_STATE.to_string(),
            Some(name) => name.to_string(),
            None => ENTRY_STATE.to_string(),
        }
    }

    /// The single recovery path: run the error chain, return the first
    /// produced response, or a generic fallback. Either way the error is
    /// attached as response metadata.
    async fn handle_errors(&self, mut turn: Turn, error: FlowError) -> Response {
        warn!(error = %error, kind = error.error_kind(), "turn failed, running error hooks");
        let platform = turn.event.platform.clone();

        for hook in self.hooks.error.ordered(Some(&platform)) {
            match hook.call(&mut turn, &error).await {
                Ok(Some(mut response)) => {
                    response.attach_error(error.error_kind(), error.to_string());
                    return response;
                }
                Ok(None) => {}
                Err(hook_error) => {
                    warn!(error = %hook_error, "error hook failed, trying next");
                }
            }
        }

        let mut response = Response::new();
        // A fresh response is never yielding, so the append cannot fail.
        let _ = response.add_statement(FALLBACK_STATEMENT);
        response.set_terminate(true);
        response.set_yield();
        response.attach_error(error.error_kind(), error.to_string());
        response
    }

    fn check_application_id(&self, event: &Event) -> Result<(), FlowError> {
        if self.allowed_application_ids.is_empty() {
            return Ok(());
        }
        match &event.application_id {
            Some(id) if self.allowed_application_ids.iter().any(|allowed| allowed == id) => Ok(()),
            _ => Err(FlowError::Unauthorized),
        }
    }
}
