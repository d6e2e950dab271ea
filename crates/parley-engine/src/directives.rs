//! Directive write-back engine.
//!
//! A resolved transition carries an ordered list of `(key, payload)`
//! directive instructions. The engine walks that list and dispatches each
//! key to its registered handler, which mutates the turn's response.
//! Unmatched keys are ignored so applications can carry their own keys past
//! the engine. The engine itself is installed as the default
//! after-state-changed hook.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use parley_core::transition::{Directive, Transition};
use parley_core::turn::Turn;
use parley_core::{FlowError, Response};

use crate::hooks::TransitionHook;
use crate::render::{RenderedView, Renderer};

/// A registered directive handler for one key.
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    fn key(&self) -> &str;

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        renderer: &dyn Renderer,
    ) -> Result<(), FlowError>;
}

fn view_token(key: &str, payload: &Value) -> Result<String, FlowError> {
    payload
        .as_str()
        .map(String::from)
        .ok_or_else(|| FlowError::Render(format!("payload for \"{key}\" must be a view token")))
}

// Response write-backs shared between the scalar handlers and `reply`
// re-dispatch.

fn write_tell(response: &mut Response, text: String) -> Result<(), FlowError> {
    response.add_statement(text)?;
    response.set_terminate(true);
    response.set_yield();
    Ok(())
}

fn write_ask(response: &mut Response, text: String) -> Result<(), FlowError> {
    response.add_statement(text)?;
    response.set_terminate(false);
    response.set_yield();
    Ok(())
}

fn write_say(response: &mut Response, text: String) -> Result<(), FlowError> {
    response.add_statement(text)?;
    Ok(())
}

fn write_raw_directives(response: &mut Response, payload: &Value) {
    match payload {
        Value::Array(items) => {
            for item in items {
                response.add_directive(item.clone());
            }
        }
        other => response.add_directive(other.clone()),
    }
}

fn write_view(view: RenderedView, response: &mut Response) -> Result<(), FlowError> {
    if let Some(text) = view.tell {
        write_tell(response, text)?;
    }
    if let Some(text) = view.ask {
        write_ask(response, text)?;
    }
    if let Some(text) = view.say {
        write_say(response, text)?;
    }
    if let Some(text) = view.reprompt {
        response.add_reprompt(text);
    }
    for directive in view.directives {
        response.add_directive(directive);
    }
    Ok(())
}

/// `tell`: speak and end the session.
pub struct TellHandler;

#[async_trait]
impl DirectiveHandler for TellHandler {
    fn key(&self) -> &str {
        "tell"
    }

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        renderer: &dyn Renderer,
    ) -> Result<(), FlowError> {
        let token = view_token("tell", payload)?;
        let text = renderer.render_text(&token, turn).await?;
        write_tell(&mut turn.response, text)
    }
}

/// `ask`: speak and wait for the user. Accepts a view token, or an object
/// with `ask` and an optional `reprompt` sub-key.
pub struct AskHandler;

#[async_trait]
impl DirectiveHandler for AskHandler {
    fn key(&self) -> &str {
        "ask"
    }

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        renderer: &dyn Renderer,
    ) -> Result<(), FlowError> {
        let (ask_token, reprompt_token) = match payload {
            Value::Object(map) => {
                let ask = map
                    .get("ask")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FlowError::Render("ask object missing \"ask\" key".into()))?;
                (ask.to_string(), map.get("reprompt").and_then(Value::as_str).map(String::from))
            }
            other => (view_token("ask", other)?, None),
        };

        let text = renderer.render_text(&ask_token, turn).await?;
        write_ask(&mut turn.response, text)?;
        if let Some(token) = reprompt_token {
            let text = renderer.render_text(&token, turn).await?;
            turn.response.add_reprompt(text);
        }
        Ok(())
    }
}

/// `say`: speak without yielding or terminating.
pub struct SayHandler;

#[async_trait]
impl DirectiveHandler for SayHandler {
    fn key(&self) -> &str {
        "say"
    }

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        renderer: &dyn Renderer,
    ) -> Result<(), FlowError> {
        let token = view_token("say", payload)?;
        let text = renderer.render_text(&token, turn).await?;
        write_say(&mut turn.response, text)
    }
}

/// `reprompt`: overwrite the single reprompt slot. Last write wins.
pub struct RepromptHandler;

#[async_trait]
impl DirectiveHandler for RepromptHandler {
    fn key(&self) -> &str {
        "reprompt"
    }

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        renderer: &dyn Renderer,
    ) -> Result<(), FlowError> {
        let token = view_token("reprompt", payload)?;
        let text = renderer.render_text(&token, turn).await?;
        turn.response.add_reprompt(text);
        Ok(())
    }
}

/// `directives`: fan raw platform directive payloads onto the response.
pub struct RawDirectivesHandler;

#[async_trait]
impl DirectiveHandler for RawDirectivesHandler {
    fn key(&self) -> &str {
        "directives"
    }

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        _renderer: &dyn Renderer,
    ) -> Result<(), FlowError> {
        write_raw_directives(&mut turn.response, payload);
        Ok(())
    }
}

/// `reply`: resolve a rendered view object and re-dispatch its sub-keys.
pub struct ReplyHandler;

#[async_trait]
impl DirectiveHandler for ReplyHandler {
    fn key(&self) -> &str {
        "reply"
    }

    async fn apply(
        &self,
        payload: &Value,
        turn: &mut Turn,
        renderer: &dyn Renderer,
    ) -> Result<(), FlowError> {
        let token = view_token("reply", payload)?;
        let view = renderer.render(&token, turn).await?;
        write_view(view, &mut turn.response)
    }
}

/// The directive registry plus its renderer. Built once per application.
pub struct DirectiveEngine {
    handlers: HashMap<String, Arc<dyn DirectiveHandler>>,
    renderer: Arc<dyn Renderer>,
}

impl DirectiveEngine {
    /// An engine with the built-in handlers registered.
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        let mut engine = Self {
            handlers: HashMap::new(),
            renderer,
        };
        engine.register(Arc::new(TellHandler));
        engine.register(Arc::new(AskHandler));
        engine.register(Arc::new(SayHandler));
        engine.register(Arc::new(RepromptHandler));
        engine.register(Arc::new(RawDirectivesHandler));
        engine.register(Arc::new(ReplyHandler));
        engine
    }

    /// Register a handler under its key, replacing any previous handler for
    /// the same key.
    pub fn register(&mut self, handler: Arc<dyn DirectiveHandler>) {
        self.handlers.insert(handler.key().to_string(), handler);
    }

    pub fn has_handler(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Walk the transition's directive pairs in order, dispatching matched
    /// keys. Unmatched keys are ignored.
    pub async fn apply_all(
        &self,
        turn: &mut Turn,
        directives: &[Directive],
    ) -> Result<(), FlowError> {
        for directive in directives {
            match self.handlers.get(&directive.key) {
                Some(handler) => {
                    handler
                        .apply(&directive.payload, turn, self.renderer.as_ref())
                        .await?;
                }
                None => {
                    debug!(key = %directive.key, "no handler for directive key, skipping");
                }
            }
        }
        Ok(())
    }
}

/// Default after-state-changed hook: writes a resolved transition's
/// directives into the response.
pub struct DirectiveWriteback {
    engine: Arc<DirectiveEngine>,
}

impl DirectiveWriteback {
    pub fn new(engine: Arc<DirectiveEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TransitionHook for DirectiveWriteback {
    async fn call(&self, turn: &mut Turn, transition: &mut Transition) -> Result<(), FlowError> {
        self.engine.apply_all(turn, &transition.directives).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{PassthroughRenderer, StaticRenderer};
    use parley_core::event::{Event, RequestKind, Session};
    use parley_core::ResponseError;
    use serde_json::json;

    fn test_turn() -> Turn {
        let event = Event::new(RequestKind::Intent, Session::new("sess-1", true), "alexa");
        Turn::new(event, Response::new())
    }

    fn passthrough_engine() -> DirectiveEngine {
        DirectiveEngine::new(Arc::new(PassthroughRenderer))
    }

    #[tokio::test]
    async fn tell_terminates_and_yields() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new().tell("Bye");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.statements(), ["Bye"]);
        assert!(turn.response.terminates());
        assert!(turn.response.is_yielding());
    }

    #[tokio::test]
    async fn ask_clears_terminate_and_yields() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        turn.response.set_terminate(true);
        let t = Transition::new().ask("What next?");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.statements(), ["What next?"]);
        assert!(!turn.response.terminates());
        assert!(turn.response.is_yielding());
    }

    #[tokio::test]
    async fn ask_object_form_sets_reprompt() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new()
            .directive("ask", json!({"ask": "What next?", "reprompt": "Still there?"}));

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.statements(), ["What next?"]);
        assert_eq!(turn.response.reprompt(), Some("Still there?"));
    }

    #[tokio::test]
    async fn say_appends_without_flags() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new().say("One").say("Two");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.statements(), ["One", "Two"]);
        assert!(!turn.response.terminates());
        assert!(!turn.response.is_yielding());
    }

    #[tokio::test]
    async fn reprompt_last_write_wins() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new().reprompt("first").reprompt("second");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.reprompt(), Some("second"));
    }

    #[tokio::test]
    async fn raw_directives_fan_out() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new().directive(
            "directives",
            json!([{"type": "AudioPlayer.Play"}, {"type": "Display.Render"}]),
        );

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.directives().len(), 2);
        assert!(turn.response.has_directive("AudioPlayer.Play"));
    }

    #[tokio::test]
    async fn unmatched_keys_are_ignored() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new()
            .directive("analytics", json!({"event": "launch"}))
            .say("Hi");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.statements(), ["Hi"]);
    }

    #[tokio::test]
    async fn reply_redispatches_rendered_view() {
        let renderer = StaticRenderer::new().view(
            "Greeting",
            RenderedView {
                ask: Some("Hello! What now?".into()),
                reprompt: Some("Still there?".into()),
                directives: vec![json!({"type": "Display.Render"})],
                ..RenderedView::default()
            },
        );
        let engine = DirectiveEngine::new(Arc::new(renderer));
        let mut turn = test_turn();
        let t = Transition::new().reply("Greeting");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert_eq!(turn.response.statements(), ["Hello! What now?"]);
        assert_eq!(turn.response.reprompt(), Some("Still there?"));
        assert!(turn.response.has_directive("Display.Render"));
        assert!(turn.response.is_yielding());
        assert!(!turn.response.terminates());
    }

    #[tokio::test]
    async fn append_after_yield_surfaces_hard_error() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new().tell("Bye").say("more");

        let err = engine.apply_all(&mut turn, &t.directives).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Response(ResponseError::AlreadyYielding)
        ));
    }

    #[tokio::test]
    async fn non_string_scalar_payload_is_render_error() {
        let engine = passthrough_engine();
        let mut turn = test_turn();
        let t = Transition::new().directive("tell", json!(42));

        let err = engine.apply_all(&mut turn, &t.directives).await.unwrap_err();
        assert!(matches!(err, FlowError::Render(_)));
    }

    #[tokio::test]
    async fn custom_handler_replaces_builtin() {
        struct QuietTell;

        #[async_trait]
        impl DirectiveHandler for QuietTell {
            fn key(&self) -> &str {
                "tell"
            }
            async fn apply(
                &self,
                _payload: &Value,
                turn: &mut Turn,
                _renderer: &dyn Renderer,
            ) -> Result<(), FlowError> {
                turn.response.set_yield();
                Ok(())
            }
        }

        let mut engine = passthrough_engine();
        engine.register(Arc::new(QuietTell));
        let mut turn = test_turn();
        let t = Transition::new().tell("Bye");

        engine.apply_all(&mut turn, &t.directives).await.unwrap();
        assert!(turn.response.statements().is_empty());
        assert!(turn.response.is_yielding());
    }
}
