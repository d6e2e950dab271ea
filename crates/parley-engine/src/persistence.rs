//! Model persistence bridge.
//!
//! The default before-reply-sent hook: once the turn settles it writes the
//! resolved state name onto the conversation model, serializes the model,
//! and stores the result under `"model"` in the response's outbound session
//! attributes. Persisted state is never left undefined — an event arriving
//! without a model gets a fresh default from the configured factory.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use parley_core::model::ModelFactory;
use parley_core::transition::Resolution;
use parley_core::turn::Turn;
use parley_core::FlowError;

use crate::hooks::ReplyHook;

pub struct ModelPersistence {
    factory: Arc<dyn ModelFactory>,
}

impl ModelPersistence {
    pub fn new(factory: Arc<dyn ModelFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl ReplyHook for ModelPersistence {
    async fn call(&self, turn: &mut Turn, resolution: &Resolution) -> Result<(), FlowError> {
        let state_name = resolution
            .state_name()
            .ok_or(FlowError::MissingTransition)?
            .to_string();

        if turn.event.model.is_none() {
            let fresh = self.factory.from_event(&turn.event);
            turn.event.model = Some(fresh);
        }
        let model = turn
            .event
            .model
            .as_mut()
            .ok_or_else(|| FlowError::Hook("model factory produced no model".into()))?;

        model.set_state(&state_name);
        let serialized = model.serialize().await?;
        debug!(state = %state_name, "persisting model into session attributes");
        turn.response.set_session_attribute("model", serialized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::event::{Event, Intent, RequestKind, Session};
    use parley_core::state::State;
    use parley_core::transition::Disposition;
    use parley_core::{DefaultModelFactory, Response};
    use serde_json::json;

    fn resolution_to(name: &str, terminal: bool) -> Resolution {
        let mut state = State::new(name);
        if terminal {
            state.terminal();
        }
        Resolution {
            state: Some(state),
            directives: Vec::new(),
            disposition: if terminal {
                Disposition::Terminal
            } else {
                Disposition::Yield
            },
        }
    }

    fn bridge() -> ModelPersistence {
        ModelPersistence::new(Arc::new(DefaultModelFactory))
    }

    #[tokio::test]
    async fn writes_resolved_state_into_session_attributes() {
        let event = Event::intent_request(Session::new("sess-1", true), Intent::new("Stop"), "alexa");
        let mut turn = Turn::new(event, Response::new());

        bridge()
            .call(&mut turn, &resolution_to("die", true))
            .await
            .unwrap();

        let model = turn.response.session_attributes().get("model").unwrap();
        assert_eq!(model["state"], "die");
    }

    #[tokio::test]
    async fn replaces_missing_model_with_default() {
        let mut session = Session::new("sess-1", false);
        session
            .attributes
            .insert("model".into(), json!({"state": "playing", "score": 4}));
        let event = Event::new(RequestKind::Intent, session, "alexa");
        let mut turn = Turn::new(event, Response::new());
        assert!(turn.event.model.is_none());

        bridge()
            .call(&mut turn, &resolution_to("waiting", false))
            .await
            .unwrap();

        // The default factory restored the persisted bag, then the bridge
        // rewrote its state.
        let model = turn.response.session_attributes().get("model").unwrap();
        assert_eq!(model["state"], "waiting");
        assert_eq!(model["score"], 4);
        assert!(turn.event.model.is_some());
    }

    #[tokio::test]
    async fn missing_destination_is_missing_transition() {
        let event = Event::intent_request(Session::new("sess-1", true), Intent::new("Stop"), "alexa");
        let mut turn = Turn::new(event, Response::new());
        let resolution = Resolution {
            state: None,
            directives: Vec::new(),
            disposition: Disposition::Continue,
        };

        let err = bridge().call(&mut turn, &resolution).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingTransition));
    }
}
