use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::event::Event;

/// Model serialization failure.
#[derive(Clone, Debug, thiserror::Error)]
#[error("model serialization failed: {0}")]
pub struct ModelError(pub String);

/// Conversation-scoped user data, persisted across turns in session
/// attributes. Serialization may suspend (backends can be remote).
#[async_trait]
pub trait ConversationModel: Send + Sync {
    /// The conversation state name carried by the model, if set.
    fn state(&self) -> Option<&str>;

    /// Record the resolved state name. Called by the persistence bridge
    /// before serialization.
    fn set_state(&mut self, name: &str);

    async fn serialize(&self) -> Result<Value, ModelError>;
}

/// Constructs a model from an inbound event ("construct-from-event").
pub trait ModelFactory: Send + Sync {
    fn from_event(&self, event: &Event) -> Box<dyn ConversationModel>;
}

/// Default model: an open JSON bag plus the resolved state name.
#[derive(Clone, Debug, Default)]
pub struct DefaultModel {
    state: Option<String>,
    data: Map<String, Value>,
}

impl DefaultModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a model from a persisted `{"state": ..., ...}` value.
    pub fn from_value(value: &Value) -> Self {
        let mut data = value.as_object().cloned().unwrap_or_default();
        let state = data
            .remove("state")
            .and_then(|v| v.as_str().map(String::from));
        Self { state, data }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }
}

#[async_trait]
impl ConversationModel for DefaultModel {
    fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    fn set_state(&mut self, name: &str) {
        self.state = Some(name.to_string());
    }

    async fn serialize(&self) -> Result<Value, ModelError> {
        let mut out = self.data.clone();
        if let Some(state) = &self.state {
            out.insert("state".into(), Value::String(state.clone()));
        }
        Ok(Value::Object(out))
    }
}

/// Factory for [`DefaultModel`]: restores from the session's persisted
/// `model` attribute when present, otherwise starts fresh.
#[derive(Clone, Debug, Default)]
pub struct DefaultModelFactory;

impl ModelFactory for DefaultModelFactory {
    fn from_event(&self, event: &Event) -> Box<dyn ConversationModel> {
        match event.session.attributes.get("model") {
            Some(value) => Box::new(DefaultModel::from_value(value)),
            None => Box::new(DefaultModel::new()),
        }
    }
}
