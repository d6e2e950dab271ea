use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{RequestId, SessionId};
use crate::model::ConversationModel;

/// Kind of inbound request, as declared by the platform adapter.
///
/// `Intent` and `SessionEnded` are the conversational kinds: they carry (or
/// close) a dialog and get the full start-of-turn hook treatment. Everything
/// else is a platform-declared kind routed to its registered request hooks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Intent,
    SessionEnded,
    Platform(String),
}

impl RequestKind {
    pub fn is_conversational(&self) -> bool {
        matches!(self, Self::Intent | Self::SessionEnded)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Intent => "intent",
            Self::SessionEnded => "session_ended",
            Self::Platform(kind) => kind,
        }
    }
}

/// The matched user intent and its slot/parameter values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intent {
    pub name: String,
    pub params: Map<String, Value>,
}

impl Intent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// The conversation session as reported by the platform.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub new: bool,
    pub attributes: Map<String, Value>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, new: bool) -> Self {
        Self {
            session_id: SessionId::from_raw(session_id),
            new,
            attributes: Map::new(),
        }
    }
}

/// Inbound turn data, built once per turn by a platform adapter and mutated
/// by hooks during the turn.
pub struct Event {
    /// Correlation id minted when the event is built.
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub session: Session,
    pub intent: Option<Intent>,
    pub model: Option<Box<dyn ConversationModel>>,
    pub platform: String,
    pub application_id: Option<String>,
    /// Platform-reported failure when the session was terminated in error.
    pub session_error: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: RequestKind, session: Session, platform: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            kind,
            session,
            intent: None,
            model: None,
            platform: platform.into(),
            application_id: None,
            session_error: None,
            received_at: Utc::now(),
        }
    }

    /// Convenience constructor for an intent-bearing turn.
    pub fn intent_request(
        session: Session,
        intent: Intent,
        platform: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(RequestKind::Intent, session, platform);
        event.intent = Some(intent);
        event
    }

    pub fn with_application_id(mut self, id: impl Into<String>) -> Self {
        self.application_id = Some(id.into());
        self
    }

    pub fn intent_name(&self) -> Option<&str> {
        self.intent.as_ref().map(|i| i.name.as_str())
    }

    /// The state name persisted into `session.attributes.model.state` by a
    /// previous turn, if any.
    pub fn persisted_state(&self) -> Option<&str> {
        self.session
            .attributes
            .get("model")
            .and_then(|m| m.get("state"))
            .and_then(Value::as_str)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("request_id", &self.request_id)
            .field("kind", &self.kind)
            .field("session_id", &self.session.session_id)
            .field("intent", &self.intent)
            .field("platform", &self.platform)
            .field("has_model", &self.model.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversational_kinds() {
        assert!(RequestKind::Intent.is_conversational());
        assert!(RequestKind::SessionEnded.is_conversational());
        assert!(!RequestKind::Platform("AudioPlayer.PlaybackStarted".into()).is_conversational());
    }

    #[test]
    fn kind_names() {
        assert_eq!(RequestKind::Intent.name(), "intent");
        assert_eq!(RequestKind::SessionEnded.name(), "session_ended");
        assert_eq!(
            RequestKind::Platform("Display.ElementSelected".into()).name(),
            "Display.ElementSelected"
        );
    }

    #[test]
    fn persisted_state_reads_model_attribute() {
        let mut session = Session::new("sess-1", false);
        session
            .attributes
            .insert("model".into(), json!({"state": "playing", "score": 2}));
        let event = Event::new(RequestKind::Intent, session, "alexa");
        assert_eq!(event.persisted_state(), Some("playing"));
    }

    #[test]
    fn persisted_state_absent_on_fresh_session() {
        let event = Event::new(RequestKind::Intent, Session::new("sess-1", true), "alexa");
        assert_eq!(event.persisted_state(), None);
    }

    #[test]
    fn intent_request_constructor() {
        let event = Event::intent_request(
            Session::new("sess-1", true),
            Intent::new("Launch").with_param("level", json!("easy")),
            "alexa",
        );
        assert_eq!(event.intent_name(), Some("Launch"));
        assert_eq!(event.kind, RequestKind::Intent);
        assert_eq!(
            event.intent.as_ref().unwrap().params.get("level"),
            Some(&json!("easy"))
        );
    }
}
