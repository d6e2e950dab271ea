use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Violations of the response accumulation invariants.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("can't append to already yielding response")]
    AlreadyYielding,
}

/// Error metadata attached to a response recovered by the error hook chain.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedError {
    pub kind: String,
    pub message: String,
}

/// The platform-neutral response descriptor accumulated over one turn.
///
/// Adapters serialize this into their wire format after
/// `Application::execute` returns. Once the response is yielding it has
/// produced turn-ending output and no further statement may be appended.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Response {
    statements: Vec<String>,
    reprompt: Option<String>,
    directives: Vec<Value>,
    terminate: bool,
    yielding: bool,
    session_attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<AttachedError>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spoken/text statement.
    pub fn add_statement(&mut self, text: impl Into<String>) -> Result<(), ResponseError> {
        if self.yielding {
            return Err(ResponseError::AlreadyYielding);
        }
        self.statements.push(text.into());
        Ok(())
    }

    /// Overwrite the single reprompt slot. Last write wins.
    pub fn add_reprompt(&mut self, text: impl Into<String>) {
        self.reprompt = Some(text.into());
    }

    pub fn add_directive(&mut self, directive: Value) {
        self.directives.push(directive);
    }

    /// Check for a raw directive whose `type` field matches.
    pub fn has_directive(&self, type_name: &str) -> bool {
        self.directives
            .iter()
            .any(|d| d.get("type").and_then(Value::as_str) == Some(type_name))
    }

    pub fn set_terminate(&mut self, terminate: bool) {
        self.terminate = terminate;
    }

    /// Mark the response as having produced turn-ending output.
    pub fn set_yield(&mut self) {
        self.yielding = true;
    }

    pub fn is_yielding(&self) -> bool {
        self.yielding
    }

    pub fn terminates(&self) -> bool {
        self.terminate
    }

    /// Reset accumulated output, keeping session attributes.
    pub fn clear(&mut self) {
        self.statements.clear();
        self.reprompt = None;
        self.directives.clear();
        self.terminate = false;
        self.yielding = false;
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn reprompt(&self) -> Option<&str> {
        self.reprompt.as_deref()
    }

    pub fn directives(&self) -> &[Value] {
        &self.directives
    }

    /// Write an outbound session attribute for the adapter to persist.
    pub fn set_session_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.session_attributes.insert(key.into(), value);
    }

    pub fn session_attributes(&self) -> &Map<String, Value> {
        &self.session_attributes
    }

    pub fn attach_error(&mut self, kind: &str, message: impl Into<String>) {
        self.error = Some(AttachedError {
            kind: kind.to_string(),
            message: message.into(),
        });
    }

    pub fn attached_error(&self) -> Option<&AttachedError> {
        self.error.as_ref()
    }
}
