use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::State;

/// One ordered `(key, payload)` directive instruction carried by a
/// transition. Keys are interpreted by the directive write-back engine;
/// unmatched keys are ignored there.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Directive {
    pub key: String,
    pub payload: Value,
}

impl Directive {
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// The descriptor produced by resolving a state against an intent: a control
/// sub-record (the destination) plus an ordered list of directive
/// instructions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
}

impl Transition {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transition to the named destination state.
    pub fn to(name: impl Into<String>) -> Self {
        Self {
            to: Some(name.into()),
            directives: Vec::new(),
        }
    }

    pub fn directive(mut self, key: impl Into<String>, payload: Value) -> Self {
        self.directives.push(Directive::new(key, payload));
        self
    }

    /// Speak the rendered view and end the session.
    pub fn tell(self, view: impl Into<String>) -> Self {
        let view = view.into();
        self.directive("tell", json!(view))
    }

    /// Speak the rendered view and wait for the user.
    pub fn ask(self, view: impl Into<String>) -> Self {
        let view = view.into();
        self.directive("ask", json!(view))
    }

    /// Speak the rendered view without ending the turn.
    pub fn say(self, view: impl Into<String>) -> Self {
        let view = view.into();
        self.directive("say", json!(view))
    }

    pub fn reprompt(self, view: impl Into<String>) -> Self {
        let view = view.into();
        self.directive("reprompt", json!(view))
    }

    /// A composite rendered view re-dispatched by sub-key.
    pub fn reply(self, view: impl Into<String>) -> Self {
        let view = view.into();
        self.directive("reply", json!(view))
    }

    pub fn has_directive(&self, key: &str) -> bool {
        self.directives.iter().any(|d| d.key == key)
    }

    pub fn directive_payload(&self, key: &str) -> Option<&Value> {
        self.directives.iter().find(|d| d.key == key).map(|d| &d.payload)
    }
}

/// How a resolved transition disposes of the turn. Decided once, at
/// resolution time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The response has produced turn-ending output.
    Yield,
    /// Resolution would keep walking the graph.
    Continue,
    /// The destination is a terminal state.
    Terminal,
}

/// A fully resolved transition: the destination state (if any), the
/// directives of the final hop, and the explicit disposition discriminant.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub state: Option<State>,
    pub directives: Vec<Directive>,
    pub disposition: Disposition,
}

impl Resolution {
    pub fn state_name(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.name.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.disposition == Disposition::Terminal
    }
}
