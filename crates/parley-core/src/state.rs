use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::FlowError;
use crate::transition::Transition;
use crate::turn::Turn;

/// Name of the state every graph must contain and every fallback lands on.
pub const ENTRY_STATE: &str = "entry";
/// Name of the synthesized terminal state transitions default to.
pub const DIE_STATE: &str = "die";

/// Problems detected while building the application. Fatal at construction,
/// never seen during a turn.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("state graph has no \"entry\" state")]
    MissingEntryState,
}

/// A procedural intent handler attached to a state. May suspend.
#[async_trait]
pub trait EnterHandler: Send + Sync {
    async fn enter(&self, turn: &mut Turn) -> Result<Option<Transition>, FlowError>;
}

struct FnEnterHandler<F>(F);

#[async_trait]
impl<F> EnterHandler for FnEnterHandler<F>
where
    F: Fn(&mut Turn) -> Result<Option<Transition>, FlowError> + Send + Sync,
{
    async fn enter(&self, turn: &mut Turn) -> Result<Option<Transition>, FlowError> {
        (self.0)(turn)
    }
}

/// Wrap a synchronous closure as an [`EnterHandler`]. Handlers that need to
/// suspend implement the trait directly.
pub fn enter_fn<F>(f: F) -> Arc<dyn EnterHandler>
where
    F: Fn(&mut Turn) -> Result<Option<Transition>, FlowError> + Send + Sync + 'static,
{
    Arc::new(FnEnterHandler(f))
}

/// Declarative destination of a `to` route: another state's name, or an
/// inline transition.
#[derive(Clone)]
pub enum TransitionTarget {
    Name(String),
    Inline(Transition),
}

impl From<&str> for TransitionTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TransitionTarget {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Transition> for TransitionTarget {
    fn from(transition: Transition) -> Self {
        Self::Inline(transition)
    }
}

/// A named node in the conversation graph. Configured once at application
/// setup, immutable during turns.
#[derive(Clone)]
pub struct State {
    pub name: String,
    enter: HashMap<String, Arc<dyn EnterHandler>>,
    to: HashMap<String, TransitionTarget>,
    pub is_terminal: bool,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enter: HashMap::new(),
            to: HashMap::new(),
            is_terminal: false,
        }
    }

    /// Attach a procedural handler for an intent name, or for the literal
    /// `"entry"` key to handle any intent.
    pub fn on_enter(&mut self, intent: impl Into<String>, handler: Arc<dyn EnterHandler>) -> &mut Self {
        self.enter.insert(intent.into(), handler);
        self
    }

    /// Add a declarative route for an intent name.
    pub fn to(&mut self, intent: impl Into<String>, target: impl Into<TransitionTarget>) -> &mut Self {
        self.to.insert(intent.into(), target.into());
        self
    }

    pub fn terminal(&mut self) -> &mut Self {
        self.is_terminal = true;
        self
    }

    pub fn enter_handler(&self, intent: &str) -> Option<&Arc<dyn EnterHandler>> {
        self.enter.get(intent)
    }

    /// The generic `enter.entry` handler, if present.
    pub fn entry_handler(&self) -> Option<&Arc<dyn EnterHandler>> {
        self.enter.get(ENTRY_STATE)
    }

    pub fn target(&self, intent: &str) -> Option<&TransitionTarget> {
        self.to.get(intent)
    }

    pub fn has_route(&self, intent: &str) -> bool {
        self.to.contains_key(intent)
    }

    pub fn has_routes(&self) -> bool {
        !self.to.is_empty()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("enter", &self.enter.keys().collect::<Vec<_>>())
            .field("to", &self.to.keys().collect::<Vec<_>>())
            .field("is_terminal", &self.is_terminal)
            .finish()
    }
}

/// Builder for the immutable state graph.
#[derive(Debug, Default)]
pub struct StateGraphBuilder {
    states: HashMap<String, State>,
}

impl StateGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or insert the named state for configuration.
    pub fn state(&mut self, name: &str) -> &mut State {
        self.states
            .entry(name.to_string())
            .or_insert_with(|| State::new(name))
    }

    /// Validate and freeze the graph. The graph must contain `"entry"`; a
    /// terminal `"die"` is synthesized when absent.
    pub fn build(mut self) -> Result<StateGraph, ConfigError> {
        if !self.states.contains_key(ENTRY_STATE) {
            return Err(ConfigError::MissingEntryState);
        }
        self.states.entry(DIE_STATE.to_string()).or_insert_with(|| {
            let mut die = State::new(DIE_STATE);
            die.terminal();
            die
        });
        Ok(StateGraph {
            states: self.states,
        })
    }
}

/// The frozen conversation graph.
#[derive(Clone, Debug)]
pub struct StateGraph {
    states: HashMap<String, State>,
}

impl StateGraph {
    pub fn get(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.states.get(name).is_some_and(|s| s.is_terminal)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_is_fatal() {
        let mut builder = StateGraphBuilder::new();
        builder.state("lobby");
        assert_eq!(builder.build().unwrap_err(), ConfigError::MissingEntryState);
    }

    #[test]
    fn die_is_synthesized_terminal() {
        let mut builder = StateGraphBuilder::new();
        builder.state("entry");
        let graph = builder.build().unwrap();
        let die = graph.get(DIE_STATE).unwrap();
        assert!(die.is_terminal);
    }

    #[test]
    fn configured_die_is_kept() {
        let mut builder = StateGraphBuilder::new();
        builder.state("entry");
        builder.state("die").terminal().to("Restart", "entry");
        let graph = builder.build().unwrap();
        assert!(graph.get("die").unwrap().has_route("Restart"));
    }

    #[test]
    fn routes_and_handlers() {
        let mut builder = StateGraphBuilder::new();
        builder
            .state("entry")
            .to("Launch", "greeting")
            .on_enter("Help", enter_fn(|_| Ok(Some(Transition::to("help")))));
        let graph = builder.build().unwrap();

        let entry = graph.get("entry").unwrap();
        assert!(entry.has_route("Launch"));
        assert!(entry.enter_handler("Help").is_some());
        assert!(entry.enter_handler("Launch").is_none());
        assert!(entry.entry_handler().is_none());
        assert!(matches!(
            entry.target("Launch"),
            Some(TransitionTarget::Name(n)) if n == "greeting"
        ));
    }

    #[test]
    fn inline_targets() {
        let mut builder = StateGraphBuilder::new();
        builder
            .state("entry")
            .to("Stop", Transition::to("die").tell("Goodbye"));
        let graph = builder.build().unwrap();
        assert!(matches!(
            graph.get("entry").unwrap().target("Stop"),
            Some(TransitionTarget::Inline(t)) if t.has_directive("tell")
        ));
    }

    #[test]
    fn terminal_lookup() {
        let mut builder = StateGraphBuilder::new();
        builder.state("entry");
        let graph = builder.build().unwrap();
        assert!(graph.is_terminal("die"));
        assert!(!graph.is_terminal("entry"));
        assert!(!graph.is_terminal("nowhere"));
    }
}
