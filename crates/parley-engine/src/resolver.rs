//! Transition resolver.
//!
//! Walks the state graph for one turn: look up a transition for the current
//! state and intent, run the hook chains around it, and keep hopping until
//! the turn settles. The walk is an explicit loop with a configurable hop
//! cap; both multi-hop continuation and `to`-map alias chasing fail with
//! `ResolutionLoopExceeded` instead of looping forever.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use parley_core::state::{State, StateGraph, TransitionTarget, DIE_STATE, ENTRY_STATE};
use parley_core::transition::{Disposition, Resolution, Transition};
use parley_core::turn::Turn;
use parley_core::FlowError;

use crate::hooks::{last_some, StateHook, TransitionHook, UnhandledHook};

pub const DEFAULT_MAX_HOPS: usize = 100;

/// One turn's resolver, seeded with the hook chains already ordered for the
/// event's platform.
pub struct TransitionResolver<'a> {
    graph: &'a StateGraph,
    before: Vec<Arc<dyn StateHook>>,
    after: Vec<Arc<dyn TransitionHook>>,
    unhandled: Vec<Arc<dyn UnhandledHook>>,
    max_hops: usize,
}

impl<'a> TransitionResolver<'a> {
    pub fn new(
        graph: &'a StateGraph,
        before: Vec<Arc<dyn StateHook>>,
        after: Vec<Arc<dyn TransitionHook>>,
        unhandled: Vec<Arc<dyn UnhandledHook>>,
    ) -> Self {
        Self {
            graph,
            before,
            after,
            unhandled,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Resolve from the named starting state until the turn settles:
    /// the response is yielding, there is no destination, or the
    /// destination is terminal.
    #[instrument(skip(self, turn), fields(start = start, intent = turn.event.intent_name()))]
    pub async fn resolve(&self, turn: &mut Turn, start: &str) -> Result<Resolution, FlowError> {
        let mut current = self
            .graph
            .get(start)
            .ok_or_else(|| FlowError::UnknownState {
                name: start.to_string(),
            })?
            .clone();

        for hop in 0..self.max_hops {
            debug!(hop, state = %current.name, "resolving");

            for hook in &self.before {
                hook.call(turn, &current).await?;
            }

            let mut transition = self.resolve_in_state(turn, &current).await?;
            if transition.to.is_none() {
                transition.to = Some(DIE_STATE.to_string());
            }

            for hook in &self.after {
                hook.call(turn, &mut transition).await?;
            }

            // After-state-changed hooks may clear or rewrite the
            // destination; resolve whatever they left behind.
            let destination = match &transition.to {
                Some(name) => Some(
                    self.graph
                        .get(name)
                        .ok_or_else(|| FlowError::UnknownState { name: name.clone() })?
                        .clone(),
                ),
                None => None,
            };

            let terminal = destination.as_ref().is_some_and(|s| s.is_terminal);
            let disposition = if terminal {
                Disposition::Terminal
            } else if turn.response.is_yielding() {
                Disposition::Yield
            } else {
                Disposition::Continue
            };

            let settled =
                turn.response.is_yielding() || destination.is_none() || terminal;
            if settled {
                debug!(state = ?destination.as_ref().map(|s| &s.name), ?disposition, "turn settled");
                return Ok(Resolution {
                    state: destination,
                    directives: transition.directives,
                    disposition,
                });
            }

            // Continue within the same turn from the destination.
            current = destination.unwrap_or_else(|| current.clone());
        }

        Err(FlowError::ResolutionLoopExceeded {
            limit: self.max_hops,
        })
    }

    /// Single-state lookup with entry fallback and unhandled escalation.
    async fn resolve_in_state(
        &self,
        turn: &mut Turn,
        state: &State,
    ) -> Result<Transition, FlowError> {
        let mut attempted = self.lookup(turn, state).await?;

        // Entry fallback: one repoint to "entry", never repeated beyond it.
        if attempted.is_none() && state.name != ENTRY_STATE {
            debug!(state = %state.name, "no transition, falling back to entry");
            let entry = self
                .graph
                .get(ENTRY_STATE)
                .ok_or_else(|| FlowError::UnknownState {
                    name: ENTRY_STATE.to_string(),
                })?;
            attempted = self.lookup(turn, entry).await?;
        }

        if let Some(transition) = attempted {
            return Ok(transition);
        }

        // Unhandled escalation: dedicated recovery chain, last non-empty
        // result wins.
        let mut results = Vec::with_capacity(self.unhandled.len());
        for hook in &self.unhandled {
            results.push(hook.call(turn, &state.name).await?);
        }
        last_some(results).ok_or_else(|| FlowError::UnhandledState {
            state: state.name.clone(),
            intent: turn.event.intent_name().map(String::from),
        })
    }

    /// Lookup priority: intent-specific enter handler, generic
    /// `enter.entry` handler, then the declarative `to` map.
    async fn lookup(
        &self,
        turn: &mut Turn,
        state: &State,
    ) -> Result<Option<Transition>, FlowError> {
        let intent_name = turn.event.intent_name().map(String::from);

        if let Some(name) = &intent_name {
            if let Some(handler) = state.enter_handler(name) {
                let handler = Arc::clone(handler);
                if let Some(transition) = handler.enter(turn).await? {
                    return Ok(Some(transition));
                }
            }
        }

        if let Some(handler) = state.entry_handler() {
            let handler = Arc::clone(handler);
            if let Some(transition) = handler.enter(turn).await? {
                return Ok(Some(transition));
            }
        }

        if state.has_routes() {
            let Some(name) = &intent_name else {
                // Declarative routes are keyed by intent; an event without
                // one cannot resolve here.
                return Err(FlowError::MissingIntent);
            };
            return self.chase_aliases(state, name);
        }

        Ok(None)
    }

    /// Follow `to`-map aliases: a destination naming another key of the
    /// same map is chased until a concrete destination or inline transition
    /// appears. Cycles fail deterministically.
    fn chase_aliases(&self, state: &State, intent: &str) -> Result<Option<Transition>, FlowError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut key = intent;

        loop {
            match state.target(key) {
                None => return Ok(None),
                Some(TransitionTarget::Inline(transition)) => {
                    return Ok(Some(transition.clone()));
                }
                Some(TransitionTarget::Name(dest)) => {
                    if !state.has_route(dest) {
                        return Ok(Some(Transition::to(dest.clone())));
                    }
                    if !seen.insert(key) {
                        return Err(FlowError::ResolutionLoopExceeded { limit: seen.len() });
                    }
                    key = dest;
                }
            }
        }
    }
}
