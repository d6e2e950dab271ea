//! Lifecycle hook registry.
//!
//! Hooks are ordered, named callback chains run at fixed points of a turn.
//! Each lifecycle event owns four backing lists — {generic, platform} ×
//! {normal, run-last} — held as plain typed fields on [`HookRegistry`].
//! Within one invocation the order is always: generic-normal, scope-normal,
//! generic-run-last, scope-run-last, so generic hooks precede scope-specific
//! ones within a tier and run-last hooks follow every normal-tier hook.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use parley_core::event::RequestKind;
use parley_core::response::Response;
use parley_core::state::State;
use parley_core::transition::{Resolution, Transition};
use parley_core::turn::Turn;
use parley_core::FlowError;

/// Scope a hook is registered under. Generic hooks run for every platform;
/// platform hooks run only when the event's platform tag matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HookScope {
    Generic,
    Platform(String),
}

impl HookScope {
    pub fn platform(name: impl Into<String>) -> Self {
        Self::Platform(name.into())
    }
}

/// Hook run at a turn boundary (request-started, session-started,
/// session-ended). Mutates the turn in place.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn call(&self, turn: &mut Turn) -> Result<(), FlowError>;
}

/// Hook run before each resolution hop, with the state about to resolve.
#[async_trait]
pub trait StateHook: Send + Sync {
    async fn call(&self, turn: &mut Turn, state: &State) -> Result<(), FlowError>;
}

/// Hook run after a transition resolves. May mutate the transition in
/// place; later hooks observe earlier mutations. Return values are not
/// merged.
#[async_trait]
pub trait TransitionHook: Send + Sync {
    async fn call(&self, turn: &mut Turn, transition: &mut Transition) -> Result<(), FlowError>;
}

/// Hook run once per turn before the reply is handed back to the adapter.
#[async_trait]
pub trait ReplyHook: Send + Sync {
    async fn call(&self, turn: &mut Turn, resolution: &Resolution) -> Result<(), FlowError>;
}

/// Recovery hook for "no transition matched this intent in this state".
/// The chain keeps the last non-empty result.
#[async_trait]
pub trait UnhandledHook: Send + Sync {
    async fn call(&self, turn: &mut Turn, state: &str) -> Result<Option<Transition>, FlowError>;
}

/// Recovery hook for a failed turn. The first hook producing a response
/// wins.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn call(&self, turn: &mut Turn, error: &FlowError) -> Result<Option<Response>, FlowError>;
}

/// Handler chain member for a platform-declared request type. The chain
/// keeps the last non-empty response.
#[async_trait]
pub trait RequestHook: Send + Sync {
    async fn call(&self, turn: &mut Turn) -> Result<Option<Response>, FlowError>;
}

macro_rules! fn_hook {
    ($fn_name:ident, $trait_name:ident, ($($arg:ident: $ty:ty),*) -> $out:ty) => {
        pub fn $fn_name<F>(f: F) -> Arc<dyn $trait_name>
        where
            F: Fn(&mut Turn, $($ty),*) -> Result<$out, FlowError> + Send + Sync + 'static,
        {
            struct FnHook<F>(F);

            #[async_trait]
            impl<F> $trait_name for FnHook<F>
            where
                F: Fn(&mut Turn, $($ty),*) -> Result<$out, FlowError> + Send + Sync,
            {
                async fn call(&self, turn: &mut Turn, $($arg: $ty),*) -> Result<$out, FlowError> {
                    (self.0)(turn, $($arg),*)
                }
            }

            Arc::new(FnHook(f))
        }
    };
}

fn_hook!(lifecycle_fn, LifecycleHook, () -> ());
fn_hook!(state_fn, StateHook, (state: &State) -> ());
fn_hook!(transition_fn, TransitionHook, (transition: &mut Transition) -> ());
fn_hook!(reply_fn, ReplyHook, (resolution: &Resolution) -> ());
fn_hook!(unhandled_fn, UnhandledHook, (state: &str) -> Option<Transition>);
fn_hook!(error_fn, ErrorHook, (error: &FlowError) -> Option<Response>);
fn_hook!(request_fn, RequestHook, () -> Option<Response>);

/// Fold a chain of optional hook results, keeping the last non-empty one.
/// This is the aggregation contract for unhandled-state and request-type
/// chains.
pub fn last_some<T>(results: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    results.into_iter().flatten().last()
}

/// The four backing lists for one lifecycle event.
pub struct HookList<H: ?Sized> {
    generic: Vec<Arc<H>>,
    generic_last: Vec<Arc<H>>,
    platform: HashMap<String, Vec<Arc<H>>>,
    platform_last: HashMap<String, Vec<Arc<H>>>,
}

impl<H: ?Sized> Default for HookList<H> {
    fn default() -> Self {
        Self {
            generic: Vec::new(),
            generic_last: Vec::new(),
            platform: HashMap::new(),
            platform_last: HashMap::new(),
        }
    }
}

impl<H: ?Sized> HookList<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook to the list matching its tier and scope.
    pub fn add(&mut self, hook: Arc<H>, run_last: bool, scope: HookScope) {
        match (run_last, scope) {
            (false, HookScope::Generic) => self.generic.push(hook),
            (true, HookScope::Generic) => self.generic_last.push(hook),
            (false, HookScope::Platform(p)) => self.platform.entry(p).or_default().push(hook),
            (true, HookScope::Platform(p)) => {
                self.platform_last.entry(p).or_default().push(hook);
            }
        }
    }

    /// The single ordered sequence for one invocation: generic-normal,
    /// scope-normal, generic-run-last, scope-run-last.
    pub fn ordered(&self, platform: Option<&str>) -> Vec<Arc<H>> {
        let mut out: Vec<Arc<H>> = self.generic.clone();
        if let Some(p) = platform {
            if let Some(hooks) = self.platform.get(p) {
                out.extend(hooks.iter().cloned());
            }
        }
        out.extend(self.generic_last.iter().cloned());
        if let Some(p) = platform {
            if let Some(hooks) = self.platform_last.get(p) {
                out.extend(hooks.iter().cloned());
            }
        }
        out
    }

    /// Append every hook of `other` after this list's, tier by tier.
    pub fn extend(&mut self, other: HookList<H>) {
        self.generic.extend(other.generic);
        self.generic_last.extend(other.generic_last);
        for (p, hooks) in other.platform {
            self.platform.entry(p).or_default().extend(hooks);
        }
        for (p, hooks) in other.platform_last {
            self.platform_last.entry(p).or_default().extend(hooks);
        }
    }

    pub fn len(&self) -> usize {
        self.generic.len()
            + self.generic_last.len()
            + self.platform.values().map(Vec::len).sum::<usize>()
            + self.platform_last.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All hook chains of an application, keyed by lifecycle event as plain
/// typed fields. Configured once at construction, read-only during turns.
#[derive(Default)]
pub struct HookRegistry {
    pub request_started: HookList<dyn LifecycleHook>,
    pub session_started: HookList<dyn LifecycleHook>,
    pub session_ended: HookList<dyn LifecycleHook>,
    pub error: HookList<dyn ErrorHook>,
    pub before_state_changed: HookList<dyn StateHook>,
    pub after_state_changed: HookList<dyn TransitionHook>,
    pub before_reply_sent: HookList<dyn ReplyHook>,
    pub unhandled_state: HookList<dyn UnhandledHook>,
    request: HashMap<RequestKind, HookList<dyn RequestHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for a platform-declared request type.
    pub fn on_request(
        &mut self,
        kind: RequestKind,
        hook: Arc<dyn RequestHook>,
        run_last: bool,
        scope: HookScope,
    ) {
        self.request.entry(kind).or_default().add(hook, run_last, scope);
    }

    pub fn has_request_hooks(&self, kind: &RequestKind) -> bool {
        self.request.get(kind).is_some_and(|l| !l.is_empty())
    }

    pub fn request_hooks(
        &self,
        kind: &RequestKind,
        platform: Option<&str>,
    ) -> Vec<Arc<dyn RequestHook>> {
        self.request
            .get(kind)
            .map(|l| l.ordered(platform))
            .unwrap_or_default()
    }

    /// Append every chain of `other` after this registry's.
    pub fn extend(&mut self, other: HookRegistry) {
        self.request_started.extend(other.request_started);
        self.session_started.extend(other.session_started);
        self.session_ended.extend(other.session_ended);
        self.error.extend(other.error);
        self.before_state_changed.extend(other.before_state_changed);
        self.after_state_changed.extend(other.after_state_changed);
        self.before_reply_sent.extend(other.before_reply_sent);
        self.unhandled_state.extend(other.unhandled_state);
        for (kind, list) in other.request {
            self.request.entry(kind).or_default().extend(list);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::event::{Event, Session};
    use parley_core::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn test_turn() -> Turn {
        let event = Event::new(RequestKind::Intent, Session::new("sess-1", true), "alexa");
        Turn::new(event, Response::new())
    }

    /// Hook that records its label into a shared trace.
    fn tracer(trace: Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Arc<dyn LifecycleHook> {
        lifecycle_fn(move |_| {
            trace.lock().unwrap().push(label);
            Ok(())
        })
    }

    #[test]
    fn last_some_keeps_last_non_empty() {
        assert_eq!(last_some(vec![None, Some(1), None, Some(2), None]), Some(2));
        assert_eq!(last_some(vec![Some(7)]), Some(7));
        assert_eq!(last_some::<i32>(vec![None, None]), None);
        assert_eq!(last_some::<i32>(vec![]), None);
    }

    #[tokio::test]
    async fn ordering_across_scope_and_tier() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut list: HookList<dyn LifecycleHook> = HookList::new();

        // Registered deliberately out of invocation order.
        list.add(tracer(trace.clone(), "alexa-last"), true, HookScope::platform("alexa"));
        list.add(tracer(trace.clone(), "generic-last"), true, HookScope::Generic);
        list.add(tracer(trace.clone(), "alexa-1"), false, HookScope::platform("alexa"));
        list.add(tracer(trace.clone(), "generic-1"), false, HookScope::Generic);
        list.add(tracer(trace.clone(), "generic-2"), false, HookScope::Generic);

        let mut turn = test_turn();
        for hook in list.ordered(Some("alexa")) {
            hook.call(&mut turn).await.unwrap();
        }

        assert_eq!(
            *trace.lock().unwrap(),
            ["generic-1", "generic-2", "alexa-1", "generic-last", "alexa-last"]
        );
    }

    #[tokio::test]
    async fn other_platform_hooks_are_skipped() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut list: HookList<dyn LifecycleHook> = HookList::new();
        list.add(tracer(trace.clone(), "generic"), false, HookScope::Generic);
        list.add(tracer(trace.clone(), "google"), false, HookScope::platform("google"));

        let mut turn = test_turn();
        for hook in list.ordered(Some("alexa")) {
            hook.call(&mut turn).await.unwrap();
        }
        assert_eq!(*trace.lock().unwrap(), ["generic"]);
    }

    #[test]
    fn ordered_without_scope_is_generic_only() {
        let mut list: HookList<dyn LifecycleHook> = HookList::new();
        list.add(lifecycle_fn(|_| Ok(())), false, HookScope::Generic);
        list.add(lifecycle_fn(|_| Ok(())), false, HookScope::platform("alexa"));
        assert_eq!(list.ordered(None).len(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn extend_appends_after_existing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut base: HookList<dyn LifecycleHook> = HookList::new();
        base.add(lifecycle_fn(|_| Ok(())), false, HookScope::Generic);

        let mut extra: HookList<dyn LifecycleHook> = HookList::new();
        let c = counter.clone();
        extra.add(
            lifecycle_fn(move |_| {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
            false,
            HookScope::Generic,
        );

        base.extend(extra);
        assert_eq!(base.len(), 2);
    }

    #[tokio::test]
    async fn request_hooks_keyed_by_kind() {
        let mut registry = HookRegistry::new();
        let kind = RequestKind::Platform("AudioPlayer.PlaybackStarted".into());
        registry.on_request(
            kind.clone(),
            request_fn(|_| Ok(None)),
            false,
            HookScope::Generic,
        );

        assert!(registry.has_request_hooks(&kind));
        assert!(!registry.has_request_hooks(&RequestKind::Intent));
        assert_eq!(registry.request_hooks(&kind, None).len(), 1);
    }

    #[tokio::test]
    async fn unhandled_chain_last_non_empty_wins() {
        let mut list: HookList<dyn UnhandledHook> = HookList::new();
        list.add(
            unhandled_fn(|_, _| Ok(Some(Transition::to("a")))),
            false,
            HookScope::Generic,
        );
        list.add(unhandled_fn(|_, _| Ok(None)), false, HookScope::Generic);
        list.add(
            unhandled_fn(|_, _| Ok(Some(Transition::to("die")))),
            false,
            HookScope::Generic,
        );

        let mut turn = test_turn();
        let mut results = Vec::new();
        for hook in list.ordered(None) {
            results.push(hook.call(&mut turn, "entry").await.unwrap());
        }
        let winner = last_some(results).unwrap();
        assert_eq!(winner.to.as_deref(), Some("die"));
    }
}
