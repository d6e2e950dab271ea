use crate::event::Event;
use crate::response::Response;

/// The per-turn mutable bundle threaded through hooks, enter handlers, and
/// the resolver. Created by the orchestrator from the adapter's event and
/// response, discarded when the turn settles.
pub struct Turn {
    pub event: Event,
    pub response: Response,
}

impl Turn {
    pub fn new(event: Event, response: Response) -> Self {
        Self { event, response }
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("event", &self.event)
            .field("yielding", &self.response.is_yielding())
            .finish()
    }
}
