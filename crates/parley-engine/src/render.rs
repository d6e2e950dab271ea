//! Rendering seam.
//!
//! Template rendering and localization are external collaborators: the
//! engine only needs a way to turn a view token into text or a structured
//! view object. Real renderers (view tables, i18n bundles) implement
//! [`Renderer`] in the adapter layer.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_core::turn::Turn;
use parley_core::FlowError;

/// A rendered view object, re-dispatched by the directive engine based on
/// which sub-keys are present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RenderedView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub say: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Value>,
}

/// Resolves view tokens against the application's view/variable tables.
/// Rendering may suspend.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render a composite view object.
    async fn render(&self, view: &str, turn: &Turn) -> Result<RenderedView, FlowError>;

    /// Render a view into plain text.
    async fn render_text(&self, view: &str, turn: &Turn) -> Result<String, FlowError>;
}

/// Default renderer: the view token is the rendered text. Keeps raw-string
/// directive payloads behaving literally when no view table is configured.
#[derive(Clone, Debug, Default)]
pub struct PassthroughRenderer;

#[async_trait]
impl Renderer for PassthroughRenderer {
    async fn render(&self, view: &str, _turn: &Turn) -> Result<RenderedView, FlowError> {
        Ok(RenderedView {
            say: Some(view.to_string()),
            ..RenderedView::default()
        })
    }

    async fn render_text(&self, view: &str, _turn: &Turn) -> Result<String, FlowError> {
        Ok(view.to_string())
    }
}

/// Renderer backed by a static view table. Suits tests and small skills;
/// unknown views are render errors.
#[derive(Clone, Debug, Default)]
pub struct StaticRenderer {
    views: HashMap<String, RenderedView>,
    texts: HashMap<String, String>,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, view: impl Into<String>, rendered: impl Into<String>) -> Self {
        self.texts.insert(view.into(), rendered.into());
        self
    }

    pub fn view(mut self, view: impl Into<String>, rendered: RenderedView) -> Self {
        self.views.insert(view.into(), rendered);
        self
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(&self, view: &str, _turn: &Turn) -> Result<RenderedView, FlowError> {
        self.views
            .get(view)
            .cloned()
            .ok_or_else(|| FlowError::Render(format!("unknown view: {view}")))
    }

    async fn render_text(&self, view: &str, _turn: &Turn) -> Result<String, FlowError> {
        self.texts
            .get(view)
            .cloned()
            .ok_or_else(|| FlowError::Render(format!("unknown view: {view}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::event::{Event, RequestKind, Session};
    use parley_core::Response;

    fn test_turn() -> Turn {
        let event = Event::new(RequestKind::Intent, Session::new("sess-1", true), "alexa");
        Turn::new(event, Response::new())
    }

    #[tokio::test]
    async fn passthrough_returns_token() {
        let turn = test_turn();
        let text = PassthroughRenderer.render_text("Bye", &turn).await.unwrap();
        assert_eq!(text, "Bye");
    }

    #[tokio::test]
    async fn static_renderer_resolves_and_rejects() {
        let renderer = StaticRenderer::new().text("ViewA", "What next?");
        let turn = test_turn();

        assert_eq!(
            renderer.render_text("ViewA", &turn).await.unwrap(),
            "What next?"
        );
        let err = renderer.render_text("ViewB", &turn).await.unwrap_err();
        assert!(matches!(err, FlowError::Render(_)));
    }

    #[tokio::test]
    async fn static_renderer_composite_views() {
        let renderer = StaticRenderer::new().view(
            "Greeting",
            RenderedView {
                ask: Some("Hello! What now?".into()),
                reprompt: Some("Still there?".into()),
                ..RenderedView::default()
            },
        );
        let turn = test_turn();
        let view = renderer.render("Greeting", &turn).await.unwrap();
        assert_eq!(view.ask.as_deref(), Some("Hello! What now?"));
        assert_eq!(view.reprompt.as_deref(), Some("Still there?"));
    }
}
