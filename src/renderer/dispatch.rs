//! Renderer dispatch
//!
//! [`RendererRegistry`] maps a [`RenderableKind`] to a [`ComponentRenderer`],
//! falling back to the kind's [`Capability`]s. The registry is built explicitly
//! and handed to the [`Dispatcher`], which owns the template service.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::trace;

use super::bridge::ViewApi;
use super::eval;
use super::renderable::{Capability, Data, Partials, Renderable, RenderableKind};
use crate::config::DEFAULT_MAX_DEPTH;
use crate::template::TemplateProcessingService;
use crate::RenderError;

/// A specialised renderer for some kinds of [`Renderable`]
pub trait ComponentRenderer: Send + Sync + Debug {
    fn render(&self, renderable: &Renderable, ctx: RenderContext<'_>) -> Result<String, RenderError>;
}

/// What a renderer gets to work with: the dispatcher and the current depth
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    dispatcher: &'a Dispatcher,
    depth: usize,
}

impl<'a> RenderContext<'a> {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn dispatcher(&self) -> &'a Dispatcher {
        self.dispatcher
    }

    /// Execute a template at the current depth with a bridge bound to `partials`
    pub fn execute(
        &self,
        template_id: &str,
        data: &Data,
        partials: Option<&Partials>,
    ) -> Result<String, RenderError> {
        self.dispatcher
            .execute(template_id, data, partials, self.depth)
    }

    /// Render a child renderable one level deeper
    pub fn render(&self, renderable: &Renderable) -> Result<String, RenderError> {
        self.dispatcher.render_nested(renderable, self.depth + 1)
    }
}

/// Views, partials and fragments: the renderable's own template, data and partials
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRenderer;

impl ComponentRenderer for TemplateRenderer {
    fn render(&self, renderable: &Renderable, ctx: RenderContext<'_>) -> Result<String, RenderError> {
        ctx.execute(
            renderable.template_id(),
            renderable.data(),
            Some(renderable.partials()),
        )
    }
}

/// Pages: header, navigation, the view in the page's context, then footer
#[derive(Debug, Default, Clone, Copy)]
pub struct PageRenderer;

impl ComponentRenderer for PageRenderer {
    fn render(&self, renderable: &Renderable, ctx: RenderContext<'_>) -> Result<String, RenderError> {
        let Renderable::Page(page) = renderable else {
            return Err(RenderError::UnsupportedRenderable {
                kind: renderable.kind(),
            });
        };

        let mut out = ctx.render(page.header())?;
        if let Some(navigation) = page.navigation() {
            out.push_str(&ctx.render(navigation)?);
        }
        out.push_str(&ctx.execute(
            page.view().template_id(),
            &page.context_data(),
            Some(page.partials()),
        )?);
        out.push_str(&ctx.render(page.footer())?);
        Ok(out)
    }
}

/// Dispatch table from renderable kind or capability to renderer
#[derive(Debug, Default, Clone)]
pub struct RendererRegistry {
    by_kind: HashMap<RenderableKind, Arc<dyn ComponentRenderer>>,
    by_capability: HashMap<Capability, Arc<dyn ComponentRenderer>>,
}

impl RendererRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Page, view and partial renderers, plus a template fallback for fragments
    pub fn standard() -> Self {
        Self::new()
            .with_renderer(RenderableKind::Page, PageRenderer)
            .with_renderer(RenderableKind::View, TemplateRenderer)
            .with_renderer(RenderableKind::Partial, TemplateRenderer)
            .with_capability(Capability::Templated, TemplateRenderer)
    }

    pub fn with_renderer(
        mut self,
        kind: RenderableKind,
        renderer: impl ComponentRenderer + 'static,
    ) -> Self {
        self.by_kind.insert(kind, Arc::new(renderer));
        self
    }

    pub fn with_capability(
        mut self,
        capability: Capability,
        renderer: impl ComponentRenderer + 'static,
    ) -> Self {
        self.by_capability.insert(capability, Arc::new(renderer));
        self
    }

    /// Exact kind first, then the kind's capabilities in order
    pub fn lookup(&self, kind: RenderableKind) -> Option<&dyn ComponentRenderer> {
        self.by_kind
            .get(&kind)
            .or_else(|| {
                kind.capabilities()
                    .iter()
                    .find_map(|capability| self.by_capability.get(capability))
            })
            .map(|renderer| &**renderer)
    }
}

/// Entry point for rendering: owns the template service and the dispatch table
#[derive(Debug, Clone)]
pub struct Dispatcher {
    service: TemplateProcessingService,
    registry: RendererRegistry,
    max_depth: usize,
}

impl Dispatcher {
    pub fn new(service: TemplateProcessingService, registry: RendererRegistry) -> Self {
        Self {
            service,
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn service(&self) -> &TemplateProcessingService {
        &self.service
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Render a top-level renderable
    pub fn render(&self, renderable: &Renderable) -> Result<String, RenderError> {
        self.render_nested(renderable, 0)
    }

    /// Render a renderable found `depth` levels below the top
    pub fn render_nested(
        &self,
        renderable: &Renderable,
        depth: usize,
    ) -> Result<String, RenderError> {
        self.check_depth(depth)?;
        let kind = renderable.kind();
        let renderer = self
            .registry
            .lookup(kind)
            .ok_or(RenderError::UnsupportedRenderable { kind })?;
        trace!(%kind, template = renderable.template_id(), depth, "dispatching");
        renderer.render(
            renderable,
            RenderContext {
                dispatcher: self,
                depth,
            },
        )
    }

    /// Load and run one template with a bridge bound to `partials`
    pub fn execute(
        &self,
        template_id: &str,
        data: &Data,
        partials: Option<&Partials>,
        depth: usize,
    ) -> Result<String, RenderError> {
        self.check_depth(depth)?;
        if template_id.trim().is_empty() {
            return Err(RenderError::Configuration {
                message: "renderable has no template id".to_string(),
            });
        }

        let program = self.service.load(template_id)?;
        let api = ViewApi::new(self, partials, depth);
        eval::execute(&program, data, &api)
    }

    fn check_depth(&self, depth: usize) -> Result<(), RenderError> {
        if depth > self.max_depth {
            return Err(RenderError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed(&'static str);

    impl ComponentRenderer for Fixed {
        fn render(&self, _: &Renderable, _: RenderContext<'_>) -> Result<String, RenderError> {
            Ok(self.0.to_string())
        }
    }

    fn lookup_name(registry: &RendererRegistry, kind: RenderableKind) -> Option<String> {
        registry.lookup(kind).map(|r| format!("{:?}", r))
    }

    #[test]
    fn test_standard_registry() {
        let registry = RendererRegistry::standard();
        assert_eq!(
            lookup_name(&registry, RenderableKind::Page).as_deref(),
            Some("PageRenderer")
        );
        assert_eq!(
            lookup_name(&registry, RenderableKind::Partial).as_deref(),
            Some("TemplateRenderer")
        );
        // no exact entry; resolved through the Templated capability
        assert_eq!(
            lookup_name(&registry, RenderableKind::Fragment).as_deref(),
            Some("TemplateRenderer")
        );
    }

    #[test]
    fn test_exact_kind_beats_capability() {
        let registry = RendererRegistry::new()
            .with_capability(Capability::Templated, Fixed("capability"))
            .with_renderer(RenderableKind::View, Fixed("exact"));
        assert_eq!(
            lookup_name(&registry, RenderableKind::View).as_deref(),
            Some("Fixed(\"exact\")")
        );
        assert_eq!(
            lookup_name(&registry, RenderableKind::Partial).as_deref(),
            Some("Fixed(\"capability\")")
        );
        assert!(registry.lookup(RenderableKind::Page).is_none());
    }
}
