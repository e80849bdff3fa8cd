//! Render-time bridge between an executing template and the dispatcher

use tracing::debug;

use super::dispatch::Dispatcher;
use super::renderable::{Data, Partials};
use crate::RenderError;

/// Handles `@partial` and `@include` for one template execution
///
/// A bridge is bound to the partials of the renderable whose template is
/// running, or to none at all for an included template.
#[derive(Debug, Clone, Copy)]
pub struct ViewApi<'a> {
    dispatcher: &'a Dispatcher,
    partials: Option<&'a Partials>,
    depth: usize,
}

impl<'a> ViewApi<'a> {
    pub fn new(dispatcher: &'a Dispatcher, partials: Option<&'a Partials>, depth: usize) -> Self {
        Self {
            dispatcher,
            partials,
            depth,
        }
    }

    /// Nesting depth of the template this bridge serves
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Render another template in isolation: only `data` is visible, no partials
    pub fn include(&self, template_id: &str, data: &Data) -> Result<String, RenderError> {
        self.dispatcher
            .execute(template_id, data, None, self.depth + 1)
    }

    /// Render a partial of the current renderable; unknown names render nothing
    pub fn render_partial(&self, name: &str) -> Result<String, RenderError> {
        match self.partials.and_then(|partials| partials.get(name)) {
            Some(partial) => self.dispatcher.render_nested(partial, self.depth + 1),
            None => {
                debug!(partial = name, "partial not bound, rendering nothing");
                Ok(String::new())
            }
        }
    }
}
