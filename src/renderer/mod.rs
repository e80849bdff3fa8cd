//! Component rendering
//!
//! A [`Dispatcher`] picks a [`ComponentRenderer`] for each [`Renderable`], loads
//! the compiled program through the template service and executes it with a
//! [`ViewApi`] bound to the renderable's own partials.

mod bridge;
mod dispatch;
mod eval;
mod renderable;

pub use bridge::ViewApi;
pub use dispatch::{
    ComponentRenderer, Dispatcher, PageRenderer, RenderContext, RendererRegistry, TemplateRenderer,
};
pub use renderable::{
    Capability, Component, Data, Page, PageBuilder, Partials, Renderable, RenderableKind,
};
