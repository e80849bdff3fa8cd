//! Renderable model: what callers hand to the renderer
//!
//! A [`Renderable`] is a closed set of variants. Views, partials and fragments
//! share one shape ([`Component`]); a [`Page`] composes a header, a view, a footer
//! and an optional navigation bar and carries its own partials.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::RenderError;

/// Variable bindings for a template
pub type Data = serde_json::Map<String, Value>;

/// Named nested renderables
pub type Partials = BTreeMap<String, Renderable>;

/// Discriminant used as the exact-match dispatch key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderableKind {
    Page,
    View,
    Partial,
    Fragment,
}

/// Capabilities consulted when no renderer is registered for the exact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Assembled from other renderables
    Composite,
    /// Executes a single template with its own data and partials
    Templated,
}

impl RenderableKind {
    /// Capabilities in lookup order
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            RenderableKind::Page => &[Capability::Composite],
            RenderableKind::View | RenderableKind::Partial | RenderableKind::Fragment => {
                &[Capability::Templated]
            }
        }
    }
}

impl fmt::Display for RenderableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderableKind::Page => "page",
            RenderableKind::View => "view",
            RenderableKind::Partial => "partial",
            RenderableKind::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// A template id with its data and partials
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Component {
    template_id: String,
    data: Data,
    partials: Partials,
}

impl Component {
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            ..Default::default()
        }
    }

    /// Bind one variable
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Merge a map of bindings, replacing existing keys
    pub fn with_data(mut self, data: Data) -> Self {
        self.data.extend(data);
        self
    }

    pub fn with_partial(mut self, name: impl Into<String>, partial: Renderable) -> Self {
        self.partials.insert(name.into(), partial);
        self
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn partials(&self) -> &Partials {
        &self.partials
    }

    pub fn into_view(self) -> Renderable {
        Renderable::View(self)
    }

    pub fn into_partial(self) -> Renderable {
        Renderable::Partial(self)
    }

    pub fn into_fragment(self) -> Renderable {
        Renderable::Fragment(self)
    }
}

/// A full document: header, optional navigation, view and footer
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    header: Box<Renderable>,
    navigation: Option<Box<Renderable>>,
    view: Component,
    footer: Box<Renderable>,
    data: Data,
    partials: Partials,
}

impl Page {
    pub fn builder() -> PageBuilder {
        PageBuilder::default()
    }

    pub fn header(&self) -> &Renderable {
        &self.header
    }

    pub fn navigation(&self) -> Option<&Renderable> {
        self.navigation.as_deref()
    }

    pub fn view(&self) -> &Component {
        &self.view
    }

    pub fn footer(&self) -> &Renderable {
        &self.footer
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn partials(&self) -> &Partials {
        &self.partials
    }

    /// Bindings for the view template: the view's data overlaid by the page's
    pub fn context_data(&self) -> Data {
        let mut data = self.view.data.clone();
        data.extend(self.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        data
    }
}

/// Consuming builder for [`Page`]
#[derive(Debug, Default)]
pub struct PageBuilder {
    header: Option<Renderable>,
    navigation: Option<Renderable>,
    view: Option<Component>,
    footer: Option<Renderable>,
    data: Data,
    partials: Partials,
}

impl PageBuilder {
    pub fn header(mut self, header: Renderable) -> Self {
        self.header = Some(header);
        self
    }

    pub fn navigation(mut self, navigation: Renderable) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn view(mut self, view: Component) -> Self {
        self.view = Some(view);
        self
    }

    pub fn footer(mut self, footer: Renderable) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data.extend(data);
        self
    }

    pub fn with_partial(mut self, name: impl Into<String>, partial: Renderable) -> Self {
        self.partials.insert(name.into(), partial);
        self
    }

    /// Finish the page; header, view and footer are required
    pub fn build(self) -> Result<Page, RenderError> {
        let missing = |part: &str| RenderError::Configuration {
            message: format!("page has no {}", part),
        };

        Ok(Page {
            header: Box::new(self.header.ok_or_else(|| missing("header"))?),
            navigation: self.navigation.map(Box::new),
            view: self.view.ok_or_else(|| missing("view"))?,
            footer: Box::new(self.footer.ok_or_else(|| missing("footer"))?),
            data: self.data,
            partials: self.partials,
        })
    }
}

/// Anything the dispatcher can render
#[derive(Debug, Clone, PartialEq)]
pub enum Renderable {
    Page(Page),
    View(Component),
    Partial(Component),
    /// Generic reusable fragment, dispatched through its capability
    Fragment(Component),
}

impl Renderable {
    pub fn kind(&self) -> RenderableKind {
        match self {
            Renderable::Page(_) => RenderableKind::Page,
            Renderable::View(_) => RenderableKind::View,
            Renderable::Partial(_) => RenderableKind::Partial,
            Renderable::Fragment(_) => RenderableKind::Fragment,
        }
    }

    /// Template executed for this renderable; a page uses its view's template
    pub fn template_id(&self) -> &str {
        match self {
            Renderable::Page(page) => page.view.template_id(),
            Renderable::View(c) | Renderable::Partial(c) | Renderable::Fragment(c) => {
                c.template_id()
            }
        }
    }

    pub fn data(&self) -> &Data {
        match self {
            Renderable::Page(page) => page.data(),
            Renderable::View(c) | Renderable::Partial(c) | Renderable::Fragment(c) => c.data(),
        }
    }

    pub fn partials(&self) -> &Partials {
        match self {
            Renderable::Page(page) => page.partials(),
            Renderable::View(c) | Renderable::Partial(c) | Renderable::Fragment(c) => {
                c.partials()
            }
        }
    }
}

impl From<Page> for Renderable {
    fn from(page: Page) -> Self {
        Renderable::Page(page)
    }
}
