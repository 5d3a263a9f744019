//! Maps node types to renderers.
//!
//! Each session owns its own registry. Built-in kinds are a closed enum;
//! hosts plug in visualizations through [`Component`] at runtime.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::builtins::{BUILTIN_TYPES, Builtin};
use crate::document::Element;
use crate::renderer::RenderContext;
use crate::view::View;

pub trait Component {
    fn render(&self, cx: &mut RenderContext<'_>, element: &Element) -> View;
}

impl<F> Component for F
where
    F: Fn(&mut RenderContext<'_>, &Element) -> View,
{
    fn render(&self, cx: &mut RenderContext<'_>, element: &Element) -> View {
        self(cx, element)
    }
}

#[derive(Clone)]
enum Entry {
    Builtin(Builtin),
    Custom(Rc<dyn Component>),
}

pub enum Resolved<'a> {
    Builtin(Builtin),
    Custom(&'a dyn Component),
    /// Not registered: render as a bare markup element with this tag.
    Passthrough(&'a str),
}

#[derive(Clone, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (kind, builtin) in BUILTIN_TYPES {
            registry.register_builtin(kind, builtin);
        }
        registry
    }

    /// Registers `component` under `kind`, replacing any earlier entry.
    pub fn register(&mut self, kind: impl Into<String>, component: impl Component + 'static) {
        let kind = kind.into();
        log::debug!("registering component '{kind}'");
        self.entries.insert(kind, Entry::Custom(Rc::new(component)));
    }

    pub fn register_builtin(&mut self, kind: impl Into<String>, builtin: Builtin) {
        self.entries.insert(kind.into(), Entry::Builtin(builtin));
    }

    pub fn resolve<'a>(&'a self, kind: &'a str) -> Resolved<'a> {
        match self.entries.get(kind) {
            Some(Entry::Builtin(builtin)) => Resolved::Builtin(*builtin),
            Some(Entry::Custom(component)) => Resolved::Custom(component.as_ref()),
            None => Resolved::Passthrough(kind),
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Registered type names, sorted. For documentation and debugging only.
    pub fn list_types(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.entries.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.list_types())
            .finish()
    }
}
