//! Walks a content tree and produces a [`View`].
//!
//! The walk itself is stateless: for a fixed tree, registry and snapshot it
//! always yields the same view. Components evaluate their own expressions
//! lazily through [`RenderContext::evaluate`]; the walker never pre-resolves
//! `bind`, `compute` or `when` props.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;

use crate::config::SessionOptions;
use crate::document::{Element, Node, Props};
use crate::evaluator::{EvaluationError, ExpressionCache};
use crate::registry::{Registry, Resolved};
use crate::state::{Snapshot, StateMap};
use crate::value::{Value, format_number};
use crate::view::View;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingType,
    InvalidTag,
    InvalidProp,
    Evaluation,
    DepthExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Type of the node that reported it, when it had one.
    pub node_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub view: View,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct RenderContext<'a> {
    registry: &'a Registry,
    state: &'a Snapshot,
    expressions: &'a mut ExpressionCache,
    options: &'a SessionOptions,
    diagnostics: Vec<Diagnostic>,
    depth: usize,
}

pub fn render(
    registry: &Registry,
    node: &Node,
    state: &Snapshot,
    expressions: &mut ExpressionCache,
    options: &SessionOptions,
) -> Rendered {
    let mut cx = RenderContext {
        registry,
        state,
        expressions,
        options,
        diagnostics: Vec::new(),
        depth: 0,
    };
    let view = cx.render_node(node);
    Rendered {
        view,
        diagnostics: cx.diagnostics,
    }
}

impl<'a> RenderContext<'a> {
    pub fn state(&self) -> &StateMap {
        self.state.map()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn evaluate(&mut self, source: &str) -> Result<Value, EvaluationError> {
        self.expressions.evaluate(source, self.state.map())
    }

    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        node_type: Option<&str>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            kind,
            node_type: node_type.map(str::to_owned),
            message: message.into(),
        };
        if self.options.log_diagnostics {
            log::warn!(
                "{:?} in {}: {}",
                diagnostic.kind,
                diagnostic.node_type.as_deref().unwrap_or("content"),
                diagnostic.message
            );
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn render_node(&mut self, node: &Node) -> View {
        if self.depth >= self.options.max_depth {
            let max_depth = self.options.max_depth;
            self.report(
                DiagnosticKind::DepthExceeded,
                None,
                format!("content nested deeper than {max_depth} levels was dropped"),
            );
            return View::Empty;
        }
        self.depth += 1;
        let view = match node {
            Node::Text(text) => View::text(text.clone()),
            Node::Number(number) => View::text(format_number(*number)),
            Node::Empty => View::Empty,
            Node::List(items) => View::fragment(self.render_children(items)),
            Node::Malformed(_) => {
                self.report(
                    DiagnosticKind::MissingType,
                    None,
                    "node object has no 'type' and was not rendered",
                );
                View::Empty
            }
            Node::Element(element) => self.render_element(element),
        };
        self.depth -= 1;
        view
    }

    pub fn render_children(&mut self, children: &[Node]) -> Vec<View> {
        children.iter().map(|child| self.render_node(child)).collect()
    }

    fn render_element(&mut self, element: &Element) -> View {
        let registry = self.registry;
        match registry.resolve(&element.kind) {
            Resolved::Builtin(builtin) => builtin.render(self, element),
            Resolved::Custom(component) => component.render(self, element),
            Resolved::Passthrough(tag) => self.render_passthrough(tag, element),
        }
    }

    fn render_passthrough(&mut self, tag: &str, element: &Element) -> View {
        let children = self.render_children(&element.children);
        if !is_markup_name(tag) {
            self.report(
                DiagnosticKind::InvalidTag,
                Some(tag),
                format!("'{tag}' is neither a registered type nor a valid tag name"),
            );
            return View::fragment(children);
        }
        let mut view = View::element(tag).with_children(children);
        view.attributes = literal_attributes(&element.props);
        view.into()
    }
}

/// Literal props as markup attributes, in document order.
pub fn literal_attributes(props: &Props) -> IndexMap<String, String> {
    props
        .iter()
        .filter(|(name, _)| is_markup_name(name))
        .filter_map(|(name, value)| {
            let value = match value {
                Json::Null => return None,
                Json::String(text) => text.clone(),
                Json::Bool(flag) => flag.to_string(),
                Json::Number(number) => number.as_f64().map_or_else(|| number.to_string(), format_number),
                nested => nested.to_string(),
            };
            Some((name.to_owned(), value))
        })
        .collect()
}

fn is_markup_name(name: &str) -> bool {
    let mut characters = name.chars();
    characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic())
        && characters.all(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | ':')
        })
}
