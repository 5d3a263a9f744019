//! Documents and their content trees.
//!
//! Content arrives as loosely shaped JSON. It is normalized once, here, into
//! [`Node`]: children live in exactly one place, and objects without a `type`
//! are kept aside as [`Node::Malformed`] so the renderer can report them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::state::StateMap;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub state: StateMap,
    pub content: Node,
}

impl Document {
    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json(json: Json) -> Result<Self, DocumentError> {
        Ok(serde_json::from_value(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Json", into = "Json")]
pub enum Node {
    Text(String),
    Number(f64),
    List(Vec<Node>),
    Element(Element),
    Empty,
    /// An object without a string `type`, kept verbatim.
    Malformed(Json),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: String,
    pub props: Props,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            props: Props::default(),
            children: Vec::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.props.insert(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_owned())
    }
}

impl From<Json> for Node {
    fn from(json: Json) -> Self {
        match json {
            Json::Null | Json::Bool(_) => Node::Empty,
            Json::Number(number) => number.as_f64().map_or(Node::Empty, Node::Number),
            Json::String(text) => Node::Text(text),
            Json::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Json::Object(object) => element_from_object(object),
        }
    }
}

fn element_from_object(mut object: Map<String, Json>) -> Node {
    let Some(Json::String(kind)) = object.get("type").cloned() else {
        return Node::Malformed(Json::Object(object));
    };
    let mut props = match object.remove("props") {
        Some(Json::Object(props)) => props,
        _ => Map::new(),
    };
    // The explicit field wins; the props copy is dropped either way.
    let nested_children = props.remove("children");
    let children = match object.remove("children").or(nested_children) {
        None => Vec::new(),
        Some(Json::Array(items)) => items.into_iter().map(Node::from).collect(),
        Some(child) => vec![Node::from(child)],
    };
    Node::Element(Element {
        kind,
        props: Props(props.into_iter().collect()),
        children,
    })
}

impl From<Node> for Json {
    fn from(node: Node) -> Self {
        match node {
            Node::Text(text) => Json::String(text),
            Node::Number(number) => serde_json::Number::from_f64(number).map_or(Json::Null, Json::Number),
            Node::List(items) => Json::Array(items.into_iter().map(Json::from).collect()),
            Node::Empty => Json::Null,
            Node::Malformed(raw) => raw,
            Node::Element(element) => {
                let mut object = Map::new();
                object.insert("type".to_owned(), Json::String(element.kind));
                if !element.props.is_empty() {
                    object.insert(
                        "props".to_owned(),
                        Json::Object(element.props.0.into_iter().collect()),
                    );
                }
                match element.children.len() {
                    0 => {}
                    1 => {
                        let child = element.children.into_iter().next().map(Json::from);
                        object.insert("children".to_owned(), child.unwrap_or(Json::Null));
                    }
                    _ => {
                        object.insert(
                            "children".to_owned(),
                            Json::Array(element.children.into_iter().map(Json::from).collect()),
                        );
                    }
                }
                Json::Object(object)
            }
        }
    }
}

/// Literal node attributes in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(IndexMap<String, Json>);

impl Props {
    pub fn get(&self, name: &str) -> Option<&Json> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Json>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Json::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Json::as_f64)
    }

    /// A prop holding content, such as a conditional's `otherwise` branch.
    pub fn node(&self, name: &str) -> Option<Node> {
        self.get(name).cloned().map(Node::from)
    }

    /// A string or list-of-strings prop.
    pub fn strings(&self, name: &str) -> Option<Vec<String>> {
        match self.get(name)? {
            Json::String(single) => Some(vec![single.clone()]),
            Json::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Json)> for Props {
    fn from_iter<T: IntoIterator<Item = (String, Json)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
