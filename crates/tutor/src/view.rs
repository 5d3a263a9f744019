//! Render output: a small virtual tree plus the interaction handlers attached
//! to control elements.

use std::fmt::Write;

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::format_number;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    Empty,
    Text { text: String },
    Element(ElementView),
    Fragment { children: Vec<View> },
    /// Inline marker shown in place of a widget that failed.
    ErrorMarker { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<Handler>,
    pub children: Vec<View>,
}

/// What a user interaction on an element does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Handler {
    SetNumber { key: String, range: NumericRange },
    Toggle { key: String },
    Annotate { actions: Vec<String>, context: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl NumericRange {
    /// Bounds must be ordered and not NaN, and the step positive.
    pub fn validate(&self) -> Result<(), String> {
        if self.min.is_nan() || self.max.is_nan() {
            return Err("'min' and 'max' must be numbers".to_owned());
        }
        if self.min > self.max {
            return Err(format!(
                "'min' ({}) is greater than 'max' ({})",
                format_number(self.min),
                format_number(self.max)
            ));
        }
        if self.step.is_nan() || self.step <= 0.0 {
            return Err("'step' must be positive".to_owned());
        }
        Ok(())
    }

    /// Only meaningful for a range that passed [`NumericRange::validate`].
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

impl View {
    pub fn text(text: impl Into<String>) -> Self {
        View::Text { text: text.into() }
    }

    pub fn element(tag: impl Into<String>) -> ElementView {
        ElementView {
            tag: tag.into(),
            attributes: IndexMap::new(),
            handler: None,
            children: Vec::new(),
        }
    }

    pub fn fragment(children: Vec<View>) -> Self {
        View::Fragment { children }
    }

    pub fn error(message: impl Into<String>) -> Self {
        View::ErrorMarker {
            message: message.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            View::Empty => true,
            View::Fragment { children } => children.iter().all(View::is_empty),
            _ => false,
        }
    }

    /// Concatenated text of the subtree, markers excluded.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            View::Text { text } => out.push_str(text),
            View::Element(element) => element.children.iter().for_each(|child| child.collect_text(out)),
            View::Fragment { children } => children.iter().for_each(|child| child.collect_text(out)),
            View::Empty | View::ErrorMarker { .. } => {}
        }
    }

    /// Handlers in document order.
    pub fn handlers(&self) -> Vec<&Handler> {
        let mut handlers = Vec::new();
        self.collect_handlers(&mut handlers);
        handlers
    }

    fn collect_handlers<'a>(&'a self, out: &mut Vec<&'a Handler>) {
        match self {
            View::Element(element) => {
                out.extend(element.handler.as_ref());
                for child in &element.children {
                    child.collect_handlers(out);
                }
            }
            View::Fragment { children } => {
                for child in children {
                    child.collect_handlers(out);
                }
            }
            View::Empty | View::Text { .. } | View::ErrorMarker { .. } => {}
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        self.write_html(&mut html);
        html
    }

    fn write_html(&self, html: &mut String) {
        match self {
            View::Empty => {}
            View::Text { text } => html.push_str(&escape(text)),
            View::Fragment { children } => children.iter().for_each(|child| child.write_html(html)),
            View::ErrorMarker { message } => {
                let _ = write!(
                    html,
                    r#"<span class="tutor-error" title="{}">⚠ {}</span>"#,
                    escape(message),
                    escape(message)
                );
            }
            View::Element(element) => {
                let _ = write!(html, "<{}", element.tag);
                for (name, value) in &element.attributes {
                    let _ = write!(html, r#" {}="{}""#, name, escape(value));
                }
                if is_void(&element.tag) && element.children.is_empty() {
                    html.push('>');
                    return;
                }
                html.push('>');
                for child in &element.children {
                    child.write_html(html);
                }
                let _ = write!(html, "</{}>", element.tag);
            }
        }
    }
}

impl From<ElementView> for View {
    fn from(element: ElementView) -> Self {
        View::Element(element)
    }
}

impl ElementView {
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_child(mut self, child: View) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = View>) -> Self {
        self.children.extend(children);
        self
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "input" | "br" | "hr" | "img" | "meta" | "link")
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(character),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escapes_text_and_attributes() {
        let view: View = View::element("p")
            .with_attribute("title", "a \"quote\"")
            .with_child(View::text("1 < 2 & 3"))
            .into();
        assert_eq!(
            view.to_html(),
            r#"<p title="a &quot;quote&quot;">1 &lt; 2 &amp; 3</p>"#
        );
    }

    #[test]
    fn test_void_elements_have_no_closing_tag() {
        let view: View = View::element("input").with_attribute("type", "range").into();
        assert_eq!(view.to_html(), r#"<input type="range">"#);
    }

    #[test]
    fn test_text_content_and_handlers_follow_document_order() {
        let toggle = Handler::Toggle { key: "on".into() };
        let view = View::fragment(vec![
            View::text("a"),
            View::element("button")
                .with_handler(toggle.clone())
                .with_child(View::text("b"))
                .into(),
            View::error("broken"),
            View::text("c"),
        ]);
        assert_eq!(view.text_content(), "abc");
        assert_eq!(view.handlers(), vec![&toggle]);
    }

    #[test]
    fn test_empty_fragment_is_empty() {
        assert!(View::fragment(vec![View::Empty, View::fragment(vec![])]).is_empty());
        assert!(!View::text("").is_empty());
    }

    #[test]
    fn test_range_validation() {
        let range = |min, max, step| NumericRange { min, max, step };
        assert_eq!(range(0.0, 10.0, 1.0).validate(), Ok(()));
        assert!(range(5.0, 1.0, 1.0).validate().is_err());
        assert!(range(f64::NAN, 1.0, 1.0).validate().is_err());
        assert!(range(0.0, 1.0, 0.0).validate().is_err());
        assert!(range(0.0, 1.0, f64::NAN).validate().is_err());
        assert_eq!(range(0.0, 10.0, 1.0).clamp(42.0), 10.0);
    }
}
