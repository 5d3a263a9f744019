//! Built-in node types.
//!
//! Structural types render their children first. State-bound types read their
//! raw props (`bind`, `compute`, `when`) and resolve them against state at
//! their own render point.

use crate::document::{Element, Props};
use crate::format::format_value;
use crate::renderer::{DiagnosticKind, RenderContext, literal_attributes};
use crate::value::{Value, format_number};
use crate::view::{Handler, NumericRange, View};

pub const DEFAULT_ANNOTATION_ACTIONS: [&str; 3] = ["explain", "visualize", "branch"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Display,
    Computed,
    Slider,
    NumberInput,
    Toggle,
    Conditional,
    Layout(Layout),
    Annotatable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Stack,
    Row,
    Card,
    Callout,
}

impl Layout {
    fn name(self) -> &'static str {
        match self {
            Layout::Stack => "stack",
            Layout::Row => "row",
            Layout::Card => "card",
            Layout::Callout => "callout",
        }
    }
}

pub const BUILTIN_TYPES: [(&str, Builtin); 11] = [
    ("Display", Builtin::Display),
    ("Computed", Builtin::Computed),
    ("Slider", Builtin::Slider),
    ("NumberInput", Builtin::NumberInput),
    ("Toggle", Builtin::Toggle),
    ("Conditional", Builtin::Conditional),
    ("Stack", Builtin::Layout(Layout::Stack)),
    ("Row", Builtin::Layout(Layout::Row)),
    ("Card", Builtin::Layout(Layout::Card)),
    ("Callout", Builtin::Layout(Layout::Callout)),
    ("Annotatable", Builtin::Annotatable),
];

impl Builtin {
    pub fn render(self, cx: &mut RenderContext<'_>, element: &Element) -> View {
        match self {
            Builtin::Display => display(cx, element),
            Builtin::Computed => computed(cx, element),
            Builtin::Slider => numeric_control(cx, element, "range"),
            Builtin::NumberInput => numeric_control(cx, element, "number"),
            Builtin::Toggle => toggle(cx, element),
            Builtin::Conditional => conditional(cx, element),
            Builtin::Layout(layout) => {
                let children = cx.render_children(&element.children);
                let mut view = View::element("div");
                view.attributes = literal_attributes(&element.props);
                view.with_attribute("data-layout", layout.name())
                    .with_children(children)
                    .into()
            }
            Builtin::Annotatable => annotatable(cx, element),
        }
    }
}

fn invalid(cx: &mut RenderContext<'_>, element: &Element, message: String) -> View {
    cx.report(DiagnosticKind::InvalidProp, Some(element.kind.as_str()), message.clone());
    View::error(message)
}

fn display(cx: &mut RenderContext<'_>, element: &Element) -> View {
    let Some(key) = element.props.str("bind") else {
        return invalid(cx, element, "'bind' must name a state variable".to_owned());
    };
    let format = element.props.str("format");
    let text = match cx.get(key) {
        Some(value) => format_value(value, format),
        None => element
            .props
            .get("default")
            .and_then(|default| serde_json::from_value::<Value>(default.clone()).ok())
            .map(|default| format_value(&default, format))
            .unwrap_or_default(),
    };
    View::element("span")
        .with_attribute("data-bind", key)
        .with_child(View::text(text))
        .into()
}

fn computed(cx: &mut RenderContext<'_>, element: &Element) -> View {
    let Some(source) = element.props.str("compute") else {
        return invalid(cx, element, "'compute' must be an expression".to_owned());
    };
    match cx.evaluate(source) {
        Ok(value) => View::element("span")
            .with_attribute("data-compute", source)
            .with_child(View::text(format_value(&value, element.props.str("format"))))
            .into(),
        Err(error) => {
            cx.report(
                DiagnosticKind::Evaluation,
                Some(element.kind.as_str()),
                format!("'{source}': {error}"),
            );
            View::error(error.to_string())
        }
    }
}

fn numeric_range(props: &Props) -> Result<NumericRange, String> {
    let number = |name: &str, default: f64| match props.get(name) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| format!("'{name}' must be a number")),
    };
    let range = NumericRange {
        min: number("min", 0.0)?,
        max: number("max", 100.0)?,
        step: number("step", 1.0)?,
    };
    range.validate()?;
    Ok(range)
}

fn numeric_control(cx: &mut RenderContext<'_>, element: &Element, input_type: &str) -> View {
    let Some(key) = element.props.str("bind") else {
        return invalid(cx, element, "'bind' must name a state variable".to_owned());
    };
    let range = match numeric_range(&element.props) {
        Ok(range) => range,
        Err(message) => return invalid(cx, element, message),
    };
    let value = cx
        .get(key)
        .and_then(Value::as_number)
        .filter(|number| !number.is_nan())
        .map_or(range.min, |number| range.clamp(number));
    let input: View = View::element("input")
        .with_attribute("type", input_type)
        .with_attribute("min", format_number(range.min))
        .with_attribute("max", format_number(range.max))
        .with_attribute("step", format_number(range.step))
        .with_attribute("value", format_number(value))
        .with_attribute("data-bind", key)
        .with_handler(Handler::SetNumber {
            key: key.to_owned(),
            range,
        })
        .into();
    match element.props.str("label") {
        Some(label) => View::element("label")
            .with_child(View::text(label))
            .with_child(input)
            .into(),
        None => input,
    }
}

fn toggle(cx: &mut RenderContext<'_>, element: &Element) -> View {
    let Some(key) = element.props.str("bind") else {
        return invalid(cx, element, "'bind' must name a state variable".to_owned());
    };
    let on = cx.get(key).is_some_and(Value::is_truthy);
    let label = element
        .props
        .str("label")
        .unwrap_or(if on { "on" } else { "off" });
    View::element("button")
        .with_attribute("type", "button")
        .with_attribute("aria-pressed", on.to_string())
        .with_attribute("data-bind", key)
        .with_handler(Handler::Toggle {
            key: key.to_owned(),
        })
        .with_child(View::text(label))
        .into()
}

fn conditional(cx: &mut RenderContext<'_>, element: &Element) -> View {
    let Some(source) = element.props.str("when") else {
        cx.report(
            DiagnosticKind::InvalidProp,
            Some(element.kind.as_str()),
            "'when' must be an expression",
        );
        return View::Empty;
    };
    match cx.evaluate(source) {
        Ok(value) if value.is_truthy() => View::fragment(cx.render_children(&element.children)),
        Ok(_) => match element.props.node("otherwise") {
            Some(otherwise) => cx.render_node(&otherwise),
            None => View::Empty,
        },
        // A broken condition shows neither branch.
        Err(error) => {
            cx.report(
                DiagnosticKind::Evaluation,
                Some(element.kind.as_str()),
                format!("'{source}': {error}"),
            );
            View::Empty
        }
    }
}

fn annotatable(cx: &mut RenderContext<'_>, element: &Element) -> View {
    let children = cx.render_children(&element.children);
    let actions = element.props.strings("actions").unwrap_or_else(|| {
        DEFAULT_ANNOTATION_ACTIONS
            .iter()
            .map(|action| (*action).to_owned())
            .collect()
    });
    let context = match element.props.str("context") {
        Some(context) => context.to_owned(),
        None => children.iter().map(View::text_content).collect(),
    };
    View::element("div")
        .with_attribute("data-annotatable", actions.join(" "))
        .with_handler(Handler::Annotate { actions, context })
        .with_children(children)
        .into()
}

#[cfg(test)]
mod tests {
    use crate::config::SessionOptions;
    use crate::document::Node;
    use crate::evaluator::ExpressionCache;
    use crate::registry::Registry;
    use crate::renderer::{DiagnosticKind, Rendered, render};
    use crate::state::{Snapshot, StateMap};
    use crate::value::Value;
    use crate::view::{Handler, View};
    use serde_json::{Value as Json, json};

    fn render_with(content: Json, state: &[(&str, Value)]) -> Rendered {
        let state: StateMap = state
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        render(
            &Registry::with_builtins(),
            &Node::from(content),
            &Snapshot::new(state),
            &mut ExpressionCache::new(),
            &SessionOptions::default(),
        )
    }

    #[test]
    fn test_display_formats_bound_value() {
        let rendered = render_with(
            json!({ "type": "Display", "props": { "bind": "ratio", "format": "percent" } }),
            &[("ratio", Value::Number(0.25))],
        );
        assert_eq!(rendered.view.to_html(), r#"<span data-bind="ratio">25%</span>"#);
    }

    #[test]
    fn test_display_falls_back_to_default() {
        let rendered = render_with(
            json!({ "type": "Display", "props": { "bind": "missing", "default": 1.5, "format": "fixed2" } }),
            &[],
        );
        assert_eq!(rendered.view.text_content(), "1.50");
        assert!(rendered.diagnostics.is_empty());
    }

    #[test]
    fn test_computed_error_shows_marker() {
        let rendered = render_with(
            json!({ "type": "Computed", "props": { "compute": "a +" } }),
            &[("a", Value::Number(1.0))],
        );
        assert!(matches!(rendered.view, View::ErrorMarker { .. }));
        assert_eq!(rendered.diagnostics.len(), 1);
        assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::Evaluation);
    }

    #[test]
    fn test_slider_defaults_to_min_and_clamps() {
        let slider = json!({ "type": "Slider", "props": { "bind": "x", "min": 2, "max": 8 } });
        let unset = render_with(slider.clone(), &[]);
        assert_eq!(
            unset.view.to_html(),
            r#"<input type="range" min="2" max="8" step="1" value="2" data-bind="x">"#
        );
        let above = render_with(slider, &[("x", Value::Number(50.0))]);
        assert!(above.view.to_html().contains(r#"value="8""#));
    }

    #[test]
    fn test_slider_rejects_inverted_range() {
        let rendered = render_with(
            json!({ "type": "NumberInput", "props": { "bind": "x", "min": 5, "max": 1 } }),
            &[],
        );
        assert!(matches!(rendered.view, View::ErrorMarker { .. }));
        assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::InvalidProp);
    }

    #[test]
    fn test_toggle_defaults_to_off() {
        let rendered = render_with(
            json!({ "type": "Toggle", "props": { "bind": "show" } }),
            &[],
        );
        assert!(rendered.view.to_html().contains(r#"aria-pressed="false""#));
        assert_eq!(
            rendered.view.handlers(),
            vec![&Handler::Toggle { key: "show".into() }]
        );
    }

    #[test]
    fn test_conditional_branches() {
        let node = json!({
            "type": "Conditional",
            "props": { "when": "x > 3", "otherwise": "small" },
            "children": "big"
        });
        assert_eq!(render_with(node.clone(), &[("x", Value::Number(5.0))]).view.text_content(), "big");
        assert_eq!(render_with(node.clone(), &[("x", Value::Number(1.0))]).view.text_content(), "small");
        assert_eq!(render_with(node.clone(), &[("x", Value::Undefined)]).view.text_content(), "small");

        let broken = render_with(node, &[]);
        assert!(broken.view.is_empty());
        assert_eq!(broken.diagnostics.len(), 1);
    }

    #[test]
    fn test_annotatable_context_defaults_to_child_text() {
        let rendered = render_with(
            json!({ "type": "Annotatable", "props": { "actions": ["explain"] }, "children": ["a ", { "type": "b", "children": "bold" }] }),
            &[],
        );
        assert_eq!(
            rendered.view.handlers(),
            vec![&Handler::Annotate {
                actions: vec!["explain".into()],
                context: "a bold".into(),
            }]
        );
    }

    #[test]
    fn test_layout_wraps_rendered_children() {
        let rendered = render_with(
            json!({ "type": "Row", "props": { "gap": 2 }, "children": [{ "type": "Display", "props": { "bind": "n" } }] }),
            &[("n", Value::Number(4.0))],
        );
        assert_eq!(
            rendered.view.to_html(),
            r#"<div gap="2" data-layout="row"><span data-bind="n">4</span></div>"#
        );
    }
}
