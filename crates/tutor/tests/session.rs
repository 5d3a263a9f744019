//! End-to-end behaviour of a session over a realistic document.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tutor::{
    DiagnosticKind, Document, Element, Handler, Interaction, RenderContext, Registry,
    ReseedOutcome, Session, Value, View,
};

fn pythagoras() -> Document {
    Document::from_json_str(include_str!("fixtures/pythagoras.json")).unwrap()
}

fn computed_hypotenuse(view: &View) -> String {
    let text = view.text_content();
    let start = text.find("c = ").unwrap() + 4;
    text[start..].chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect()
}

#[test]
fn renders_are_deterministic() {
    let document = pythagoras();
    let mut first = Session::new(&document, Registry::with_builtins());
    let mut second = Session::new(&document, Registry::with_builtins());
    let a = first.render();
    assert_eq!(a, first.render());
    assert_eq!(a, second.render());
}

#[test]
fn initial_render_of_fixture() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    let rendered = session.render();

    assert_eq!(computed_hypotenuse(&rendered.view), "5.00");
    assert!(rendered.view.text_content().contains("scalene legs"));
    assert!(!rendered.view.text_content().contains("Rearrange"));
    assert!(rendered.view.to_html().contains("<h1>Right triangles</h1>"));

    // Only the untyped object inside the callout is reported.
    assert_eq!(rendered.diagnostics.len(), 1);
    assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::MissingType);
}

#[test]
fn slider_writes_are_clamped_and_rerendered() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    let rendered = session.render();
    let slider_a = rendered.view.handlers()[0].clone();

    let after = session
        .dispatch(&slider_a, Interaction::Number(-5.0))
        .unwrap()
        .unwrap();
    assert_eq!(session.state().get("a"), Some(&Value::Number(1.0)));
    assert!(after.view.to_html().contains(r#"value="1""#));

    let after = session
        .dispatch(&slider_a, Interaction::Number(4.0))
        .unwrap()
        .unwrap();
    assert!(after.view.text_content().contains("isosceles"));
    assert_eq!(computed_hypotenuse(&after.view), "5.66");
}

#[test]
fn toggle_reveals_conditional_content() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    let rendered = session.render();
    let toggle = rendered
        .view
        .handlers()
        .into_iter()
        .find(|handler| matches!(handler, Handler::Toggle { .. }))
        .cloned()
        .unwrap();
    let after = session.dispatch(&toggle, Interaction::Activate).unwrap().unwrap();
    assert!(after.view.text_content().contains("Rearrange"));
}

#[test]
fn conditional_fails_closed_on_missing_state() {
    let document = Document::from_json(json!({
        "id": "c",
        "title": "c",
        "content": {
            "type": "Conditional",
            "props": { "when": "missing > 1", "otherwise": "fallback" },
            "children": "shown"
        }
    }))
    .unwrap();
    let rendered = Session::new(&document, Registry::with_builtins()).render();
    assert!(rendered.view.is_empty());
    assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::Evaluation);
}

#[test]
fn batched_writes_render_once_with_last_write() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    session.render();
    let rendered = session
        .batch(|store| {
            store.set("a", 6.0);
            store.set("b", 8.0);
            store.set("a", 5.0);
            store.set("b", 12.0);
        })
        .unwrap();
    assert_eq!(session.render_count(), 2);
    assert_eq!(computed_hypotenuse(&rendered.view), "13.00");
}

#[test]
fn registering_a_component_takes_effect_on_next_render_only() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    let before = session.render();
    session
        .registry_mut()
        .register("h1", |_: &mut RenderContext<'_>, _: &Element| View::text("custom heading"));
    assert!(!before.view.text_content().contains("custom heading"));
    assert!(session.render().view.text_content().contains("custom heading"));
}

#[test]
fn custom_component_reads_state_through_context() {
    let document = Document::from_json(json!({
        "id": "v",
        "title": "v",
        "state": { "n": 3 },
        "content": { "type": "Bars", "props": { "count": "n" } }
    }))
    .unwrap();
    let mut registry = Registry::with_builtins();
    registry.register("Bars", |cx: &mut RenderContext<'_>, element: &Element| {
        let count = match element.props.str("count") {
            Some(key) => cx.get(key).and_then(Value::as_number).unwrap_or(0.0),
            None => 0.0,
        };
        View::text("|".repeat(count as usize))
    });
    assert_eq!(Session::new(&document, registry).render().view.text_content(), "|||");
}

#[test]
fn reseed_replaces_state_without_merging() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    session.set("a", 9.0);
    session.flush();

    let replacement = Document::from_json(json!({
        "id": "other",
        "title": "Other",
        "state": { "z": 1 },
        "content": { "type": "Display", "props": { "bind": "z" } }
    }))
    .unwrap();
    let before = session.generation();
    let rendered = session.reseed(&replacement);

    assert_ne!(session.generation(), before);
    assert_eq!(rendered.view.text_content(), "1");
    assert_eq!(session.state().get("a"), None);
    assert_eq!(session.document().id, "other");
}

#[test]
fn stale_annotation_responses_are_ignored() {
    let mut session = Session::new(&pythagoras(), Registry::with_builtins());
    let tickets = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&tickets);
    session.set_annotation_hook(move |ticket| sink.borrow_mut().push(ticket));

    session.set("showProof", true);
    let rendered = session.flush().unwrap();
    let annotate = rendered
        .view
        .handlers()
        .into_iter()
        .find(|handler| matches!(handler, Handler::Annotate { .. }))
        .cloned()
        .unwrap();
    let ask = || Interaction::Annotate {
        action: "branch".into(),
        selected_text: "four copies".into(),
    };
    session.dispatch(&annotate, ask()).unwrap();
    session.dispatch(&annotate, ask()).unwrap();

    let tickets = tickets.borrow();
    assert_eq!(tickets[0].request().selected_text, "four copies");
    assert!(tickets[0].request().context.starts_with("Rearrange"));

    let mut branched = pythagoras();
    branched.id = "pythagoras-branch".into();
    assert!(matches!(
        session.receive_annotation(&tickets[0], &branched),
        ReseedOutcome::Applied(_)
    ));
    assert_eq!(
        session.receive_annotation(&tickets[1], &pythagoras()),
        ReseedOutcome::Stale
    );
    assert_eq!(session.document().id, "pythagoras-branch");

    session.close();
    assert_eq!(
        session.receive_annotation(&tickets[0], &pythagoras()),
        ReseedOutcome::Stale
    );
    assert_eq!(session.render().diagnostics.len(), 1);
}

#[test]
fn oversized_expression_fails_inside_its_node() {
    let document = Document::from_json(json!({
        "id": "big",
        "title": "big",
        "state": { "a": 1 },
        "content": [
            { "type": "Computed", "props": { "compute": vec!["a"; 1000].join(" + ") } },
            { "type": "Conditional", "props": { "when": format!("{}a", "!".repeat(1000)) }, "children": "hidden" },
            { "type": "Computed", "props": { "compute": "a + 1" } }
        ]
    }))
    .unwrap();
    let rendered = Session::new(&document, Registry::with_builtins()).render();
    assert_eq!(rendered.view.text_content(), "2");
    assert_eq!(rendered.diagnostics.len(), 2);
    assert!(
        rendered
            .diagnostics
            .iter()
            .all(|diagnostic| diagnostic.kind == DiagnosticKind::Evaluation)
    );
}

