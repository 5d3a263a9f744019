//! Engine for interactive tutorial documents.
//!
//! A [`Document`] pairs a content tree with seed state. A [`Session`] renders
//! that tree against its own [`StateStore`], re-renders on writes, and routes
//! annotation requests out to the host and their responses back in.

pub mod builtins;
pub mod config;
pub mod document;
pub mod evaluator;
pub mod format;
pub mod parser;
pub mod registry;
pub mod renderer;
pub mod session;
pub mod state;
pub mod value;
pub mod view;

pub use config::SessionOptions;
pub use document::{Document, DocumentError, Element, Node, Props};
pub use evaluator::{
    CompiledExpression, EvaluationError, ExpressionCache, compile, compile_bounded, evaluate,
};
pub use registry::{Component, Registry};
pub use renderer::{Diagnostic, DiagnosticKind, RenderContext, Rendered, render};
pub use session::{
    AnnotationHook, AnnotationRequest, AnnotationTicket, Interaction, InteractionError,
    ReseedOutcome, Session,
};
pub use state::{Snapshot, StateMap, StateStore};
pub use value::Value;
pub use view::{Handler, NumericRange, View};
