//! One open document: its tree, state, registry and annotation round-trips.
//!
//! Every reseed stamps the session with a fresh generation. Annotation
//! requests carry the generation they were issued under, so a response that
//! arrives after the document moved on is recognized and dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::config::SessionOptions;
use crate::document::Document;
use crate::evaluator::ExpressionCache;
use crate::registry::Registry;
use crate::renderer::{Rendered, render};
use crate::state::{Snapshot, StateStore};
use crate::value::Value;
use crate::view::Handler;

pub type Generation = Ulid;

/// What the user did to an element carrying a [`Handler`].
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Number(f64),
    Activate,
    Annotate { action: String, selected_text: String },
}

impl Interaction {
    fn name(&self) -> &'static str {
        match self {
            Interaction::Number(_) => "number input",
            Interaction::Activate => "activation",
            Interaction::Annotate { .. } => "annotation",
        }
    }
}

/// Payload handed to the host when the user asks for an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRequest {
    pub action: String,
    pub selected_text: String,
    pub context: String,
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTicket {
    generation: Generation,
    request: AnnotationRequest,
}

impl AnnotationTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn request(&self) -> &AnnotationRequest {
        &self.request
    }
}

pub trait AnnotationHook {
    fn request(&mut self, ticket: AnnotationTicket);
}

impl<F> AnnotationHook for F
where
    F: FnMut(AnnotationTicket),
{
    fn request(&mut self, ticket: AnnotationTicket) {
        self(ticket)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InteractionError {
    #[error("session is closed")]
    Closed,
    #[error("{interaction} does not apply to a {handler} handler")]
    Mismatch {
        handler: &'static str,
        interaction: &'static str,
    },
    #[error("numeric input is not a number")]
    NotANumber,
    #[error("invalid numeric range: {0}")]
    InvalidRange(String),
    #[error("no annotation hook is installed")]
    NoAnnotationHook,
    #[error("action '{action}' is not offered here (offered: {})", .offered.join(", "))]
    UnknownAction { action: String, offered: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReseedOutcome {
    Applied(Rendered),
    /// The session was reseeded or closed after the request went out.
    Stale,
}

pub struct Session {
    document: Document,
    registry: Registry,
    store: StateStore,
    expressions: ExpressionCache,
    options: SessionOptions,
    generation: Generation,
    hook: Option<Box<dyn AnnotationHook>>,
    open: bool,
    render_count: u64,
}

impl Session {
    pub fn new(document: &Document, registry: Registry) -> Self {
        Self::with_options(document, registry, SessionOptions::default())
    }

    pub fn with_options(document: &Document, registry: Registry, options: SessionOptions) -> Self {
        let generation = Generation::new();
        log::debug!("opening session for '{}' ({generation})", document.id);
        Self {
            document: document.clone(),
            registry,
            store: StateStore::seeded(document.state.clone()),
            expressions: ExpressionCache::with_max_depth(options.max_expression_depth),
            options,
            generation,
            hook: None,
            open: true,
            render_count: 0,
        }
    }

    pub fn set_annotation_hook(&mut self, hook: impl AnnotationHook + 'static) {
        self.hook = Some(Box::new(hook));
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Listeners subscribe here; writes should go through [`Session::set`] or
    /// [`Session::batch`] so a render follows them.
    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn state(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    pub fn render(&mut self) -> Rendered {
        let snapshot = self.store.snapshot();
        let rendered = render(
            &self.registry,
            &self.document.content,
            &snapshot,
            &mut self.expressions,
            &self.options,
        );
        self.render_count += 1;
        log::trace!(
            "render pass {} of '{}': {} diagnostics",
            self.render_count,
            self.document.id,
            rendered.diagnostics.len()
        );
        rendered
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.set(key, value);
    }

    /// Re-renders once if anything was written since the last flush.
    pub fn flush(&mut self) -> Option<Rendered> {
        self.store.flush().then(|| self.render())
    }

    pub fn batch(&mut self, writes: impl FnOnce(&mut StateStore)) -> Option<Rendered> {
        writes(&mut self.store);
        self.flush()
    }

    pub fn dispatch(
        &mut self,
        handler: &Handler,
        interaction: Interaction,
    ) -> Result<Option<Rendered>, InteractionError> {
        if !self.open {
            return Err(InteractionError::Closed);
        }
        match (handler, interaction) {
            (Handler::SetNumber { key, range }, Interaction::Number(number)) => {
                if number.is_nan() {
                    return Err(InteractionError::NotANumber);
                }
                range.validate().map_err(InteractionError::InvalidRange)?;
                self.store.set(key.clone(), range.clamp(number));
                Ok(self.flush())
            }
            (Handler::Toggle { key }, Interaction::Activate) => {
                let on = self.store.get(key).is_some_and(Value::is_truthy);
                self.store.set(key.clone(), !on);
                Ok(self.flush())
            }
            (
                Handler::Annotate { actions, context },
                Interaction::Annotate {
                    action,
                    selected_text,
                },
            ) => {
                if !actions.contains(&action) {
                    return Err(InteractionError::UnknownAction {
                        action,
                        offered: actions.clone(),
                    });
                }
                let hook = self.hook.as_mut().ok_or(InteractionError::NoAnnotationHook)?;
                let ticket = AnnotationTicket {
                    generation: self.generation,
                    request: AnnotationRequest {
                        action,
                        selected_text,
                        context: context.clone(),
                        document_id: self.document.id.clone(),
                    },
                };
                log::info!(
                    "requesting '{}' annotation for '{}'",
                    ticket.request.action,
                    ticket.request.document_id
                );
                hook.request(ticket);
                Ok(None)
            }
            (handler, interaction) => Err(InteractionError::Mismatch {
                handler: handler_name(handler),
                interaction: interaction.name(),
            }),
        }
    }

    /// Replaces tree and state together. Old state is not merged in.
    pub fn reseed(&mut self, document: &Document) -> Rendered {
        self.generation = Generation::new();
        log::debug!(
            "reseeding session '{}' with '{}' ({})",
            self.document.id,
            document.id,
            self.generation
        );
        self.document = document.clone();
        self.expressions.clear();
        self.store.replace(document.state.clone());
        self.store.flush();
        self.render()
    }

    pub fn receive_annotation(
        &mut self,
        ticket: &AnnotationTicket,
        document: &Document,
    ) -> ReseedOutcome {
        if !self.open || ticket.generation != self.generation {
            log::debug!(
                "dropping stale '{}' annotation issued under {}",
                ticket.request.action,
                ticket.generation
            );
            return ReseedOutcome::Stale;
        }
        ReseedOutcome::Applied(self.reseed(document))
    }

    /// Later annotation responses become stale. Rendering keeps working on the
    /// last state.
    pub fn close(&mut self) {
        if self.open {
            log::debug!("closing session '{}'", self.document.id);
        }
        self.open = false;
        self.hook = None;
    }
}

fn handler_name(handler: &Handler) -> &'static str {
    match handler {
        Handler::SetNumber { .. } => "numeric",
        Handler::Toggle { .. } => "toggle",
        Handler::Annotate { .. } => "annotation",
    }
}
