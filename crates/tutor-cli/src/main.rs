use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use serde_json::Value as Json;
use tutor::{
    Document, EvaluationError, Node, Registry, Rendered, Session, SessionOptions, StateMap, Value,
    compile, evaluate,
};

#[derive(ClapParser)]
#[command(name = "tutor")]
#[command(about = "Render and check interactive tutorial documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document to HTML
    Render {
        /// Path to the document JSON
        file: PathBuf,
        /// Override a state variable before rendering (`key=value`, value parsed as JSON)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
        /// Print the view tree and diagnostics as JSON instead of HTML
        #[arg(long)]
        json: bool,
        /// Maximum nesting depth
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Compile every expression in a document and verify its state references
    Check {
        /// Path to the document JSON
        file: PathBuf,
    },
    /// Evaluate a single expression
    Eval {
        /// The expression source
        expression: String,
        /// State as a JSON object
        #[arg(long)]
        state: Option<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Render {
            file,
            overrides,
            json,
            max_depth,
        } => render_document(&file, &overrides, json, max_depth),
        Commands::Check { file } => check_document(&file),
        Commands::Eval { expression, state } => eval_expression(&expression, state.as_deref()),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_document(file: &Path) -> Result<Document> {
    let json = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    Document::from_json_str(&json).with_context(|| format!("loading {}", file.display()))
}

fn parse_override(assignment: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = assignment.split_once('=') else {
        bail!("'{assignment}' is not of the form key=value");
    };
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::text(raw));
    Ok((key.trim().to_owned(), value))
}

fn render_document(
    file: &Path,
    overrides: &[String],
    json: bool,
    max_depth: Option<usize>,
) -> Result<bool> {
    let document = load_document(file)?;
    let mut options = SessionOptions {
        log_diagnostics: false,
        ..SessionOptions::default()
    };
    if let Some(max_depth) = max_depth {
        options.max_depth = max_depth;
    }
    let overrides = overrides
        .iter()
        .map(|assignment| parse_override(assignment))
        .collect::<Result<Vec<_>>>()?;

    let mut session = Session::with_options(&document, Registry::with_builtins(), options);
    let rendered = render_with_overrides(&mut session, overrides);

    if json {
        println!("{}", serde_json::to_string_pretty(&rendered)?);
    } else {
        println!("{}", rendered.view.to_html());
        for diagnostic in &rendered.diagnostics {
            eprintln!(
                "warning: {} ({:?})",
                diagnostic.message,
                diagnostic.kind
            );
        }
    }
    Ok(true)
}

/// Applies `overrides` as one batch and returns the single render pass it causes.
fn render_with_overrides(session: &mut Session, overrides: Vec<(String, Value)>) -> Rendered {
    session
        .batch(|store| {
            for (key, value) in overrides {
                store.set(key, value);
            }
        })
        .unwrap_or_else(|| session.render())
}

fn check_document(file: &Path) -> Result<bool> {
    let document = load_document(file)?;
    let mut expressions = Vec::new();
    collect_expressions(&document.content, &mut expressions);

    let name = file.display().to_string();
    let mut problems = 0;
    for (prop, source) in &expressions {
        log::debug!("checking {prop}: {source}");
        let compiled = match compile(source) {
            Ok(compiled) => compiled,
            Err(error) => {
                eprintln!("{}", error.report(&name, source));
                problems += 1;
                continue;
            }
        };
        for (identifier, span) in compiled.identifiers() {
            if !document.state.contains_key(identifier) {
                let error = EvaluationError::UnknownIdentifier {
                    name: identifier.to_owned(),
                    span,
                };
                eprintln!("{}", error.report(&name, source));
                problems += 1;
            }
        }
    }

    let rendered = Session::with_options(
        &document,
        Registry::with_builtins(),
        SessionOptions {
            log_diagnostics: false,
            ..SessionOptions::default()
        },
    )
    .render();
    for diagnostic in &rendered.diagnostics {
        eprintln!("{:?}: {}", diagnostic.kind, diagnostic.message);
    }
    problems += rendered.diagnostics.len();

    if problems == 0 {
        eprintln!("{}: {} expressions OK", file.display(), expressions.len());
        return Ok(true);
    }
    eprintln!("{}: {problems} problem(s)", file.display());
    Ok(false)
}

/// Collects every `compute` and `when` source, including those inside node-valued props.
fn collect_expressions(node: &Node, out: &mut Vec<(String, String)>) {
    match node {
        Node::List(items) => items.iter().for_each(|item| collect_expressions(item, out)),
        Node::Element(element) => {
            for (name, value) in element.props.iter() {
                match value {
                    Json::String(source) if matches!(name, "compute" | "when") => {
                        out.push((name.to_owned(), source.clone()));
                    }
                    Json::Object(_) | Json::Array(_) => {
                        collect_expressions(&Node::from(value.clone()), out);
                    }
                    _ => {}
                }
            }
            for child in &element.children {
                collect_expressions(child, out);
            }
        }
        Node::Text(_) | Node::Number(_) | Node::Empty | Node::Malformed(_) => {}
    }
}

fn eval_expression(expression: &str, state: Option<&str>) -> Result<bool> {
    let state: StateMap = match state {
        Some(json) => serde_json::from_str(json).context("--state must be a JSON object")?,
        None => StateMap::new(),
    };
    match evaluate(expression, &state) {
        Ok(value) => {
            println!("{}", serde_json::to_string(&value)?);
            Ok(true)
        }
        Err(error) => {
            eprintln!("{}", error.report("<expression>", expression));
            Ok(false)
        }
    }
}
