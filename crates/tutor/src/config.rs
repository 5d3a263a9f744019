use serde::Deserialize;

use crate::evaluator::DEFAULT_MAX_EXPRESSION_DEPTH;

/// Knobs for one document session. The engine itself never reads files or
/// environment variables; hosts build this from whatever they configure with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Nesting depth past which content is dropped with a diagnostic.
    pub max_depth: usize,
    /// Expression nesting past which a `compute` or `when` fails to compile.
    pub max_expression_depth: usize,
    /// Forward render diagnostics to the `log` facade as warnings.
    pub log_diagnostics: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_expression_depth: DEFAULT_MAX_EXPRESSION_DEPTH,
            log_diagnostics: true,
        }
    }
}
