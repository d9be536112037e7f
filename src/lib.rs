#![allow(clippy::type_complexity)]
//! A text-template engine that evaluates embedded code against a shared Python
//! namespace.
//!
//! A document is ordinary text interleaved with three kinds of tags: `{{ expr }}`
//! code tags, `{# ... #}` comments, and `{% ... %}` block tags (`if`/`elif`/`else`,
//! `for`, `while`, `def`, `capture`, `comment`, `end`). [`process`] tokenizes,
//! parses and evaluates a document in one pass, against an embedded Python
//! runtime, and returns the rendered text.
//!
//! # Example
//!
//! ```rust
//! use tangle::process;
//!
//! let rendered = process("There are {{ 5 + 2 }} days in a week.", None).unwrap();
//! assert_eq!(rendered, "There are 7 days in a week.");
//! ```
//!
//! Control flow and loops use the `{% %}` block tags:
//!
//! ```rust
//! use tangle::process;
//!
//! let rendered = process("{% for i in range(3) %}{{i}}{% endfor %}", None).unwrap();
//! assert_eq!(rendered, "012");
//! ```

mod ast;
mod block;
mod common;
mod error;
mod eval;
mod prune;
mod python;
mod token;
mod tree;

pub use error::Error;

use pyo3::Python;
use std::collections::HashMap;
use std::fmt;

/// A `(line, column)` pair, both 1-based, attached to tokens and nodes for
/// diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The six delimiter strings that bound code, comment and block tags.
///
/// The default matches the fixed `{{ }}` / `{# #}` / `{% %}` triple described by
/// the engine's block tag vocabulary; a host embedding the engine may override
/// any of the six, as long as the result stays non-empty, at least two
/// characters, and pairwise distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub code_open: String,
    pub code_close: String,
    pub comment_open: String,
    pub comment_close: String,
    pub block_open: String,
    pub block_close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            code_open: "{{".to_string(),
            code_close: "}}".to_string(),
            comment_open: "{#".to_string(),
            comment_close: "#}".to_string(),
            block_open: "{%".to_string(),
            block_close: "%}".to_string(),
        }
    }
}

impl Delimiters {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let all = [
            &self.code_open,
            &self.code_close,
            &self.comment_open,
            &self.comment_close,
            &self.block_open,
            &self.block_close,
        ];
        for d in &all {
            if d.chars().count() < 2 {
                return Err(Error::InvalidDelimiters(format!(
                    "delimiter `{}` must be at least two characters",
                    d
                )));
            }
        }
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                if all[i] == all[j] {
                    return Err(Error::InvalidDelimiters(format!(
                        "delimiters must be pairwise distinct, but two are both `{}`",
                        all[i]
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Render `source`, evaluating every `{{ }}`/`{# #}`/`{% %}` construct against a
/// namespace seeded from `seed` (if given), using the default delimiter set.
///
/// See [`process_with_delimiters`] to override the delimiters.
pub fn process(source: &str, seed: Option<HashMap<String, pyo3::PyObject>>) -> Result<String, Error> {
    process_with_delimiters(source, seed, Delimiters::default())
}

/// Like [`process`], but with an explicit, possibly non-default, [`Delimiters`]
/// configuration.
pub fn process_with_delimiters(
    source: &str,
    seed: Option<HashMap<String, pyo3::PyObject>>,
    delimiters: Delimiters,
) -> Result<String, Error> {
    delimiters.validate()?;
    let tokens = token::Lexer::new(source, &delimiters).tokenize()?;
    let pruned = prune::prune(tokens);
    let tree = tree::Builder::new(pruned).build()?;

    Python::with_gil(|py| {
        let ns = python::Namespace::new(py).map_err(|e| Error::from_py_err(py, e, Location::default()))?;
        ns.install_builtins(py)
            .map_err(|e| Error::from_py_err(py, e, Location::default()))?;
        if let Some(seed) = seed {
            ns.seed(py, &seed)
                .map_err(|e| Error::from_py_err(py, e, Location::default()))?;
        }
        let outcome = eval::walk_nodes(py, &ns, &tree);
        let rendered = ns.take_root_buffer();
        outcome?;
        Ok(rendered)
    })
}
