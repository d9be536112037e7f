use crate::Location;

/// Error produced while tokenizing, classifying, building or evaluating a template.
///
/// Every variant that can be attributed to a specific point in the source carries
/// a [`Location`]. A single `process` call aborts and surfaces the first error it
/// encounters; partial output is discarded.
#[derive(Debug)]
pub enum Error {
    /// A `{{`, `{%` or `{#` opener was never closed before end of input.
    UnterminatedTag {
        opener: &'static str,
        loc: Location,
    },
    /// A `{% ... %}` block tag interior contained a newline.
    MultilineBlockTag { loc: Location },
    /// The leading keyword of a block tag's interior did not match any known form.
    UnknownTag { loc: Location },
    /// `if`/`elif` without a trailing expression.
    MissingExpression { loc: Location },
    /// `else` followed by a non-empty interior.
    UnexpectedExpression { loc: Location },
    /// `for` whose header yielded no valid identifier targets.
    MalformedForTargets { loc: Location },
    /// `capture`/`def` named with something other than a bare identifier.
    InvalidIdentifier { loc: Location, found: String },
    /// An `{% end... %}` with no open block to close (other than the root).
    UnboundEnd { loc: Location },
    /// An `{% end... %}` whose target names a different kind than the block it closes.
    MismatchedEnd {
        loc: Location,
        expected: &'static str,
        found: String,
    },
    /// `elif`/`else` encountered where the currently open block is not `if`/`elif`.
    DanglingContinuation { loc: Location },
    /// A block was still open when the token stream ran out.
    UnclosedTag { loc: Location, kind: &'static str },
    /// A multi-line code block's continuation lines did not share the baseline indent.
    MismatchedIndentation { loc: Location, line: usize },
    /// Evaluating embedded Python code raised an exception.
    Eval { loc: Location, source: String },
    /// A user-defined macro was invoked with the wrong number of arguments.
    Arity {
        loc: Location,
        name: String,
        expected: usize,
        found: usize,
    },
    /// The configured delimiter set was invalid (empty, too short, or not distinct).
    InvalidDelimiters(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::UnterminatedTag { opener, loc } => {
                write!(f, "{}: unterminated {} tag", loc, opener)
            }
            Error::MultilineBlockTag { loc } => {
                write!(f, "{}: block tag must not span multiple lines", loc)
            }
            Error::UnknownTag { loc } => write!(f, "{}: unrecognized block tag", loc),
            Error::MissingExpression { loc } => {
                write!(f, "{}: expected an expression after if/elif", loc)
            }
            Error::UnexpectedExpression { loc } => {
                write!(f, "{}: else takes no expression", loc)
            }
            Error::MalformedForTargets { loc } => {
                write!(f, "{}: for loop has no valid target identifiers", loc)
            }
            Error::InvalidIdentifier { loc, found } => {
                write!(f, "{}: `{}` is not a valid identifier", loc, found)
            }
            Error::UnboundEnd { loc } => write!(f, "{}: end tag with no open block", loc),
            Error::MismatchedEnd {
                loc,
                expected,
                found,
            } => write!(
                f,
                "{}: mismatched end tag, expected end{} but found end{}",
                loc, expected, found
            ),
            Error::DanglingContinuation { loc } => {
                write!(f, "{}: elif/else without a matching if", loc)
            }
            Error::UnclosedTag { loc, kind } => {
                write!(f, "{}: unclosed {} block", loc, kind)
            }
            Error::MismatchedIndentation { loc, line } => {
                write!(f, "{}: line {} does not match the code block's indentation", loc, line)
            }
            Error::Eval { loc, source } => write!(f, "{}: {}", loc, source),
            Error::Arity {
                loc,
                name,
                expected,
                found,
            } => write!(
                f,
                "{}: {} expects {} argument(s), got {}",
                loc, name, expected, found
            ),
            Error::InvalidDelimiters(msg) => write!(f, "invalid delimiter configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Convert a raw `PyErr` raised while driving the embedded runtime into the
    /// engine's own error type, attributing it to `loc`.
    ///
    /// A `PyErr` raised by a macro's arity check (see `python::ArityError`) is
    /// unpacked back into the distinct `Arity` variant rather than flattened
    /// into a generic `Eval`, so callers see the same structured error whether
    /// the mismatch is caught on the Rust side or inside a Python call.
    pub(crate) fn from_py_err(py: pyo3::Python<'_>, err: pyo3::PyErr, loc: Location) -> Error {
        if err.is_instance_of::<crate::python::ArityError>(py) {
            if let Ok(args) = err
                .value(py)
                .getattr("args")
                .and_then(|a| a.extract::<(String, usize, usize)>())
            {
                return Error::Arity {
                    loc,
                    name: args.0,
                    expected: args.1,
                    found: args.2,
                };
            }
        }
        Error::Eval {
            loc,
            source: err.to_string(),
        }
    }
}
