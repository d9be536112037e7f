use crate::ast::BlockKind;
use crate::common::is_valid_identifier;
use crate::error::Error;
use crate::Location;
use regex::Regex;

/// Classify the (already trimmed) interior of a `{% ... %}` tag.
pub(crate) fn classify(body: &str, loc: Location) -> Result<BlockKind, Error> {
    let trimmed = body.trim();

    if trimmed.is_empty() {
        return Ok(BlockKind::End {
            target: String::new(),
        });
    }
    if let Some(rest) = trimmed.strip_prefix("end") {
        return Ok(BlockKind::End {
            target: rest.trim().to_string(),
        });
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match keyword {
        "if" => {
            if rest.is_empty() {
                Err(Error::MissingExpression { loc })
            } else {
                Ok(BlockKind::If {
                    expr: rest.to_string(),
                })
            }
        }
        "elif" => {
            if rest.is_empty() {
                Err(Error::MissingExpression { loc })
            } else {
                Ok(BlockKind::Elif {
                    expr: rest.to_string(),
                })
            }
        }
        "else" => {
            if rest.is_empty() {
                Ok(BlockKind::Else)
            } else {
                Err(Error::UnexpectedExpression { loc })
            }
        }
        "for" => classify_for(trimmed, loc),
        "while" => classify_while(rest, loc),
        "def" => classify_def(rest, loc),
        "capture" => classify_capture(rest, loc),
        "comment" => {
            if rest.is_empty() {
                Ok(BlockKind::Comment)
            } else {
                Err(Error::UnknownTag { loc })
            }
        }
        _ => Err(Error::UnknownTag { loc }),
    }
}

/// Extract `for`-header targets and build the generator-expression rewrite.
///
/// `interior` is the entire tag body, e.g. `for x in xs for y in ys if cond`.
/// Each `for ... in` clause's target list is walked for bare identifiers
/// (tolerating destructuring punctuation like `(a, b)` by stripping it);
/// duplicates are removed and the result is sorted so the target order is
/// deterministic regardless of clause order.
fn classify_for(interior: &str, loc: Location) -> Result<BlockKind, Error> {
    let clause = Regex::new(r"for\s+(.+?)\s+in\b").expect("static regex is valid");
    let mut targets: Vec<String> = Vec::new();
    for cap in clause.captures_iter(interior) {
        for tok in cap[1].split(|c: char| !(c.is_alphanumeric() || c == '_')) {
            if tok.is_empty() {
                continue;
            }
            if is_valid_identifier(tok) && !targets.contains(&tok.to_string()) {
                targets.push(tok.to_string());
            }
        }
    }
    if targets.is_empty() {
        return Err(Error::MalformedForTargets { loc });
    }
    targets.sort();
    let genexpr = format!("(({}) {})", targets.join(", "), interior);
    Ok(BlockKind::For { targets, genexpr })
}

/// Strip an optional leading `dofirst` and trailing `slow` modifier off a
/// `while` header, leaving the bare loop condition.
fn classify_while(rest: &str, loc: Location) -> Result<BlockKind, Error> {
    let mut expr = rest;
    let mut dofirst = false;
    let mut slow = false;

    if let Some(stripped) = expr.strip_prefix("dofirst") {
        if stripped.starts_with(char::is_whitespace) {
            dofirst = true;
            expr = stripped.trim_start();
        }
    }
    if let Some(stripped) = expr.strip_suffix("slow") {
        if stripped.ends_with(char::is_whitespace) {
            slow = true;
            expr = stripped.trim_end();
        }
    }
    if expr.is_empty() {
        return Err(Error::MissingExpression { loc });
    }
    Ok(BlockKind::While {
        expr: expr.to_string(),
        dofirst,
        slow,
    })
}

fn classify_def(rest: &str, loc: Location) -> Result<BlockKind, Error> {
    let mut words = rest.split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| Error::InvalidIdentifier {
            loc,
            found: String::new(),
        })?;
    if !is_valid_identifier(name) {
        return Err(Error::InvalidIdentifier {
            loc,
            found: name.to_string(),
        });
    }
    let mut params = Vec::new();
    for w in words {
        if !is_valid_identifier(w) {
            return Err(Error::InvalidIdentifier {
                loc,
                found: w.to_string(),
            });
        }
        params.push(w.to_string());
    }
    let mut seen = std::collections::HashSet::new();
    for p in &params {
        if !seen.insert(p.clone()) {
            return Err(Error::InvalidIdentifier {
                loc,
                found: p.clone(),
            });
        }
    }
    Ok(BlockKind::Def {
        name: name.to_string(),
        params,
    })
}

fn classify_capture(rest: &str, loc: Location) -> Result<BlockKind, Error> {
    let name = rest.trim();
    if !is_valid_identifier(name) {
        return Err(Error::InvalidIdentifier {
            loc,
            found: name.to_string(),
        });
    }
    Ok(BlockKind::Capture {
        varname: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location { line: 1, column: 1 }
    }

    #[test]
    fn if_requires_an_expression() {
        assert!(matches!(
            classify("if", loc()),
            Err(Error::MissingExpression { .. })
        ));
        assert!(matches!(
            classify("if x > 0", loc()).unwrap(),
            BlockKind::If { .. }
        ));
    }

    #[test]
    fn else_rejects_an_expression() {
        assert!(matches!(
            classify("else x", loc()),
            Err(Error::UnexpectedExpression { .. })
        ));
        assert!(matches!(classify("else", loc()).unwrap(), BlockKind::Else));
    }

    #[test]
    fn end_with_and_without_target() {
        assert!(matches!(
            classify("end", loc()).unwrap(),
            BlockKind::End { target } if target.is_empty()
        ));
        assert!(matches!(
            classify("endif", loc()).unwrap(),
            BlockKind::End { target } if target == "if"
        ));
    }

    #[test]
    fn for_header_extracts_sorted_targets() {
        match classify("for x in [1,2,3] for y in ['a','b']", loc()).unwrap() {
            BlockKind::For { targets, genexpr } => {
                assert_eq!(targets, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(
                    genexpr,
                    "((x, y) for x in [1,2,3] for y in ['a','b'])"
                );
            }
            other => panic!("expected For, got {:?}", other),
        }
    }

    #[test]
    fn while_header_parses_dofirst_and_slow() {
        match classify("while dofirst False", loc()).unwrap() {
            BlockKind::While {
                expr,
                dofirst,
                slow,
            } => {
                assert_eq!(expr, "False");
                assert!(dofirst);
                assert!(!slow);
            }
            other => panic!("expected While, got {:?}", other),
        }
        match classify("while x < 10 slow", loc()).unwrap() {
            BlockKind::While { expr, slow, .. } => {
                assert_eq!(expr, "x < 10");
                assert!(slow);
            }
            other => panic!("expected While, got {:?}", other),
        }
    }

    #[test]
    fn def_rejects_duplicate_params() {
        assert!(matches!(
            classify("def greet name name", loc()),
            Err(Error::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(matches!(
            classify("frobnicate", loc()),
            Err(Error::UnknownTag { .. })
        ));
    }
}
