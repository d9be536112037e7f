//! The tree walker: a post-order-ish traversal that renders a parsed document
//! against a [`crate::python::Namespace`], returning nothing but leaving its
//! rendered text in the namespace's current output buffer.

use crate::ast::{BlockKind, BlockNode, Node};
use crate::common::is_horizontal_whitespace;
use crate::error::Error;
use crate::python::{Macro, Namespace};
use crate::Location;
use pyo3::prelude::*;
use std::time::{Duration, Instant};

/// How long a `while` loop without `slow` is allowed to run before the guard
/// terminates it between iterations.
const WHILE_GUARD: Duration = Duration::from_secs(2);

pub(crate) fn walk_nodes(py: Python<'_>, ns: &Namespace, nodes: &[Node]) -> Result<(), Error> {
    for node in nodes {
        walk_node(py, ns, node)?;
    }
    Ok(())
}

fn walk_node(py: Python<'_>, ns: &Namespace, node: &Node) -> Result<(), Error> {
    match node {
        Node::Text(s) => {
            ns.write_str(s);
            Ok(())
        }
        Node::Code(s, loc) => {
            let rendered = eval_code(py, ns, s, *loc)?;
            ns.write_str(&rendered);
            Ok(())
        }
        Node::Block(block) => walk_block(py, ns, block),
    }
}

fn walk_block(py: Python<'_>, ns: &Namespace, block: &BlockNode) -> Result<(), Error> {
    match &block.kind {
        BlockKind::If { .. } | BlockKind::Elif { .. } => eval_if_chain(py, ns, block),
        BlockKind::Else => {
            unreachable!("Else only ever appears as a continuation, never a top-level kind")
        }
        BlockKind::For { targets, genexpr } => eval_for(py, ns, block, targets, genexpr),
        BlockKind::While { expr, dofirst, slow } => {
            eval_while(py, ns, block, expr, *dofirst, *slow)
        }
        BlockKind::Def { name, params } => eval_def(py, ns, block, name, params),
        BlockKind::Capture { varname } => eval_capture(py, ns, block, varname),
        BlockKind::Comment => Ok(()),
        BlockKind::End { .. } => unreachable!("End is transient, never present in a finished tree"),
    }
}

/// Walk an `if`/`elif`/`else` continuation chain, rendering at most one
/// branch. `block` is always the chain's `If` head or an inner `Elif`.
fn eval_if_chain(py: Python<'_>, ns: &Namespace, block: &BlockNode) -> Result<(), Error> {
    let mut current = block;
    loop {
        match &current.kind {
            BlockKind::If { expr } | BlockKind::Elif { expr } => {
                let cond = ns
                    .eval(py, expr)
                    .map_err(|e| Error::from_py_err(py, e, current.loc))?;
                if ns
                    .truthy(py, &cond)
                    .map_err(|e| Error::from_py_err(py, e, current.loc))?
                {
                    return walk_nodes(py, ns, &current.children);
                }
                match &current.continuation {
                    Some(next) => current = next.as_ref(),
                    None => return Ok(()),
                }
            }
            BlockKind::Else => return walk_nodes(py, ns, &current.children),
            other => unreachable!("continuation chain held a non-chain kind: {:?}", other),
        }
    }
}

/// Bind `targets` to the elements of one generator-yielded tuple.
///
/// For a single target the yielded value is the scalar itself — `(x)` is not
/// a tuple in Python, so there is nothing to unpack — but for two or more
/// targets the value must be iterated (not indexed), so any iterable, not
/// just a tuple, can be yielded.
fn bind_targets(
    py: Python<'_>,
    ns: &Namespace,
    targets: &[String],
    item: PyObject,
    loc: Location,
) -> Result<(), Error> {
    if targets.len() == 1 {
        return ns
            .set(py, &targets[0], item)
            .map_err(|e| Error::from_py_err(py, e, loc));
    }
    let bound = item.bind(py);
    let iter = bound.iter().map_err(|e| Error::from_py_err(py, e, loc))?;
    for (name, value) in targets.iter().zip(iter) {
        let value = value.map_err(|e| Error::from_py_err(py, e, loc))?;
        ns.set(py, name, value.to_object(py))
            .map_err(|e| Error::from_py_err(py, e, loc))?;
    }
    Ok(())
}

fn eval_for(
    py: Python<'_>,
    ns: &Namespace,
    block: &BlockNode,
    targets: &[String],
    genexpr: &str,
) -> Result<(), Error> {
    let snapshot = ns.snapshot(py, targets);
    let result = ns.for_iterate(py, genexpr, block.loc, |item| {
        bind_targets(py, ns, targets, item, block.loc)?;
        walk_nodes(py, ns, &block.children)
    });
    ns.restore(py, targets, snapshot)
        .map_err(|e| Error::from_py_err(py, e, block.loc))?;
    result
}

fn eval_while(
    py: Python<'_>,
    ns: &Namespace,
    block: &BlockNode,
    expr: &str,
    dofirst: bool,
    slow: bool,
) -> Result<(), Error> {
    let start = Instant::now();
    let guard_tripped = |start: Instant| !slow && start.elapsed() > WHILE_GUARD;

    if dofirst {
        walk_nodes(py, ns, &block.children)?;
        if guard_tripped(start) {
            log::warn!(
                "{}: while loop exceeded its wall-clock guard, terminating early",
                block.loc
            );
            return Ok(());
        }
    }
    loop {
        let cond = ns
            .eval(py, expr)
            .map_err(|e| Error::from_py_err(py, e, block.loc))?;
        if !ns
            .truthy(py, &cond)
            .map_err(|e| Error::from_py_err(py, e, block.loc))?
        {
            return Ok(());
        }
        walk_nodes(py, ns, &block.children)?;
        if guard_tripped(start) {
            log::warn!(
                "{}: while loop exceeded its wall-clock guard, terminating early",
                block.loc
            );
            return Ok(());
        }
    }
}

fn eval_def(
    py: Python<'_>,
    ns: &Namespace,
    block: &BlockNode,
    name: &str,
    params: &[String],
) -> Result<(), Error> {
    let macro_obj = Py::new(
        py,
        Macro {
            name: name.to_string(),
            params: params.to_vec(),
            body: block.children.clone(),
            ns: ns.clone(),
        },
    )
    .map_err(|e| Error::from_py_err(py, e, block.loc))?;
    ns.set(py, name, macro_obj.to_object(py))
        .map_err(|e| Error::from_py_err(py, e, block.loc))
}

fn eval_capture(
    py: Python<'_>,
    ns: &Namespace,
    block: &BlockNode,
    varname: &str,
) -> Result<(), Error> {
    ns.push_buffer();
    let result = walk_nodes(py, ns, &block.children);
    let captured = ns.pop_buffer();
    result?;
    ns.set(py, varname, captured.to_object(py))
        .map_err(|e| Error::from_py_err(py, e, block.loc))
}

/// Evaluate one `{{ ... }}` code node, returning the text it contributes
/// directly (single-line expression mode). Multi-line statement mode writes
/// its output through the namespace itself and always returns the empty
/// string here.
fn eval_code(py: Python<'_>, ns: &Namespace, s: &str, loc: Location) -> Result<String, Error> {
    if s.contains('\n') {
        eval_multiline(py, ns, s, loc)?;
        return Ok(String::new());
    }
    match ns.eval(py, s) {
        Ok(value) => {
            if ns.is_none(py, &value) {
                Ok(String::new())
            } else {
                ns.stringify(py, &value)
                    .map_err(|e| Error::from_py_err(py, e, loc))
            }
        }
        Err(_) => {
            ns.exec(py, s).map_err(|e| Error::from_py_err(py, e, loc))?;
            Ok(String::new())
        }
    }
}

fn eval_multiline(py: Python<'_>, ns: &Namespace, s: &str, loc: Location) -> Result<(), Error> {
    let source = dedent_code(s, loc)?;
    ns.push_buffer();
    let result = ns.exec(py, &source);
    let captured = ns.pop_buffer();
    result.map_err(|e| Error::from_py_err(py, e, loc))?;
    let indent = " ".repeat(loc.column.saturating_sub(1));
    ns.write_str(&reindent_output(&captured, &indent));
    Ok(())
}

/// Strip the baseline indentation (that of the first non-empty line after the
/// opening line) from every subsequent non-empty line, leaving the opening
/// line untouched. A line that does not share the baseline is an error naming
/// its own line number.
fn dedent_code(s: &str, loc: Location) -> Result<String, Error> {
    let mut lines = s.split('\n');
    let first = lines.next().unwrap_or("");
    let rest: Vec<&str> = lines.collect();

    let baseline: String = rest
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| {
            l.chars()
                .take_while(|&c| is_horizontal_whitespace(c))
                .collect()
        })
        .unwrap_or_default();

    let mut out = vec![first.to_string()];
    for (i, line) in rest.iter().enumerate() {
        if line.trim().is_empty() {
            out.push(String::new());
            continue;
        }
        match line.strip_prefix(baseline.as_str()) {
            Some(tail) => out.push(tail.to_string()),
            None => {
                return Err(Error::MismatchedIndentation {
                    loc,
                    line: loc.line + i + 1,
                })
            }
        }
    }
    Ok(out.join("\n"))
}

/// Prefix every line but the first with `indent`, aligning generated output
/// with the column the code node's opening delimiter sat at in the template.
fn reindent_output(text: &str, indent: &str) -> String {
    let mut parts = text.split('\n');
    let mut out = parts.next().unwrap_or("").to_string();
    for part in parts {
        out.push('\n');
        out.push_str(indent);
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::process;
    use pyo3::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn plain_expression_is_stringified() {
        let rendered = process("There are {{ 5 + 2 }} days in a week.", None).unwrap();
        assert_eq!(rendered, "There are 7 days in a week.");
    }

    #[test]
    fn single_target_for_loop() {
        let rendered = process("{% for i in range(3) %}{{i}}{% endfor %}", None).unwrap();
        assert_eq!(rendered, "012");
    }

    #[test]
    fn multi_target_for_loop() {
        let rendered = process(
            "{% for x in [1,2,3] for y in ['a','b'] %}{{x}}{{y}} {% endfor %}",
            None,
        )
        .unwrap();
        assert_eq!(rendered, "1a 1b 2a 2b 3a 3b ");
    }

    #[test]
    fn if_elif_else_chain_picks_exactly_one_branch() {
        let rendered = process(
            "{% if False %}A{% elif False %}B{% elif True %}C{% else %}D{% endif %}",
            None,
        )
        .unwrap();
        assert_eq!(rendered, "C");
    }

    #[test]
    fn nested_if_inside_for_attaches_correctly() {
        let rendered = process(
            "{% for i in range(3) %}{% if i % 2 == 0 %}E{% else %}O{% endif %}{% endfor %}",
            None,
        )
        .unwrap();
        assert_eq!(rendered, "EOE");
    }

    #[test]
    fn capture_then_reuse_is_idempotent() {
        let rendered = process("{% capture g %}hi{% endcapture %}{{ g }}{{ g }}", None).unwrap();
        assert_eq!(rendered, "hihi");
    }

    #[test]
    fn while_dofirst_runs_body_before_testing_condition() {
        let rendered = process("{% while dofirst False %}once{% endwhile %}", None).unwrap();
        assert_eq!(rendered, "once");
    }

    #[test]
    fn for_loop_shadows_and_restores_a_global() {
        let mut seed = HashMap::new();
        pyo3::Python::with_gil(|py| {
            seed.insert("x".to_string(), "global".to_string().into_py(py));
        });
        let rendered = process(
            "{{x}}|{% for x in [\"loop\"] %}{{x}}{% endfor %}|{{x}}",
            Some(seed),
        )
        .unwrap();
        assert_eq!(rendered, "global|loop|global");
    }

    #[test]
    fn def_macro_is_callable_and_checks_arity() {
        let rendered = process(
            "{% def greet name %}hello {{ name }}{% enddef %}{{ greet(\"world\") }}",
            None,
        )
        .unwrap();
        assert_eq!(rendered, "hello world");

        let err = process(
            "{% def greet name %}hi{% enddef %}{{ greet() }}",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, crate::Error::Arity { .. }));
    }

    #[test]
    fn multiline_code_block_writes_via_the_write_helper() {
        let rendered = process("{{ \n  write(\"a\")\n  write(\"b\")\n}}", None).unwrap();
        assert_eq!(rendered, "a\nb\n");
    }

    #[test]
    fn whitespace_around_a_lone_block_tag_is_trimmed() {
        let rendered = process("before\n{% if True %}\n  X\n{% endif %}\nafter", None).unwrap();
        assert_eq!(rendered, "before\n  X\nafter");
    }
}
