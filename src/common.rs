#[inline]
pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

#[inline]
pub(crate) fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[inline]
pub(crate) fn is_horizontal_whitespace(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// A bare identifier: `[A-Za-z_][A-Za-z0-9_]*`. Python's own identifier grammar
/// is wider (it allows most Unicode letters), but the engine only ever binds
/// `for` targets, `def` names/params and `capture` names this way, and all of
/// the spec's examples are ASCII.
pub(crate) fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_continue),
        _ => false,
    }
}
