use crate::common::is_horizontal_whitespace;
use crate::token::Token;

/// Strip whitespace around `Block` tags that sit alone on their own line, and
/// drop any `Text` tokens left empty by that trimming.
///
/// A block tag at the very start or end of the token stream (no `Text`
/// neighbor on that side at all) is treated as vacuously satisfying the
/// "alone on its line" condition on that side — there is nothing on that
/// side of the tag to conflict with.
///
/// The predecessor and successor sides are trimmed asymmetrically: the
/// predecessor loses only its indentation (the newline ending the line
/// before stays, since that line's content still needs a separator from
/// whatever follows once the tag's own line is gone), while the successor
/// loses its indentation plus the one newline that closes the tag's own
/// line. A chain of adjacent tag-only lines therefore collapses each line to
/// nothing while leaving exactly one newline between the real content above
/// and below it, rather than eating both of that content's bounding newlines.
///
/// `Comment` tokens are transparent to this search: they are dropped during
/// tree building and contribute no characters to the rendered output, so a
/// comment sitting between a block tag and its nearest `Text` neighbor must
/// not block trimming or be mistaken for "real" content on the tag's line —
/// otherwise `{# c #}{% if … %}` would render differently than the same
/// source with `{# c #}` erased, breaking the comment-erasure law (§8).
/// Comment tokens themselves are left untouched and in place; only the
/// `Text` token found by looking through them is ever rewritten.
pub(crate) fn prune(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if let Token::Block(..) = &tokens[i] {
            let pred = predecessor_text(&out);
            let succ = successor_text(&tokens, i);
            if let (Some(pred), Some(succ)) = (pred, succ) {
                let pred_trim = pred.and_then(|idx| match &out[idx] {
                    Token::Text(t) => trim_predecessor(t).map(|s| (idx, s)),
                    _ => unreachable!("predecessor_text only ever points at a Text token"),
                });
                let succ_trim = succ.and_then(|idx| match &tokens[idx] {
                    Token::Text(t) => trim_successor(t).map(|s| (idx, s)),
                    _ => unreachable!("successor_text only ever points at a Text token"),
                });
                let pred_ok = pred.is_none() || pred_trim.is_some();
                let succ_ok = succ.is_none() || succ_trim.is_some();
                if pred_ok && succ_ok {
                    if let Some((idx, trimmed)) = pred_trim {
                        out[idx] = Token::Text(trimmed);
                    }
                    out.push(tokens[i].clone());
                    if let Some((idx, trimmed)) = succ_trim {
                        // Any `Comment` tokens strictly between the tag and
                        // its successor `Text` carry over untouched.
                        out.extend(tokens[i + 1..idx].iter().cloned());
                        out.push(Token::Text(trimmed));
                        i = idx;
                    }
                    i += 1;
                    continue;
                }
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out.retain(|t| !matches!(t, Token::Text(s) if s.is_empty()));
    out
}

/// Look backward from the end of `out` through any trailing `Comment`
/// tokens for the `Text` token a soon-to-be-pushed `Block` tag would
/// actually sit next to once comments are gone. `Some(None)` means nothing
/// but comments (or nothing at all) precedes — vacuously eligible; `None`
/// means a non-`Text`, non-`Comment` token blocks trimming; `Some(Some(idx))`
/// gives the index of the `Text` token in `out`.
fn predecessor_text(out: &[Token]) -> Option<Option<usize>> {
    let comments = out
        .iter()
        .rev()
        .take_while(|t| matches!(t, Token::Comment(..)))
        .count();
    if comments == out.len() {
        return Some(None);
    }
    let idx = out.len() - comments - 1;
    match &out[idx] {
        Token::Text(_) => Some(Some(idx)),
        _ => None,
    }
}

/// Counterpart of [`predecessor_text`], scanning forward from just after
/// `tokens[i]` through any leading `Comment` tokens.
fn successor_text(tokens: &[Token], i: usize) -> Option<Option<usize>> {
    let mut idx = i + 1;
    while let Some(Token::Comment(..)) = tokens.get(idx) {
        idx += 1;
    }
    if idx >= tokens.len() {
        return Some(None);
    }
    match &tokens[idx] {
        Token::Text(_) => Some(Some(idx)),
        _ => None,
    }
}

/// If `text`'s run since its last newline (or its entirety, if it has none)
/// is pure horizontal whitespace, return the text with that run stripped.
///
/// Only the indentation on the tag's own line is removed here; the newline
/// that ends the *previous* line, if any, is left in place. The tag's own
/// trailing newline is consumed separately, from the successor side, by
/// [`trim_successor`] — splitting the work this way ensures a tag alone on
/// its line removes exactly one newline overall (its own), not two.
fn trim_predecessor(text: &str) -> Option<String> {
    let tail_start = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let tail = &text[tail_start..];
    if !tail.chars().all(is_horizontal_whitespace) {
        return None;
    }
    Some(text[..tail_start].to_string())
}

/// Counterpart of [`trim_predecessor`] for the successor `Text`: strips the
/// leading horizontal whitespace run plus the one newline that ends the
/// tag's own line.
fn trim_successor(text: &str) -> Option<String> {
    let head_end = text.find('\n').unwrap_or(text.len());
    let head = &text[..head_end];
    if !head.chars().all(is_horizontal_whitespace) {
        return None;
    }
    let cut = if head_end < text.len() {
        head_end + 1
    } else {
        head_end
    };
    Some(text[cut..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Location;

    fn loc() -> Location {
        Location { line: 1, column: 1 }
    }

    #[test]
    fn tag_alone_on_its_line_is_fully_trimmed() {
        let tokens = vec![
            Token::Text("before\n  ".to_string()),
            Token::Block(" if true ".to_string(), loc()),
            Token::Text("\ncontent".to_string()),
        ];
        let pruned = prune(tokens);
        assert_eq!(
            pruned,
            vec![
                Token::Text("before\n".to_string()),
                Token::Block(" if true ".to_string(), loc()),
                Token::Text("content".to_string()),
            ]
        );
    }

    #[test]
    fn tag_sharing_a_line_with_text_is_untouched() {
        let tokens = vec![
            Token::Text("x = ".to_string()),
            Token::Block(" 1 ".to_string(), loc()),
            Token::Text(" done".to_string()),
        ];
        let pruned = prune(tokens.clone());
        assert_eq!(pruned, tokens);
    }

    #[test]
    fn tag_at_start_and_end_of_document_trims_its_one_side() {
        let tokens = vec![
            Token::Block(" comment ".to_string(), loc()),
            Token::Text("\nbody".to_string()),
        ];
        let pruned = prune(tokens);
        assert_eq!(
            pruned,
            vec![
                Token::Block(" comment ".to_string(), loc()),
                Token::Text("body".to_string()),
            ]
        );
    }

    #[test]
    fn comment_adjacent_to_a_lone_tag_does_not_block_trimming() {
        // `{# c #}{% if True %}\nX\n{% endif %}` — the leading comment must
        // not make the tag look "shared with content" on its line.
        let tokens = vec![
            Token::Comment(" c ".to_string(), loc()),
            Token::Block(" if True ".to_string(), loc()),
            Token::Text("\nX\n".to_string()),
            Token::Block(" endif ".to_string(), loc()),
        ];
        let pruned = prune(tokens);
        assert_eq!(
            pruned,
            vec![
                Token::Comment(" c ".to_string(), loc()),
                Token::Block(" if True ".to_string(), loc()),
                Token::Text("X\n".to_string()),
                Token::Block(" endif ".to_string(), loc()),
            ]
        );
    }

    #[test]
    fn comment_between_a_tag_and_its_text_neighbor_is_carried_over_untouched() {
        // A comment sitting between the tag and the real Text neighbor is
        // itself invisible to the eligibility check but must survive in the
        // output (to be dropped later by the tree builder), in its original
        // position relative to the trimmed text.
        let tokens = vec![
            Token::Text("before\n".to_string()),
            Token::Block(" if true ".to_string(), loc()),
            Token::Comment(" c ".to_string(), loc()),
            Token::Text("\ncontent".to_string()),
        ];
        let pruned = prune(tokens);
        assert_eq!(
            pruned,
            vec![
                Token::Text("before\n".to_string()),
                Token::Block(" if true ".to_string(), loc()),
                Token::Comment(" c ".to_string(), loc()),
                Token::Text("content".to_string()),
            ]
        );
    }
}
