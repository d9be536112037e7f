use crate::ast::{BlockKind, BlockNode, Node};
use crate::block::classify;
use crate::error::Error;
use crate::token::Token;
use crate::Location;

/// Where a block's `children` population loop stopped.
enum Stop {
    Eof,
    End { target: String, loc: Location },
    Continuation { kind: BlockKind, loc: Location },
}

/// Recursive-descent tree builder. Tokens are stored reversed so the next
/// token is always the cheap end of the vector to pop, mirroring the
/// teacher's `bump`/`current` lexer idiom.
pub(crate) struct Builder {
    tokens: Vec<Token>,
}

impl Builder {
    pub(crate) fn new(mut tokens: Vec<Token>) -> Self {
        tokens.reverse();
        Builder { tokens }
    }

    fn bump(&mut self) -> Option<Token> {
        self.tokens.pop()
    }

    pub(crate) fn build(mut self) -> Result<Vec<Node>, Error> {
        let (children, stop) = self.parse_body()?;
        match stop {
            Stop::Eof => Ok(children),
            Stop::End { loc, .. } => Err(Error::UnboundEnd { loc }),
            Stop::Continuation { loc, .. } => Err(Error::DanglingContinuation { loc }),
        }
    }

    /// Consume tokens into a flat children list until an `End`, a
    /// continuation (`elif`/`else`), or end of input is reached. The caller
    /// decides whether the stop reason is valid in its context.
    fn parse_body(&mut self) -> Result<(Vec<Node>, Stop), Error> {
        let mut children = Vec::new();
        loop {
            match self.bump() {
                None => return Ok((children, Stop::Eof)),
                Some(Token::Text(s)) => children.push(Node::Text(s)),
                Some(Token::Comment(_, _)) => {}
                Some(Token::Code(s, loc)) => children.push(Node::Code(s, loc)),
                Some(Token::Block(body, loc)) => {
                    let kind = classify(&body, loc)?;
                    match kind {
                        BlockKind::End { target } => {
                            return Ok((children, Stop::End { target, loc }))
                        }
                        BlockKind::Elif { .. } | BlockKind::Else => {
                            return Ok((children, Stop::Continuation { kind, loc }))
                        }
                        opening => children.push(self.parse_block(opening, loc)?),
                    }
                }
            }
        }
    }

    /// Parse everything from just after an opening block tag's keyword up to
    /// (and including) its closer, producing a fully formed `Node::Block`.
    ///
    /// The continuation protocol lives here: when `parse_body` stops on a
    /// continuation token, that token is always relative to *this* block,
    /// because every opening pushes exactly one frame (this call) and every
    /// `End`/continuation pops exactly one. A nested `if` inside this block's
    /// own children is resolved by its own, inner call to `parse_block` before
    /// control ever returns here.
    fn parse_block(&mut self, kind: BlockKind, loc: Location) -> Result<Node, Error> {
        let closer = kind.closer_name();
        let (children, stop) = self.parse_body()?;

        let allows_continuation = matches!(kind, BlockKind::If { .. } | BlockKind::Elif { .. });

        match stop {
            Stop::End { target, loc: end_loc } => {
                check_end_target(&target, closer, end_loc)?;
                Ok(Node::Block(BlockNode {
                    loc,
                    kind,
                    children,
                    continuation: None,
                }))
            }
            Stop::Continuation {
                kind: cont_kind,
                loc: cont_loc,
            } if allows_continuation => {
                let cont_node = self.parse_block(cont_kind, cont_loc)?;
                let cont_block = match cont_node {
                    Node::Block(b) => b,
                    _ => unreachable!("parse_block always returns Node::Block"),
                };
                Ok(Node::Block(BlockNode {
                    loc,
                    kind,
                    children,
                    continuation: Some(Box::new(cont_block)),
                }))
            }
            Stop::Continuation { loc: cont_loc, .. } => {
                Err(Error::DanglingContinuation { loc: cont_loc })
            }
            Stop::Eof => Err(Error::UnclosedTag { loc, kind: closer }),
        }
    }
}

fn check_end_target(target: &str, expected: &'static str, loc: Location) -> Result<(), Error> {
    if target.is_empty() || target == expected {
        Ok(())
    } else {
        Err(Error::MismatchedEnd {
            loc,
            expected,
            found: target.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Delimiters;

    fn build(source: &str) -> Vec<Node> {
        let tokens = crate::token::Lexer::new(source, &Delimiters::default())
            .tokenize()
            .unwrap();
        let pruned = crate::prune::prune(tokens);
        Builder::new(pruned).build().unwrap()
    }

    #[test]
    fn if_elif_else_form_a_continuation_chain() {
        let tree = build("{% if a %}A{% elif b %}B{% else %}C{% endif %}");
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            Node::Block(b) => {
                assert!(matches!(b.kind, BlockKind::If { .. }));
                let elif = b.continuation.as_ref().unwrap();
                assert!(matches!(elif.kind, BlockKind::Elif { .. }));
                let els = elif.continuation.as_ref().unwrap();
                assert!(matches!(els.kind, BlockKind::Else));
                assert!(els.continuation.is_none());
            }
            other => panic!("expected Block, got {:?}", other),
        }
    }

    #[test]
    fn nested_if_attaches_to_its_own_inner_if() {
        let tree = build(
            "{% for i in xs %}{% if a %}A{% else %}B{% endif %}{% endfor %}",
        );
        match &tree[0] {
            Node::Block(for_block) => {
                assert_eq!(for_block.children.len(), 1);
                match &for_block.children[0] {
                    Node::Block(inner_if) => {
                        assert!(inner_if.continuation.is_some());
                    }
                    other => panic!("expected inner if Block, got {:?}", other),
                }
            }
            other => panic!("expected for Block, got {:?}", other),
        }
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let tokens = crate::token::Lexer::new("{% if a %}A", &Delimiters::default())
            .tokenize()
            .unwrap();
        let pruned = crate::prune::prune(tokens);
        assert!(matches!(
            Builder::new(pruned).build(),
            Err(Error::UnclosedTag { .. })
        ));
    }

    #[test]
    fn mismatched_end_is_an_error() {
        let tokens = crate::token::Lexer::new("{% for x in xs %}A{% endif %}", &Delimiters::default())
            .tokenize()
            .unwrap();
        let pruned = crate::prune::prune(tokens);
        assert!(matches!(
            Builder::new(pruned).build(),
            Err(Error::MismatchedEnd { .. })
        ));
    }

    #[test]
    fn unbound_end_is_an_error() {
        let tokens = crate::token::Lexer::new("{% endif %}", &Delimiters::default())
            .tokenize()
            .unwrap();
        let pruned = crate::prune::prune(tokens);
        assert!(matches!(
            Builder::new(pruned).build(),
            Err(Error::UnboundEnd { .. })
        ));
    }
}
