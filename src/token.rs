use crate::error::Error;
use crate::{Delimiters, Location};

/// A lexed tag or run of literal text. See §3 of the engine's data model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Text(String),
    Code(String, Location),
    Comment(String, Location),
    Block(String, Location),
}

/// Single-pass scanner over the raw source, honoring escape sequences inside
/// `Code`/`Block` tags and nested `{# #}` pairs inside `Comment` tags.
///
/// Unlike the teacher's `Peekable<Chars>` lexer, delimiters here are
/// configurable multi-character strings rather than fixed single characters,
/// so this scanner keeps the whole input as a `Vec<char>` with a cursor,
/// giving it the multi-character lookahead `starts_with` needs.
pub(crate) struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    delimiters: &'a Delimiters,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &str, delimiters: &'a Delimiters) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            delimiters,
        }
    }

    fn loc(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = *self.chars.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn starts_with(&self, needle: &str) -> bool {
        let needle: Vec<char> = needle.chars().collect();
        if self.pos + needle.len() > self.chars.len() {
            return false;
        }
        self.chars[self.pos..self.pos + needle.len()] == needle[..]
    }

    fn bump_str(&mut self, s: &str) {
        for _ in s.chars() {
            self.bump();
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();
        let mut text = String::new();

        while !self.at_end() {
            if self.starts_with(&self.delimiters.code_open) {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(self.scan_code()?);
            } else if self.starts_with(&self.delimiters.comment_open) {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(self.scan_comment()?);
            } else if self.starts_with(&self.delimiters.block_open) {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(self.scan_block()?);
            } else {
                text.push(self.bump().expect("at_end() checked above"));
            }
        }
        if !text.is_empty() {
            tokens.push(Token::Text(text));
        }
        Ok(tokens)
    }

    /// Scan `{{ ... }}`, honoring `\{`/`\}` escapes in the interior.
    fn scan_code(&mut self) -> Result<Token, Error> {
        let loc = self.loc();
        let open = self.delimiters.code_open.clone();
        let close = self.delimiters.code_close.clone();
        self.bump_str(&open);
        let mut s = String::new();
        loop {
            if self.at_end() {
                return Err(Error::UnterminatedTag {
                    opener: "{{",
                    loc,
                });
            }
            if self.starts_with(&close) {
                self.bump_str(&close);
                return Ok(Token::Code(s, loc));
            }
            if self.starts_with("\\{") {
                self.bump_str("\\{");
                s.push('{');
                continue;
            }
            if self.starts_with("\\}") {
                self.bump_str("\\}");
                s.push('}');
                continue;
            }
            s.push(self.bump().expect("at_end() checked above"));
        }
    }

    /// Scan `{% ... %}`: single-line only, same escape handling as `Code`.
    fn scan_block(&mut self) -> Result<Token, Error> {
        let loc = self.loc();
        let open = self.delimiters.block_open.clone();
        let close = self.delimiters.block_close.clone();
        self.bump_str(&open);
        let mut s = String::new();
        loop {
            if self.at_end() {
                return Err(Error::UnterminatedTag {
                    opener: "{%",
                    loc,
                });
            }
            if self.chars[self.pos] == '\n' {
                return Err(Error::MultilineBlockTag { loc });
            }
            if self.starts_with(&close) {
                self.bump_str(&close);
                return Ok(Token::Block(s, loc));
            }
            if self.starts_with("\\{") {
                self.bump_str("\\{");
                s.push('{');
                continue;
            }
            if self.starts_with("\\}") {
                self.bump_str("\\}");
                s.push('}');
                continue;
            }
            s.push(self.bump().expect("at_end() checked above"));
        }
    }

    /// Scan `{# ... #}`: nested `{# #}` pairs increment/decrement a depth
    /// counter; only the closer at depth zero ends the token. No escapes are
    /// processed here — comments are discarded wholesale, never emitted.
    fn scan_comment(&mut self) -> Result<Token, Error> {
        let loc = self.loc();
        let open = self.delimiters.comment_open.clone();
        let close = self.delimiters.comment_close.clone();
        self.bump_str(&open);
        let mut depth: u32 = 0;
        let mut s = String::new();
        loop {
            if self.at_end() {
                return Err(Error::UnterminatedTag {
                    opener: "{#",
                    loc,
                });
            }
            if self.starts_with(&open) {
                depth += 1;
                for _ in open.chars() {
                    s.push(self.bump().expect("at_end() checked above"));
                }
                continue;
            }
            if self.starts_with(&close) {
                if depth == 0 {
                    self.bump_str(&close);
                    return Ok(Token::Comment(s, loc));
                }
                depth -= 1;
                for _ in close.chars() {
                    s.push(self.bump().expect("at_end() checked above"));
                }
                continue;
            }
            s.push(self.bump().expect("at_end() checked above"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input, &Delimiters::default()).tokenize().unwrap()
    }

    #[test]
    fn plain_text_is_a_single_token() {
        let tokens = lex("hello world");
        assert_eq!(tokens, vec![Token::Text("hello world".to_string())]);
    }

    #[test]
    fn code_tag_is_split_out() {
        let tokens = lex("a {{ 1 + 1 }} b");
        assert_eq!(
            tokens,
            vec![
                Token::Text("a ".to_string()),
                Token::Code(" 1 + 1 ".to_string(), Location { line: 1, column: 3 }),
                Token::Text(" b".to_string()),
            ]
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        let tokens = lex(r"{{ \{not a tag\} }}");
        match &tokens[0] {
            Token::Code(s, _) => assert_eq!(s, " {not a tag} "),
            other => panic!("expected Code token, got {:?}", other),
        }
    }

    #[test]
    fn nested_comments_count_depth() {
        let tokens = lex("{# outer {# inner #} still-outer #}x");
        match &tokens[0] {
            Token::Comment(s, _) => {
                assert_eq!(s, " outer {# inner #} still-outer ");
            }
            other => panic!("expected Comment token, got {:?}", other),
        }
        assert_eq!(tokens[1], Token::Text("x".to_string()));
    }

    #[test]
    fn unterminated_code_tag_is_an_error() {
        let err = Lexer::new("{{ oops", &Delimiters::default())
            .tokenize()
            .unwrap_err();
        matches!(err, Error::UnterminatedTag { .. });
    }

    #[test]
    fn newline_inside_block_tag_is_an_error() {
        let err = Lexer::new("{% if x\n %}", &Delimiters::default())
            .tokenize()
            .unwrap_err();
        matches!(err, Error::MultilineBlockTag { .. });
    }
}
