// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Hand-rolled tokenizer for Blueprints files (§6), in the style of
//! `stone_recipe::script`'s small interpreters rather than a
//! parser-generator crate.

use std::sync::Arc;

use crate::error::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    True,
    False,
    Eq,
    Colon,
    Comma,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
}

pub struct Lexer<'a> {
    file: Arc<str>,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: u32,
    column: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl<'a> Lexer<'a> {
    pub fn new(file: impl Into<Arc<str>>, source: &'a str) -> Self {
        Self {
            file: file.into(),
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.file.clone(), self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, (LexError, Position)> {
        self.skip_trivia();
        let start = self.pos();

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position: start,
            });
        };

        if is_ident_start(c) {
            let begin = self.byte_offset();
            while self.peek().is_some_and(is_ident_char) {
                self.bump();
            }
            let end = self.byte_offset();
            let text = &self.source[begin..end];
            let kind = match text {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                other => TokenKind::Ident(other.to_owned()),
            };
            return Ok(Token { kind, position: start });
        }

        if c == '"' {
            self.bump();
            let mut out = String::new();
            loop {
                match self.bump() {
                    None => return Err((LexError::UnterminatedString, start)),
                    Some('"') => break,
                    Some('\\') => match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some(other) => out.push(other),
                        None => return Err((LexError::UnterminatedString, start)),
                    },
                    Some(other) => out.push(other),
                }
            }
            return Ok(Token {
                kind: TokenKind::Str(out),
                position: start,
            });
        }

        self.bump();
        let kind = match c {
            '=' => TokenKind::Eq,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            other => return Err((LexError::UnexpectedChar(other), start)),
        };
        Ok(Token { kind, position: start })
    }

    fn byte_offset(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |&(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new("test.bp", src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn tokenizes_assignment() {
        assert_eq!(
            tokens(r#"subdirs = ["a", "b/*"]"#),
            vec![
                TokenKind::Ident("subdirs".to_owned()),
                TokenKind::Eq,
                TokenKind::LBracket,
                TokenKind::Str("a".to_owned()),
                TokenKind::Comma,
                TokenKind::Str("b/*".to_owned()),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            tokens("# a comment\nfoo_module { }"),
            vec![
                TokenKind::Ident("foo_module".to_owned()),
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn recognizes_bool_literals() {
        assert_eq!(tokens("true false"), vec![TokenKind::True, TokenKind::False, TokenKind::Eof]);
    }
}
