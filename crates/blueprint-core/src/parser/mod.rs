// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Blueprints file parser (§4.4.1, §6): a hand-rolled recursive-descent
//! parser over [`lexer`]'s tokens, producing an [`ast::File`].
//!
//! Top-level bare-identifier references (§6: a module property's value may
//! be "a bare identifier previously assigned") are resolved here, against a
//! table of this file's own top-level assignments seen so far — Blueprints
//! files are read top-to-bottom, so forward references are simply
//! undefined. Which top-level names are *semantically* meaningful (only
//! `subdirs`, per §6) is left to the Parse phase driver; the parser accepts
//! any `name = value` syntactically.
//!
//! On the first syntax error the parser stops and returns what it has
//! gathered so far plus that one diagnostic — Blueprints syntax errors tend
//! to cascade, so there is little value in resynchronizing and continuing.

pub mod ast;
pub mod lexer;

use std::collections::HashMap;
use std::sync::Arc;

use ast::{Assignment, File, ModuleBlock, PropertyNode, Value};
use lexer::{Lexer, Token, TokenKind};

use crate::error::{Diagnostic, ErrorKind, Position};

enum TopItem {
    Assignment(Assignment),
    Module(ModuleBlock),
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    top_vars: HashMap<String, Value>,
}

impl<'a> Parser<'a> {
    pub fn new(file_name: impl Into<Arc<str>>, source: &'a str) -> Result<Self, Diagnostic> {
        let mut lexer = Lexer::new(file_name, source);
        let current = lexer.next_token().map_err(to_diagnostic)?;
        Ok(Self {
            lexer,
            current,
            top_vars: HashMap::new(),
        })
    }

    /// Parses the whole file, stopping at the first syntax error.
    pub fn parse(mut self) -> Result<File, Diagnostic> {
        let mut file = File::default();
        loop {
            if self.current.kind == TokenKind::Eof {
                break;
            }
            match self.parse_top_item()? {
                TopItem::Assignment(a) => {
                    self.top_vars.insert(a.name.clone(), a.value.clone());
                    file.assignments.push(a);
                }
                TopItem::Module(m) => file.modules.push(m),
            }
        }
        Ok(file)
    }

    fn bump(&mut self) -> Result<Token, Diagnostic> {
        let next = self.lexer.next_token().map_err(to_diagnostic)?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn error_here(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(ErrorKind::Syntax, self.current.position.clone(), message)
    }

    fn expect_colon(&mut self) -> Result<(), Diagnostic> {
        if self.current.kind == TokenKind::Colon {
            self.bump()?;
            Ok(())
        } else {
            Err(self.error_here(format!("expected ':', found {:?}", self.current.kind)))
        }
    }

    fn parse_top_item(&mut self) -> Result<TopItem, Diagnostic> {
        let TokenKind::Ident(name) = self.current.kind.clone() else {
            return Err(self.error_here(format!("expected identifier, found {:?}", self.current.kind)));
        };
        let position = self.current.position.clone();
        self.bump()?;

        match self.current.kind {
            TokenKind::Eq => {
                self.bump()?;
                let value = self.parse_value()?;
                Ok(TopItem::Assignment(Assignment { name, position, value }))
            }
            TokenKind::LBrace => {
                let properties = self.parse_bindings(TokenKind::RBrace)?;
                Ok(TopItem::Module(ModuleBlock {
                    type_name: name,
                    position,
                    properties,
                }))
            }
            _ => Err(self.error_here(format!("expected '=' or '{{', found {:?}", self.current.kind))),
        }
    }

    /// Parses a brace-delimited `name: value, …` list, consuming the
    /// closing `terminator` token. Shared by module blocks and nested maps,
    /// which are syntactically identical.
    fn parse_bindings(&mut self, terminator: TokenKind) -> Result<Vec<PropertyNode>, Diagnostic> {
        self.bump()?; // consume '{'
        let mut props = Vec::new();
        while self.current.kind != terminator {
            let TokenKind::Ident(name) = self.current.kind.clone() else {
                return Err(self.error_here(format!("expected property name, found {:?}", self.current.kind)));
            };
            let position = self.current.position.clone();
            self.bump()?;
            self.expect_colon()?;
            let value = self.parse_value()?;
            props.push(PropertyNode { name, position, value });

            if self.current.kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        if self.current.kind != terminator {
            return Err(self.error_here(format!("expected {terminator:?}, found {:?}", self.current.kind)));
        }
        self.bump()?;
        Ok(props)
    }

    fn parse_value(&mut self) -> Result<Value, Diagnostic> {
        match self.current.kind.clone() {
            TokenKind::Str(s) => {
                self.bump()?;
                Ok(Value::Str(s))
            }
            TokenKind::True => {
                self.bump()?;
                Ok(Value::Bool(true))
            }
            TokenKind::False => {
                self.bump()?;
                Ok(Value::Bool(false))
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => Ok(Value::Map(self.parse_bindings(TokenKind::RBrace)?)),
            TokenKind::Ident(name) => {
                let position = self.current.position.clone();
                self.bump()?;
                self.top_vars
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| Diagnostic::new(ErrorKind::Syntax, position, format!("undefined reference {name:?}")))
            }
            other => Err(self.error_here(format!("expected a value, found {other:?}"))),
        }
    }

    fn parse_list(&mut self) -> Result<Value, Diagnostic> {
        self.bump()?; // consume '['
        let mut items = Vec::new();
        while self.current.kind != TokenKind::RBracket {
            let TokenKind::Str(s) = self.current.kind.clone() else {
                return Err(self.error_here(format!("expected a string literal, found {:?}", self.current.kind)));
            };
            self.bump()?;
            items.push(s);
            if self.current.kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        if self.current.kind != TokenKind::RBracket {
            return Err(self.error_here(format!("expected ']', found {:?}", self.current.kind)));
        }
        self.bump()?;
        Ok(Value::List(items))
    }
}

fn to_diagnostic((err, pos): (lexer::LexError, Position)) -> Diagnostic {
    Diagnostic::new(ErrorKind::Syntax, pos, err.to_string())
}

/// Parses one Blueprints file's source text (§6).
pub fn parse(file_name: impl Into<Arc<str>>, source: &str) -> Result<File, Diagnostic> {
    Parser::new(file_name, source)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subdirs_assignment() {
        let file = parse("root/Blueprints", r#"subdirs = ["a", "b/*"]"#).unwrap();
        assert_eq!(file.assignments.len(), 1);
        assert_eq!(file.assignments[0].name, "subdirs");
        match &file.assignments[0].value {
            Value::List(items) => assert_eq!(items, &["a".to_owned(), "b/*".to_owned()]),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn parses_module_block_with_mixed_values() {
        let src = r#"
            foo_module {
                name: "MyFooModule",
                deps: ["MyBarModule"],
                enabled: true,
                targets: {
                    linux: { srcs: "_linux" }
                }
            }
        "#;
        let file = parse("a/Blueprints", src).unwrap();
        assert_eq!(file.modules.len(), 1);
        let module = &file.modules[0];
        assert_eq!(module.type_name, "foo_module");
        assert_eq!(module.properties.len(), 4);
        assert_eq!(module.properties[0].name, "name");
        matches!(module.properties[2].value, Value::Bool(true));
    }

    #[test]
    fn resolves_bare_identifier_reference() {
        let src = r#"
            common_srcs = ["a.c", "b.c"]
            foo_module { name: "A", deps: common_srcs }
        "#;
        let file = parse("a/Blueprints", src).unwrap();
        match &file.modules[0].properties[1].value {
            Value::List(items) => assert_eq!(items, &["a.c".to_owned(), "b.c".to_owned()]),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn undefined_bare_identifier_is_a_syntax_error() {
        let err = parse("a/Blueprints", "foo_module { deps: nope }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn unterminated_brace_is_a_syntax_error() {
        let err = parse("a/Blueprints", "foo_module { name: \"A\"").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }
}
