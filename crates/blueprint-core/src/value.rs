// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Value Template (§4.2): a parsed string containing `$var` / `${pkg.var}`
//! references, re-serializable bit-exactly with caller-selectable escaping.

use crate::ids::VarId;

/// `{ literals, vars }` with the invariant `len(literals) == len(vars) + 1`
/// (§3). Reassembled as `literals[0] + "${" + var[0] + "}" + literals[1] + …`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTemplate {
    literals: Vec<String>,
    vars: Vec<VarId>,
}

impl ValueTemplate {
    /// A template with no variable references at all.
    pub fn literal(s: impl Into<String>) -> Self {
        Self {
            literals: vec![s.into()],
            vars: Vec::new(),
        }
    }

    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    /// The ordered list of referenced variables, for the live-set tracker to
    /// walk (§4.2, §4.5).
    pub fn referenced_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.vars.iter().copied()
    }

    fn assert_invariant(&self) {
        debug_assert_eq!(self.literals.len(), self.vars.len() + 1);
    }

    /// `serialize(pkgLabels, escaper) = escape(literals[0]) + Σ ("${" +
    /// var[i].fullName(pkgLabels) + "}" + escape(literals[i+1]))` (§4.2).
    /// `name_of` resolves a `VarId` to its printable full name (the
    /// Unique-Name Resolver's output folded in by the caller, §4.7).
    pub fn serialize(&self, mut name_of: impl FnMut(VarId) -> String, escaper: Escaper) -> String {
        self.assert_invariant();

        let mut out = String::new();
        out.push_str(&escaper.escape(&self.literals[0]));
        for (var, literal) in self.vars.iter().zip(&self.literals[1..]) {
            out.push_str("${");
            out.push_str(&name_of(*var));
            out.push('}');
            out.push_str(&escaper.escape(literal));
        }
        out
    }
}

/// The three fixed escapers (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escaper {
    Default,
    InputPosition,
    OutputPosition,
}

impl Escaper {
    pub fn escape(self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match (self, c) {
                (_, '\n') => out.push_str("$\n"),
                (Escaper::InputPosition | Escaper::OutputPosition, ' ') => out.push_str("$ "),
                (Escaper::OutputPosition, ':') => out.push_str("$:"),
                _ => out.push(c),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError<E> {
    #[error("dangling '$' at end of string")]
    DanglingDollar,
    #[error("empty '${{}}' reference")]
    EmptyBraces,
    #[error("invalid character {0:?} after '$'")]
    InvalidCharAfterDollar(char),
    #[error("unclosed '${{' reference")]
    UnclosedBrace,
    #[error("{0}")]
    Lookup(E),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Literal,
    AfterDollar,
    UnbracketedName,
    BracketedName,
}

fn is_unbracketed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_bracketed_char(c: char) -> bool {
    is_unbracketed_char(c) || c == '.'
}

/// Parses `raw` into a [`ValueTemplate`], resolving each reference through
/// `lookup` (§4.2's "four-state machine"). `lookup` failures abort parsing
/// immediately, matching the spec's "lookup failures abort parsing".
pub fn parse_template<F, E>(raw: &str, mut lookup: F) -> Result<ValueTemplate, TemplateError<E>>
where
    F: FnMut(&str) -> Result<VarId, E>,
{
    let mut literals = Vec::new();
    let mut vars = Vec::new();

    let mut state = State::Literal;
    let mut current_literal = String::new();
    let mut current_name = String::new();

    for c in raw.chars() {
        match state {
            State::Literal => {
                if c == '$' {
                    state = State::AfterDollar;
                } else {
                    current_literal.push(c);
                }
            }
            State::AfterDollar => match c {
                '$' => {
                    current_literal.push('$');
                    state = State::Literal;
                }
                '{' => {
                    current_name.clear();
                    state = State::BracketedName;
                }
                c if is_unbracketed_char(c) => {
                    current_name.clear();
                    current_name.push(c);
                    state = State::UnbracketedName;
                }
                other => return Err(TemplateError::InvalidCharAfterDollar(other)),
            },
            State::UnbracketedName => {
                if is_unbracketed_char(c) {
                    current_name.push(c);
                } else {
                    let var = lookup(&current_name).map_err(TemplateError::Lookup)?;
                    vars.push(var);
                    literals.push(std::mem::take(&mut current_literal));
                    state = State::Literal;
                    // re-process `c` as the start of a fresh literal segment
                    if c == '$' {
                        state = State::AfterDollar;
                    } else {
                        current_literal.push(c);
                    }
                }
            }
            State::BracketedName => {
                if c == '}' {
                    if current_name.is_empty() {
                        return Err(TemplateError::EmptyBraces);
                    }
                    let var = lookup(&current_name).map_err(TemplateError::Lookup)?;
                    vars.push(var);
                    literals.push(std::mem::take(&mut current_literal));
                    state = State::Literal;
                } else if is_bracketed_char(c) {
                    current_name.push(c);
                } else {
                    return Err(TemplateError::InvalidCharAfterDollar(c));
                }
            }
        }
    }

    match state {
        State::Literal => {
            literals.push(current_literal);
        }
        State::AfterDollar => return Err(TemplateError::DanglingDollar),
        State::UnbracketedName => {
            let var = lookup(&current_name).map_err(TemplateError::Lookup)?;
            vars.push(var);
            literals.push(String::new());
        }
        State::BracketedName => return Err(TemplateError::UnclosedBrace),
    }

    let template = ValueTemplate { literals, vars };
    template.assert_invariant();
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &HashMap<&str, VarId>) -> impl Fn(&str) -> Result<VarId, String> + '_ {
        move |name: &str| vars.get(name).copied().ok_or_else(|| format!("undefined: {name}"))
    }

    #[test]
    fn parses_unbracketed_and_bracketed_refs() {
        let mut vars = HashMap::new();
        vars.insert("a", VarId(0));
        vars.insert("pkg.B", VarId(1));

        let template = parse_template("x$a y${pkg.B}z", lookup_from(&vars)).unwrap();
        assert_eq!(template.literals(), ["x", " y", "z"]);
        assert_eq!(template.vars(), [VarId(0), VarId(1)]);
    }

    #[test]
    fn dollar_dollar_escapes() {
        let vars = HashMap::new();
        let template = parse_template("a$$b", lookup_from(&vars)).unwrap();
        assert_eq!(template.literals(), ["a$b"]);
        assert!(template.vars().is_empty());
    }

    #[test]
    fn dangling_dollar_is_an_error() {
        let vars = HashMap::new();
        assert_eq!(parse_template("abc$", lookup_from(&vars)), Err(TemplateError::DanglingDollar));
    }

    #[test]
    fn empty_braces_is_an_error() {
        let vars = HashMap::new();
        assert_eq!(parse_template("${}", lookup_from(&vars)), Err(TemplateError::EmptyBraces));
    }

    #[test]
    fn unclosed_brace_is_an_error() {
        let vars = HashMap::new();
        assert_eq!(parse_template("${abc", lookup_from(&vars)), Err(TemplateError::UnclosedBrace));
    }

    #[test]
    fn trailing_unbracketed_var_gets_empty_literal() {
        let mut vars = HashMap::new();
        vars.insert("a", VarId(0));
        let template = parse_template("x$a", lookup_from(&vars)).unwrap();
        assert_eq!(template.literals(), ["x", ""]);
    }

    #[test]
    fn round_trips_through_serialize() {
        let mut vars = HashMap::new();
        vars.insert("a", VarId(0));
        vars.insert("pkg.B", VarId(1));
        let raw = "x$a y${pkg.B}z";
        let template = parse_template(raw, lookup_from(&vars)).unwrap();

        let names = HashMap::from([(VarId(0), "a".to_owned()), (VarId(1), "pkg.B".to_owned())]);
        let serialized = template.serialize(|id| names[&id].clone(), Escaper::Default);
        assert_eq!(serialized, "x${a} y${pkg.B}z");
    }

    #[test]
    fn default_escaper_only_escapes_newline() {
        assert_eq!(Escaper::Default.escape("a b\nc"), "a b$\nc");
        assert_eq!(Escaper::InputPosition.escape("a b\nc"), "a$ b$\nc");
        assert_eq!(Escaper::OutputPosition.escape("a b:c\n"), "a$ b$:c$\n");
    }
}
