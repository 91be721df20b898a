// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Shared identifier validation (§3): names live in `[A-Za-z0-9_.-]`, with
//! dots permitted only where a name is explicitly allowed to be qualified.

/// Built-in argument names every rule scope carries regardless of its own
/// declared `argNames` (§3, §4.3).
pub const BUILTIN_ARGS: [&str; 2] = ["out", "in"];

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validates an unqualified name: non-empty, ASCII, no dots.
pub fn validate_simple(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_owned());
    }
    if let Some(bad) = name.chars().find(|&c| !is_name_char(c)) {
        return Err(format!("invalid character {bad:?} in name {name:?}"));
    }
    Ok(())
}

/// Validates a possibly-qualified name: non-empty, ASCII, dots allowed as
/// package separators.
pub fn validate_qualified(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_owned());
    }
    if let Some(bad) = name.chars().find(|&c| !is_name_char(c) && c != '.') {
        return Err(format!("invalid character {bad:?} in name {name:?}"));
    }
    Ok(())
}

/// Validates a module name: non-empty, low-level-valid, and (per §4.4)
/// unqualified (a module name is never dotted).
pub fn validate_module_name(name: &str) -> Result<(), String> {
    validate_simple(name)
}

/// Validates a rule/rule-scope argument name: must validate as a simple
/// name, must not contain a dot (redundant with `validate_simple` but kept
/// to document the invariant explicitly), and must not collide with a
/// built-in arg name.
pub fn validate_arg_name(name: &str) -> Result<(), String> {
    validate_simple(name)?;
    if BUILTIN_ARGS.contains(&name) {
        return Err(format!("arg name {name:?} collides with a built-in arg name"));
    }
    Ok(())
}

/// True if `name` begins with an upper-case ASCII letter (the exported-name
/// rule used by qualified lookups, §4.3).
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}
