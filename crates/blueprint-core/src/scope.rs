// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Scope & Namespace Layer (§4.3): package scopes and per-module local
//! scopes, qualified/unqualified lookup, import aliasing.
//!
//! Per §9's design note the reflection-driven, process-wide package
//! registry is replaced by an explicit, owned [`PackageRegistry`] that a
//! [`crate::context::Context`] constructs once and holds for the lifetime of
//! one generation run — see DESIGN.md for why a literal global `static` was
//! rejected (it would make the test suite non-hermetic).

use std::collections::HashMap;

use crate::ident;
use crate::ids::{PkgId, PoolId, RuleId, ScopeId, VarId};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("undefined variable {0:?}")]
    UndefinedVariable(String),
    #[error("undefined pool {0:?}")]
    UndefinedPool(String),
    #[error("undefined rule {0:?}")]
    UndefinedRule(String),
    #[error("qualified name {0:?} must have exactly one '.'")]
    NotQualified(String),
    #[error("qualified name {0:?}: unexported tail {1:?} (must start with an upper-case letter)")]
    NotExported(String, String),
    #[error("unknown import alias {0:?}")]
    UnknownImport(String),
}

#[derive(Debug)]
pub struct Package {
    pub full_name: String,
    pub short_name: String,
    pub pkg_path: String,
    pub scope: ScopeId,
}

/// Derives `(fullName, shortName)` from an opaque `pkgPath` (§3): path
/// separators become dots for the dotted full name, the last path component
/// is the short name.
fn derive_names(pkg_path: &str) -> (String, String) {
    let full = pkg_path.replace('/', ".");
    let short = pkg_path.rsplit('/').next().unwrap_or(pkg_path).to_owned();
    (full, short)
}

#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    variables: HashMap<String, VarId>,
    pools: HashMap<String, PoolId>,
    rules: HashMap<String, RuleId>,
    imports: HashMap<String, ScopeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Variable(VarId),
    Pool(PoolId),
    Rule(RuleId),
}

impl Scope {
    fn occupant(&self, name: &str) -> Option<&'static str> {
        if self.variables.contains_key(name) {
            Some("variable")
        } else if self.pools.contains_key(name) {
            Some("pool")
        } else if self.rules.contains_key(name) {
            Some("rule")
        } else if self.imports.contains_key(name) {
            Some("import")
        } else {
            None
        }
    }

    /// Refuses duplicate names in the same scope, across variables, pools,
    /// rules and imports together (§3's scope invariant). A collision here
    /// is always a caller bug.
    fn check_name_free(&self, name: &str) {
        if let Some(kind) = self.occupant(name) {
            crate::error::programming_error(format!("name {name:?} already bound to a {kind} in this scope"));
        }
    }

    pub fn add_variable(&mut self, name: &str, id: VarId) {
        self.check_name_free(name);
        self.variables.insert(name.to_owned(), id);
    }

    pub fn add_pool(&mut self, name: &str, id: PoolId) {
        self.check_name_free(name);
        self.pools.insert(name.to_owned(), id);
    }

    pub fn add_rule(&mut self, name: &str, id: RuleId) {
        self.check_name_free(name);
        self.rules.insert(name.to_owned(), id);
    }

    pub fn add_import(&mut self, alias: &str, scope: ScopeId) {
        self.check_name_free(alias);
        self.imports.insert(alias.to_owned(), scope);
    }

    pub fn own_variable(&self, name: &str) -> Option<VarId> {
        self.variables.get(name).copied()
    }

    pub fn own_pool(&self, name: &str) -> Option<PoolId> {
        self.pools.get(name).copied()
    }

    pub fn own_rule(&self, name: &str) -> Option<RuleId> {
        self.rules.get(name).copied()
    }

    pub fn own_import(&self, alias: &str) -> Option<ScopeId> {
        self.imports.get(alias).copied()
    }
}

/// Arena owning every [`Package`] and [`Scope`] created during one
/// generation run (§3, §5).
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: Vec<Package>,
    scopes: Vec<Scope>,
    by_path: HashMap<String, PkgId>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing package for `pkg_path`, or creates it (and its
    /// scope) on first reference (§3: "Created once per distinct pkgPath at
    /// first reference").
    pub fn get_or_create(&mut self, pkg_path: &str) -> PkgId {
        if let Some(&id) = self.by_path.get(pkg_path) {
            return id;
        }

        let scope_id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::default());

        let (full_name, short_name) = derive_names(pkg_path);
        let id = PkgId(self.packages.len() as u32);
        self.packages.push(Package {
            full_name,
            short_name,
            pkg_path: pkg_path.to_owned(),
            scope: scope_id,
        });
        self.by_path.insert(pkg_path.to_owned(), id);
        id
    }

    pub fn package(&self, id: PkgId) -> &Package {
        &self.packages[id.index()]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        id
    }

    pub fn packages(&self) -> impl Iterator<Item = (PkgId, &Package)> {
        self.packages.iter().enumerate().map(|(i, p)| (PkgId(i as u32), p))
    }

    /// Unqualified lookup: walk parents from `scope` upward, return the
    /// first match (§4.3).
    pub fn lookup_unqualified(&self, scope: ScopeId, name: &str) -> Option<Entity> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(v) = s.own_variable(name) {
                return Some(Entity::Variable(v));
            }
            if let Some(p) = s.own_pool(name) {
                return Some(Entity::Pool(p));
            }
            if let Some(r) = s.own_rule(name) {
                return Some(Entity::Rule(r));
            }
            current = s.parent;
        }
        None
    }

    /// `lookupImportedScope` (§4.3): walk parents for an `imports[alias]`.
    pub fn lookup_imported_scope(&self, scope: ScopeId, alias: &str) -> Result<ScopeId, LookupError> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(target) = self.scope(id).own_import(alias) {
                return Ok(target);
            }
            current = self.scope(id).parent;
        }
        Err(LookupError::UnknownImport(alias.to_owned()))
    }

    /// `lookupVariable(name)` (§4.3): qualified names `pkg.Name` resolve via
    /// the imports walk into `pkg`'s direct variables (no further parent
    /// walk after the qualified hop); unqualified names walk this scope's
    /// parents.
    pub fn lookup_variable(&self, scope: ScopeId, name: &str) -> Result<VarId, LookupError> {
        if let Some(dot) = name.find('.') {
            if name[dot + 1..].contains('.') {
                return Err(LookupError::NotQualified(name.to_owned()));
            }
            let (head, tail) = (&name[..dot], &name[dot + 1..]);
            if !ident::is_exported(tail) {
                return Err(LookupError::NotExported(name.to_owned(), tail.to_owned()));
            }
            let target = self.lookup_imported_scope(scope, head)?;
            self.scope(target)
                .own_variable(tail)
                .ok_or_else(|| LookupError::UndefinedVariable(name.to_owned()))
        } else {
            match self.lookup_unqualified(scope, name) {
                Some(Entity::Variable(v)) => Ok(v),
                _ => Err(LookupError::UndefinedVariable(name.to_owned())),
            }
        }
    }
}

/// Wraps a bare [`ScopeId`] with the `namePrefix` used to compute a local
/// variable's full name (§4.3).
#[derive(Debug, Clone)]
pub struct LocalScope {
    pub scope: ScopeId,
    pub name_prefix: String,
}

impl LocalScope {
    pub fn new(scope: ScopeId, name_prefix: impl Into<String>) -> Self {
        Self {
            scope,
            name_prefix: name_prefix.into(),
        }
    }

    pub fn full_name(&self, name: &str) -> String {
        format!("{}{name}", self.name_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unqualified_lookup_walks_parents() {
        let mut reg = PackageRegistry::new();
        let parent = reg.new_scope(None);
        reg.scope_mut(parent).add_variable("a", VarId(1));
        let child = reg.new_scope(Some(parent));

        assert_eq!(reg.lookup_variable(child, "a"), Ok(VarId(1)));
    }

    #[test]
    fn unqualified_lookup_fails_when_undefined() {
        let mut reg = PackageRegistry::new();
        let scope = reg.new_scope(None);
        assert_eq!(
            reg.lookup_variable(scope, "missing"),
            Err(LookupError::UndefinedVariable("missing".to_owned()))
        );
    }

    #[test]
    fn qualified_lookup_requires_export_and_single_dot() {
        let mut reg = PackageRegistry::new();
        let other = reg.new_scope(None);
        reg.scope_mut(other).add_variable("B", VarId(5));

        let local = reg.new_scope(None);
        reg.scope_mut(local).add_import("pkg", other);

        assert_eq!(reg.lookup_variable(local, "pkg.B"), Ok(VarId(5)));
        assert_eq!(
            reg.lookup_variable(local, "pkg.b"),
            Err(LookupError::NotExported("pkg.b".to_owned(), "b".to_owned()))
        );
        assert_eq!(
            reg.lookup_variable(local, "a.pkg.B"),
            Err(LookupError::NotQualified("a.pkg.B".to_owned()))
        );
        assert_eq!(
            reg.lookup_variable(local, "other.B"),
            Err(LookupError::UnknownImport("other".to_owned()))
        );
    }

    #[test]
    fn get_or_create_is_stable_per_path() {
        let mut reg = PackageRegistry::new();
        let a = reg.get_or_create("a/foo");
        let b = reg.get_or_create("a/foo");
        assert_eq!(a, b);

        let pkg = reg.package(a);
        assert_eq!(pkg.full_name, "a.foo");
        assert_eq!(pkg.short_name, "foo");
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn duplicate_name_in_scope_is_a_programming_error() {
        let mut reg = PackageRegistry::new();
        let scope = reg.new_scope(None);
        reg.scope_mut(scope).add_variable("a", VarId(1));
        reg.scope_mut(scope).add_pool("a", PoolId(1));
    }
}
