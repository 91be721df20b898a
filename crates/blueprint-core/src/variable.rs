// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Variable, Pool and Rule records (§3) and their config-driven evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::ids::{PkgId, PoolId, ScopeId};
use crate::scope::{LookupError, PackageRegistry};
use crate::value::{ValueTemplate, parse_template};

/// A config-driven evaluator function, boxed so `Variable`/`Pool`/`Rule` stay
/// `Clone` + `Debug` without requiring their result type to be either.
pub struct Evaluator<T>(Arc<dyn Fn(&dyn Config) -> T + Send + Sync>);

impl<T> Evaluator<T> {
    pub fn new(f: impl Fn(&dyn Config) -> T + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, config: &dyn Config) -> T {
        (self.0)(config)
    }
}

impl<T> Clone for Evaluator<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> std::fmt::Debug for Evaluator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<evaluator fn>")
    }
}

#[derive(Debug, Clone)]
pub enum Variable {
    Static {
        pkg: PkgId,
        name: String,
        raw_value: ValueTemplate,
    },
    Config {
        pkg: PkgId,
        name: String,
        evaluator: Evaluator<String>,
    },
    /// A placeholder bound by rule-invocation arguments; reading its value
    /// always fails with [`EvalError::VariableIsArg`] (§3).
    Arg {
        name: String,
    },
    Local {
        name_prefix: String,
        name: String,
        template: ValueTemplate,
    },
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Static { name, .. } | Variable::Config { name, .. } | Variable::Arg { name } => name,
            Variable::Local { name, .. } => name,
        }
    }

    pub fn pkg(&self) -> Option<PkgId> {
        match self {
            Variable::Static { pkg, .. } | Variable::Config { pkg, .. } => Some(*pkg),
            Variable::Arg { .. } | Variable::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("variable is an unbound rule argument placeholder")]
    VariableIsArg,
    #[error("rule is the built-in 'phony' rule, which has no definition")]
    RuleIsBuiltin,
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("{0}")]
    Template(String),
}

/// Evaluates `variable` against `config`, parsing config-driven raw strings
/// lazily against `pkg`'s scope (§3, §4.5).
pub fn evaluate_variable(
    registry: &PackageRegistry,
    variable: &Variable,
    config: &dyn Config,
) -> Result<ValueTemplate, EvalError> {
    match variable {
        Variable::Static { raw_value, .. } => Ok(raw_value.clone()),
        Variable::Local { template, .. } => Ok(template.clone()),
        Variable::Arg { .. } => Err(EvalError::VariableIsArg),
        Variable::Config { pkg, evaluator, .. } => {
            let raw = evaluator.call(config);
            let scope = registry.package(*pkg).scope;
            parse_template(&raw, |name| registry.lookup_variable(scope, name))
                .map_err(|e| EvalError::Template(e.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParams {
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub enum Pool {
    Static {
        pkg: PkgId,
        name: String,
        params: PoolParams,
    },
    Config {
        pkg: PkgId,
        name: String,
        evaluator: Evaluator<PoolParams>,
    },
}

impl Pool {
    pub fn name(&self) -> &str {
        match self {
            Pool::Static { name, .. } | Pool::Config { name, .. } => name,
        }
    }

    pub fn pkg(&self) -> PkgId {
        match self {
            Pool::Static { pkg, .. } | Pool::Config { pkg, .. } => *pkg,
        }
    }
}

pub fn evaluate_pool(pool: &Pool, config: &dyn Config) -> PoolParams {
    match pool {
        Pool::Static { params, .. } => *params,
        Pool::Config { evaluator, .. } => evaluator.call(config),
    }
}

/// The attributes a rule's definition carries (§3). All string-valued
/// attributes are already-parsed [`ValueTemplate`]s so the live-set tracker
/// can walk them directly.
#[derive(Debug, Clone, Default)]
pub struct RuleParams {
    pub command: Option<ValueTemplate>,
    pub description: Option<ValueTemplate>,
    pub pool: Option<PoolId>,
    pub variables: HashMap<String, ValueTemplate>,
    pub rspfile: Option<ValueTemplate>,
    pub rspfile_content: Option<ValueTemplate>,
    pub restat: bool,
    pub generator: bool,
    pub deps: Option<ValueTemplate>,
    pub depfile: Option<ValueTemplate>,
}

impl RuleParams {
    /// All templates embedded in this rule's definition, for the live-set
    /// tracker to walk (§4.5 `addRule`: "for each variable value referenced
    /// within, recurse via addNinjaStringDeps").
    pub fn templates(&self) -> impl Iterator<Item = &ValueTemplate> {
        self.command
            .iter()
            .chain(self.description.iter())
            .chain(self.rspfile.iter())
            .chain(self.rspfile_content.iter())
            .chain(self.deps.iter())
            .chain(self.depfile.iter())
            .chain(self.variables.values())
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    /// The built-in `phony` rule: `pkg = none`, no definition, arg checking
    /// disabled (§3).
    Builtin,
    Static {
        pkg: PkgId,
        name: String,
        params: RuleParams,
        arg_names: Vec<String>,
        scope: ScopeId,
    },
    Config {
        pkg: PkgId,
        name: String,
        evaluator: Evaluator<RuleParams>,
        arg_names: Vec<String>,
        scope: ScopeId,
    },
    /// A rule declared inside a module's own `generate_build_actions`
    /// (`ModuleContext::rule`), scoped to that module instance the same way
    /// [`Variable::Local`] is rather than to a package.
    Local {
        name_prefix: String,
        name: String,
        params: RuleParams,
        arg_names: Vec<String>,
        scope: ScopeId,
    },
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::Builtin => "phony",
            Rule::Static { name, .. } | Rule::Config { name, .. } | Rule::Local { name, .. } => name,
        }
    }

    pub fn pkg(&self) -> Option<PkgId> {
        match self {
            Rule::Builtin | Rule::Local { .. } => None,
            Rule::Static { pkg, .. } | Rule::Config { pkg, .. } => Some(*pkg),
        }
    }

    /// `Some(prefix)` only for [`Rule::Local`], mirroring
    /// [`Variable::name_prefix`]'s use in full-name printing.
    pub fn name_prefix(&self) -> Option<&str> {
        match self {
            Rule::Local { name_prefix, .. } => Some(name_prefix),
            _ => None,
        }
    }

    pub fn arg_names(&self) -> &[String] {
        match self {
            Rule::Builtin => &[],
            Rule::Static { arg_names, .. } | Rule::Config { arg_names, .. } | Rule::Local { arg_names, .. } => arg_names,
        }
    }

    /// The rule's own child scope (§4.3), containing one `ArgVariable` per
    /// declared arg name plus the built-ins.
    pub fn arg_scope(&self) -> Option<ScopeId> {
        match self {
            Rule::Builtin => None,
            Rule::Static { scope, .. } | Rule::Config { scope, .. } | Rule::Local { scope, .. } => Some(*scope),
        }
    }
}

/// `addRule`'s evaluation step (§4.5): the built-in `phony` rule yields
/// [`EvalError::RuleIsBuiltin`], treated by the live-set tracker as a no-op.
pub fn evaluate_rule(rule: &Rule, config: &dyn Config) -> Result<RuleParams, EvalError> {
    match rule {
        Rule::Builtin => Err(EvalError::RuleIsBuiltin),
        Rule::Static { params, .. } | Rule::Local { params, .. } => Ok(params.clone()),
        Rule::Config { evaluator, .. } => Ok(evaluator.call(config)),
    }
}
