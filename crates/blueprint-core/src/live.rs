// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Live-Set Tracker (§4.5): the transitive closure of variables, pools and
//! rules reachable from the build statements emitted during generation,
//! evaluated lazily against a user config and memoized per entity.

use std::collections::HashMap;

use crate::config::Config;
use crate::ids::{PoolId, RuleId, VarId};
use crate::module::BuildDef;
use crate::scope::PackageRegistry;
use crate::value::ValueTemplate;
use crate::variable::{evaluate_pool, evaluate_rule, evaluate_variable, EvalError, Pool, PoolParams, Rule, RuleParams, Variable};

pub struct LiveTracker<'a> {
    registry: &'a PackageRegistry,
    variables: &'a [Variable],
    pools: &'a [Pool],
    rules: &'a [Rule],
    config: &'a dyn Config,

    live_variables: HashMap<VarId, ValueTemplate>,
    live_pools: HashMap<PoolId, PoolParams>,
    live_rules: HashMap<RuleId, RuleParams>,
}

impl<'a> LiveTracker<'a> {
    pub fn new(
        registry: &'a PackageRegistry,
        variables: &'a [Variable],
        pools: &'a [Pool],
        rules: &'a [Rule],
        config: &'a dyn Config,
    ) -> Self {
        Self {
            registry,
            variables,
            pools,
            rules,
            config,
            live_variables: HashMap::new(),
            live_pools: HashMap::new(),
            live_rules: HashMap::new(),
        }
    }

    pub fn live_variables(&self) -> &HashMap<VarId, ValueTemplate> {
        &self.live_variables
    }

    pub fn live_pools(&self) -> &HashMap<PoolId, PoolParams> {
        &self.live_pools
    }

    pub fn live_rules(&self) -> &HashMap<RuleId, RuleParams> {
        &self.live_rules
    }

    pub fn contains_variable(&self, id: VarId) -> bool {
        self.live_variables.contains_key(&id)
    }

    pub fn contains_rule(&self, id: RuleId) -> bool {
        self.live_rules.contains_key(&id)
    }

    /// Removes an entity from the live set, used by local-action harvesting
    /// (§4.6) to move a module's own live locals out of the global section.
    pub fn take_variable(&mut self, id: VarId) -> Option<ValueTemplate> {
        self.live_variables.remove(&id)
    }

    pub fn take_rule(&mut self, id: RuleId) -> Option<RuleParams> {
        self.live_rules.remove(&id)
    }

    /// `addBuildDefDeps` (§4.5).
    pub fn add_build_def_deps(&mut self, build: &BuildDef) {
        self.add_rule(build.rule);
        for template in build.outputs.iter().chain(&build.implicit_outputs) {
            self.add_ninja_string_deps(template);
        }
        for template in build.inputs.iter().chain(&build.implicits).chain(&build.order_only) {
            self.add_ninja_string_deps(template);
        }
        for template in build.args.values() {
            self.add_ninja_string_deps(template);
        }
    }

    /// `addRule` (§4.5): idempotent; the built-in `phony` rule contributes
    /// nothing.
    pub fn add_rule(&mut self, id: RuleId) {
        if self.live_rules.contains_key(&id) {
            return;
        }
        let rule = &self.rules[id.index()];
        let params = match evaluate_rule(rule, self.config) {
            Ok(params) => params,
            Err(EvalError::RuleIsBuiltin) => return,
            Err(other) => crate::error::programming_error(format!(
                "unexpected failure evaluating rule {:?}: {other}",
                rule.name()
            )),
        };

        if let Some(pool) = params.pool {
            self.add_pool(pool);
        }
        for template in params.templates() {
            self.add_ninja_string_deps(template);
        }
        self.live_rules.insert(id, params);
    }

    /// `addPool` (§4.5): idempotent.
    pub fn add_pool(&mut self, id: PoolId) {
        if self.live_pools.contains_key(&id) {
            return;
        }
        let pool = &self.pools[id.index()];
        let params = evaluate_pool(pool, self.config);
        self.live_pools.insert(id, params);
    }

    /// `addVariable` (§4.5): idempotent; `VariableIsArg` is a silent no-op
    /// since arg placeholders have no global value.
    pub fn add_variable(&mut self, id: VarId) {
        if self.live_variables.contains_key(&id) {
            return;
        }
        let variable = &self.variables[id.index()];
        let template = match evaluate_variable(self.registry, variable, self.config) {
            Ok(template) => template,
            Err(EvalError::VariableIsArg) => return,
            Err(other) => crate::error::programming_error(format!(
                "unexpected failure evaluating variable {:?}: {other}",
                variable.name()
            )),
        };
        self.live_variables.insert(id, template.clone());
        self.add_ninja_string_deps(&template);
    }

    fn add_ninja_string_deps(&mut self, template: &ValueTemplate) {
        for var in template.referenced_vars() {
            self.add_variable(var);
        }
    }

    pub fn add_ninja_string_list_deps<'t>(&mut self, templates: impl IntoIterator<Item = &'t ValueTemplate>) {
        for template in templates {
            self.add_ninja_string_deps(template);
        }
    }

    /// The variable-reference graph used by §4.8's cycle check: one node
    /// per live variable, edges to every variable it references.
    pub fn variable_cycles(&self) -> Vec<digraph::Cycle<VarId, ()>> {
        let mut dag = digraph::Dag::<VarId, ()>::new();
        for (&id, template) in &self.live_variables {
            let from = dag.add_node_or_get_index(&id);
            for dep in template.referenced_vars() {
                if !self.live_variables.contains_key(&dep) {
                    continue;
                }
                let to = dag.add_node_or_get_index(&dep);
                dag.add_edge(from, to, ());
            }
        }
        dag.find_cycles()
    }

    pub fn into_live_sets(self) -> (HashMap<VarId, ValueTemplate>, HashMap<PoolId, PoolParams>, HashMap<RuleId, RuleParams>) {
        (self.live_variables, self.live_pools, self.live_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoConfig;
    use crate::ids::PkgId;
    use crate::module::BuildDef;

    fn registry_with_scope() -> (PackageRegistry, crate::ids::ScopeId) {
        let mut reg = PackageRegistry::new();
        let pkg = reg.get_or_create("a/foo");
        let scope = reg.package(pkg).scope;
        (reg, scope)
    }

    #[test]
    fn add_variable_transitively_pulls_in_referenced_vars() {
        let (reg, _scope) = registry_with_scope();
        let pkg = PkgId(0);
        let a = Variable::Static {
            pkg,
            name: "a".to_owned(),
            raw_value: ValueTemplate::literal("leaf"),
        };
        let b = Variable::Static {
            pkg,
            name: "b".to_owned(),
            raw_value: {
                let mut vars = HashMap::new();
                vars.insert("a", VarId(0));
                crate::value::parse_template("$a-suffix", |n: &str| {
                    vars.get(n).copied().ok_or_else(|| format!("undefined {n}"))
                })
                .unwrap()
            },
        };
        let variables = vec![a, b];
        let pools: Vec<Pool> = vec![];
        let rules: Vec<Rule> = vec![];
        let config = NoConfig;
        let mut tracker = LiveTracker::new(&reg, &variables, &pools, &rules, &config);

        tracker.add_variable(VarId(1));
        assert!(tracker.contains_variable(VarId(0)));
        assert!(tracker.contains_variable(VarId(1)));
    }

    #[test]
    fn add_build_def_deps_is_idempotent_across_rules() {
        let (reg, _scope) = registry_with_scope();
        let variables: Vec<Variable> = vec![];
        let pools: Vec<Pool> = vec![];
        let rules = vec![Rule::Builtin];
        let config = NoConfig;
        let mut tracker = LiveTracker::new(&reg, &variables, &pools, &rules, &config);

        let build = BuildDef::new(RuleId(0));
        tracker.add_build_def_deps(&build);
        tracker.add_build_def_deps(&build);
        assert!(!tracker.contains_rule(RuleId(0)));
    }

    #[test]
    fn variable_cycles_detects_self_reference_through_live_set() {
        let (reg, _scope) = registry_with_scope();
        let pkg = PkgId(0);
        let template_a = crate::value::parse_template("$b", |n: &str| {
            if n == "b" { Ok(VarId(1)) } else { Err(format!("undefined {n}")) }
        })
        .unwrap();
        let template_b = crate::value::parse_template("$a", |n: &str| {
            if n == "a" { Ok(VarId(0)) } else { Err(format!("undefined {n}")) }
        })
        .unwrap();
        let variables = vec![
            Variable::Static {
                pkg,
                name: "a".to_owned(),
                raw_value: template_a,
            },
            Variable::Static {
                pkg,
                name: "b".to_owned(),
                raw_value: template_b,
            },
        ];
        let pools: Vec<Pool> = vec![];
        let rules: Vec<Rule> = vec![];
        let config = NoConfig;
        let mut tracker = LiveTracker::new(&reg, &variables, &pools, &rules, &config);
        tracker.add_variable(VarId(0));

        assert_eq!(tracker.variable_cycles().len(), 1);
    }
}
