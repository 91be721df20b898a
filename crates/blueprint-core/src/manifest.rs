// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Manifest Writer (§4.9, §4.9.1): emits the final build manifest in a
//! fixed, deterministic section order. Storage throughout the generator is
//! hash-map-backed, so every boundary here pre-sorts before printing (§5's
//! determinism note), the same way `boulder::package::emit::manifest`
//! keeps `BTreeSet`/sorted `Vec` at its own output boundary.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};

use crate::ids::{PkgId, PoolId, RuleId, VarId};
use crate::module::{BuildDef, LocalBuildActions, ModuleInfo, SingletonInfo};
use crate::value::Escaper;
use crate::variable::{Pool, PoolParams, Rule, RuleParams, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DownstreamVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl fmt::Display for DownstreamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Everything [`write_manifest`] needs, assembled by `Context` once
/// `prepare_build_actions` has succeeded (§4.9).
pub struct ManifestData<'a> {
    pub pkg_labels: &'a HashMap<PkgId, String>,
    pub variables: &'a [Variable],
    pub pools: &'a [Pool],
    pub rules: &'a [Rule],
    pub live_variables: &'a HashMap<VarId, crate::value::ValueTemplate>,
    pub live_pools: &'a HashMap<PoolId, PoolParams>,
    pub live_rules: &'a HashMap<RuleId, RuleParams>,
    pub builddir: Option<&'a crate::value::ValueTemplate>,
    pub required_version: DownstreamVersion,
    pub modules: &'a [ModuleInfo],
    pub singletons: &'a [SingletonInfo],
}

fn var_label(labels: &HashMap<PkgId, String>, variable: &Variable) -> String {
    match variable {
        Variable::Static { pkg, name, .. } | Variable::Config { pkg, name, .. } => {
            format!("{}.{name}", labels[pkg])
        }
        Variable::Local { name_prefix, name, .. } => format!("{name_prefix}{name}"),
        Variable::Arg { name } => name.clone(),
    }
}

fn pool_label(labels: &HashMap<PkgId, String>, pool: &Pool) -> String {
    format!("{}.{}", labels[&pool.pkg()], pool.name())
}

fn rule_label(labels: &HashMap<PkgId, String>, rule: &Rule) -> String {
    match (rule.pkg(), rule.name_prefix()) {
        (Some(pkg), _) => format!("{}.{}", labels[&pkg], rule.name()),
        (None, Some(prefix)) => format!("{prefix}{}", rule.name()),
        (None, None) => rule.name().to_owned(),
    }
}

pub fn write_manifest(out: &mut impl fmt::Write, data: &ManifestData<'_>) -> fmt::Result {
    write_header(out, data)?;
    writeln!(out, "ninja_required_version = {}", data.required_version)?;
    writeln!(out)?;

    write_global_variables(out, data)?;
    write_global_pools(out, data)?;

    if let Some(builddir) = data.builddir {
        let value = builddir.serialize(|id| var_label(data.pkg_labels, &data.variables[id.index()]), Escaper::Default);
        writeln!(out, "builddir = {value}")?;
        writeln!(out)?;
    }

    write_global_rules(out, data)?;

    let mut module_order: Vec<&ModuleInfo> = data.modules.iter().collect();
    module_order.sort_by(|a, b| a.name.cmp(&b.name));
    for module in module_order {
        write_module_header(out, &module.name, &module.type_name, &module.relative_source_path)?;
        write_local_actions(out, data, &module.actions)?;
    }

    let mut singleton_order: Vec<&SingletonInfo> = data.singletons.iter().collect();
    singleton_order.sort_by(|a, b| a.name.cmp(&b.name));
    for singleton in singleton_order {
        write_singleton_header(out, &singleton.name)?;
        write_local_actions(out, data, &singleton.actions)?;
    }

    Ok(())
}

fn write_header(out: &mut impl fmt::Write, data: &ManifestData<'_>) -> fmt::Result {
    let mut labels: Vec<&String> = data.pkg_labels.values().collect();
    labels.sort();
    let width = labels.iter().map(|l| l.len()).max().unwrap_or(0);
    writeln!(out, "# generated file, do not edit")?;
    for label in labels {
        writeln!(out, "#   {label:<width$}")?;
    }
    writeln!(out)
}

fn write_module_header(out: &mut impl fmt::Write, name: &str, type_name: &str, source_path: &str) -> fmt::Result {
    writeln!(out, "# module {name}: {type_name} ({source_path})")
}

fn write_singleton_header(out: &mut impl fmt::Write, name: &str) -> fmt::Result {
    writeln!(out, "# singleton {name}")
}

fn write_global_variables(out: &mut impl fmt::Write, data: &ManifestData<'_>) -> fmt::Result {
    let mut order: Vec<VarId> = data.live_variables.keys().copied().collect();
    order.sort_by_key(|id| var_label(data.pkg_labels, &data.variables[id.index()]));

    let mut printed: HashSet<VarId> = HashSet::new();
    for id in order {
        write_variable_dfs(out, data, id, &mut printed)?;
    }
    Ok(())
}

fn write_variable_dfs(out: &mut impl fmt::Write, data: &ManifestData<'_>, id: VarId, printed: &mut HashSet<VarId>) -> fmt::Result {
    if printed.contains(&id) {
        return Ok(());
    }
    printed.insert(id);

    let template = &data.live_variables[&id];
    for dep in template.referenced_vars() {
        if data.live_variables.contains_key(&dep) {
            write_variable_dfs(out, data, dep, printed)?;
        }
    }

    let name = var_label(data.pkg_labels, &data.variables[id.index()]);
    let value = template.serialize(|vid| var_label(data.pkg_labels, &data.variables[vid.index()]), Escaper::Default);
    writeln!(out, "{name} = {value}")?;
    writeln!(out)
}

fn write_global_pools(out: &mut impl fmt::Write, data: &ManifestData<'_>) -> fmt::Result {
    let mut order: Vec<PoolId> = data.live_pools.keys().copied().collect();
    order.sort_by_key(|id| pool_label(data.pkg_labels, &data.pools[id.index()]));
    for id in order {
        let name = pool_label(data.pkg_labels, &data.pools[id.index()]);
        let params = &data.live_pools[&id];
        writeln!(out, "pool {name}")?;
        writeln!(out, "  depth = {}", params.depth)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_global_rules(out: &mut impl fmt::Write, data: &ManifestData<'_>) -> fmt::Result {
    let mut order: Vec<RuleId> = data.live_rules.keys().copied().collect();
    order.sort_by_key(|id| rule_label(data.pkg_labels, &data.rules[id.index()]));
    for id in order {
        write_rule(out, data, id)?;
    }
    Ok(())
}

fn write_rule(out: &mut impl fmt::Write, data: &ManifestData<'_>, id: RuleId) -> fmt::Result {
    let name = rule_label(data.pkg_labels, &data.rules[id.index()]);
    write_rule_params(out, data, &name, &data.live_rules[&id])
}

fn write_rule_params(out: &mut impl fmt::Write, data: &ManifestData<'_>, name: &str, params: &RuleParams) -> fmt::Result {
    let name_of = |vid: VarId| var_label(data.pkg_labels, &data.variables[vid.index()]);

    writeln!(out, "rule {name}")?;
    if let Some(command) = &params.command {
        writeln!(out, "  command = {}", command.serialize(name_of, Escaper::Default))?;
    }
    if let Some(description) = &params.description {
        writeln!(out, "  description = {}", description.serialize(name_of, Escaper::Default))?;
    }
    if let Some(pool) = params.pool {
        writeln!(out, "  pool = {}", pool_label(data.pkg_labels, &data.pools[pool.index()]))?;
    }
    if let Some(rspfile) = &params.rspfile {
        writeln!(out, "  rspfile = {}", rspfile.serialize(name_of, Escaper::Default))?;
    }
    if let Some(rspfile_content) = &params.rspfile_content {
        writeln!(out, "  rspfile_content = {}", rspfile_content.serialize(name_of, Escaper::Default))?;
    }
    if params.restat {
        writeln!(out, "  restat = 1")?;
    }
    if params.generator {
        writeln!(out, "  generator = 1")?;
    }
    if let Some(deps) = &params.deps {
        writeln!(out, "  deps = {}", deps.serialize(name_of, Escaper::Default))?;
    }
    if let Some(depfile) = &params.depfile {
        writeln!(out, "  depfile = {}", depfile.serialize(name_of, Escaper::Default))?;
    }
    let mut extra: Vec<&String> = params.variables.keys().collect();
    extra.sort();
    for key in extra {
        writeln!(out, "  {key} = {}", params.variables[key].serialize(name_of, Escaper::Default))?;
    }
    writeln!(out)
}

fn write_local_actions(out: &mut impl fmt::Write, data: &ManifestData<'_>, actions: &LocalBuildActions) -> fmt::Result {
    for &id in &actions.variables {
        let variable = &data.variables[id.index()];
        let template = match variable {
            Variable::Local { template, .. } => template,
            _ => continue,
        };
        let name = var_label(data.pkg_labels, variable);
        let value = template.serialize(|vid| var_label(data.pkg_labels, &data.variables[vid.index()]), Escaper::Default);
        writeln!(out, "{name} = {value}")?;
        writeln!(out)?;
    }

    for &id in &actions.rules {
        write_local_rule(out, data, id)?;
    }

    for build in &actions.builds {
        write_build(out, data, build)?;
    }

    Ok(())
}

fn write_local_rule(out: &mut impl fmt::Write, data: &ManifestData<'_>, id: RuleId) -> fmt::Result {
    // Local rules share the same printable shape as global ones; they are
    // simply not present in `data.live_rules`, so render directly from the
    // rule arena.
    let rule = &data.rules[id.index()];
    let name = rule_label(data.pkg_labels, rule);
    let params = match rule {
        Rule::Static { params, .. } | Rule::Local { params, .. } => params.clone(),
        Rule::Config { .. } | Rule::Builtin => return Ok(()),
    };

    write_rule_params(out, data, &name, &params)
}

fn write_build(out: &mut impl fmt::Write, data: &ManifestData<'_>, build: &BuildDef) -> fmt::Result {
    let name_of = |vid: VarId| var_label(data.pkg_labels, &data.variables[vid.index()]);
    let rule_name = rule_label(data.pkg_labels, &data.rules[build.rule.index()]);

    let mut line = String::new();
    for (i, output) in build.outputs.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&output.serialize(name_of, Escaper::OutputPosition));
    }
    if !build.implicit_outputs.is_empty() {
        line.push_str(" | ");
        for (i, output) in build.implicit_outputs.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&output.serialize(name_of, Escaper::OutputPosition));
        }
    }
    write!(line, ": {rule_name}").unwrap();
    for input in &build.inputs {
        line.push(' ');
        line.push_str(&input.serialize(name_of, Escaper::InputPosition));
    }
    if !build.implicits.is_empty() {
        line.push_str(" |");
        for implicit in &build.implicits {
            line.push(' ');
            line.push_str(&implicit.serialize(name_of, Escaper::InputPosition));
        }
    }
    if !build.order_only.is_empty() {
        line.push_str(" ||");
        for order in &build.order_only {
            line.push(' ');
            line.push_str(&order.serialize(name_of, Escaper::InputPosition));
        }
    }
    writeln!(out, "build {line}")?;

    let mut args: Vec<&String> = build.args.keys().collect();
    args.sort();
    for key in &args {
        writeln!(out, "  {key} = {}", build.args[*key].serialize(name_of, Escaper::Default))?;
    }
    if !args.is_empty() {
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PkgId;
    use crate::value::ValueTemplate;

    fn sample() -> (HashMap<PkgId, String>, Vec<Variable>, Vec<Pool>, Vec<Rule>) {
        let mut labels = HashMap::new();
        labels.insert(PkgId(0), "foo".to_owned());
        let variables = vec![Variable::Static {
            pkg: PkgId(0),
            name: "cflags".to_owned(),
            raw_value: ValueTemplate::literal("-O2"),
        }];
        let rules = vec![Rule::Static {
            pkg: PkgId(0),
            name: "cc".to_owned(),
            params: RuleParams {
                command: Some(ValueTemplate::literal("cc -c $in -o $out")),
                ..Default::default()
            },
            arg_names: Vec::new(),
            scope: crate::ids::ScopeId(0),
        }];
        (labels, variables, Vec::new(), rules)
    }

    #[test]
    fn writes_required_version_and_header() {
        let (labels, variables, pools, rules) = sample();
        let live_variables = HashMap::new();
        let live_pools = HashMap::new();
        let live_rules = HashMap::new();
        let data = ManifestData {
            pkg_labels: &labels,
            variables: &variables,
            pools: &pools,
            rules: &rules,
            live_variables: &live_variables,
            live_pools: &live_pools,
            live_rules: &live_rules,
            builddir: None,
            required_version: DownstreamVersion { major: 1, minor: 2, micro: 0 },
            modules: &[],
            singletons: &[],
        };
        let mut out = String::new();
        write_manifest(&mut out, &data).unwrap();
        assert!(out.contains("ninja_required_version = 1.2.0"));
        assert!(out.starts_with("# generated file, do not edit"));
    }

    #[test]
    fn global_variable_emits_dependencies_before_dependents() {
        let (labels, variables, pools, _rules) = sample();
        let mut vars = variables;
        let rules: Vec<Rule> = Vec::new();
        vars.push(Variable::Static {
            pkg: PkgId(0),
            name: "ldflags".to_owned(),
            raw_value: crate::value::parse_template("$foo.cflags extra", |n: &str| {
                if n == "foo.cflags" { Ok(VarId(0)) } else { Err(format!("undefined {n}")) }
            })
            .unwrap(),
        });

        let mut live_variables = HashMap::new();
        live_variables.insert(VarId(0), match &vars[0] {
            Variable::Static { raw_value, .. } => raw_value.clone(),
            _ => unreachable!(),
        });
        live_variables.insert(VarId(1), match &vars[1] {
            Variable::Static { raw_value, .. } => raw_value.clone(),
            _ => unreachable!(),
        });
        let live_pools = HashMap::new();
        let live_rules = HashMap::new();

        let data = ManifestData {
            pkg_labels: &labels,
            variables: &vars,
            pools: &pools,
            rules: &rules,
            live_variables: &live_variables,
            live_pools: &live_pools,
            live_rules: &live_rules,
            builddir: None,
            required_version: DownstreamVersion { major: 1, minor: 0, micro: 0 },
            modules: &[],
            singletons: &[],
        };
        let mut out = String::new();
        write_manifest(&mut out, &data).unwrap();
        let cflags_pos = out.find("foo.cflags = -O2").unwrap();
        let ldflags_pos = out.find("foo.ldflags").unwrap();
        assert!(cflags_pos < ldflags_pos);
    }
}
