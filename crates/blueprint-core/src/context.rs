// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The central aggregate and phase driver (§3's `Context`, §4.4, §4.6):
//! Registration → Parse → Resolve → Generate → Write.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, NoConfig};
use crate::error::{Diagnostic, ErrorKind, ErrorSink, GeneratorError, Position};
use crate::ident;
use crate::ids::{ModuleId, PkgId, PoolId, RuleId, ScopeId, VarId};
use crate::live::LiveTracker;
use crate::manifest::{write_manifest, DownstreamVersion, ManifestData};
use crate::module::{
    BuildDef, CommonProperties, LocalBuildActions, Module, ModuleFactory, ModuleInfo, Singleton, SingletonFactory,
    SingletonInfo,
};
use crate::parser::ast;
use crate::property::{bind, bind_target_overlay, MergeMode, PropertySink};
use crate::scope::PackageRegistry;
use crate::value::{parse_template, ValueTemplate};
use crate::variable::{Pool, PoolParams, Rule, RuleParams, Variable};

/// `*` is permitted only as a whole final path component (§6).
fn is_valid_subdirs_pattern(entry: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    let components: Vec<&str> = entry.split('/').collect();
    components
        .iter()
        .enumerate()
        .all(|(i, c)| !c.contains('*') || (*c == "*" && i == components.len() - 1))
}

pub struct Context {
    registry: PackageRegistry,
    variables: Vec<Variable>,
    pools: Vec<Pool>,
    rules: Vec<Rule>,

    module_factories: HashMap<String, Box<dyn ModuleFactory>>,

    modules: Vec<ModuleInfo>,
    module_objects: Vec<Box<dyn Module>>,
    module_index: HashMap<String, ModuleId>,

    singletons: Vec<SingletonInfo>,
    singleton_objects: Vec<Box<dyn Singleton>>,

    /// §4.4: "fail UnknownModuleType unless the tolerant-mode flag is set".
    tolerant: bool,

    resolved: bool,
    build_actions_ready: bool,

    builddir: Option<ValueTemplate>,
    required_version: DownstreamVersion,

    pkg_labels: HashMap<PkgId, String>,
    live_variables: HashMap<VarId, ValueTemplate>,
    live_pools: HashMap<PoolId, PoolParams>,
    live_rules: HashMap<RuleId, RuleParams>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            registry: PackageRegistry::new(),
            variables: Vec::new(),
            pools: Vec::new(),
            rules: vec![Rule::Builtin],
            module_factories: HashMap::new(),
            modules: Vec::new(),
            module_objects: Vec::new(),
            module_index: HashMap::new(),
            singletons: Vec::new(),
            singleton_objects: Vec::new(),
            tolerant: false,
            resolved: false,
            build_actions_ready: false,
            builddir: None,
            required_version: DownstreamVersion { major: 1, minor: 0, micro: 0 },
            pkg_labels: HashMap::new(),
            live_variables: HashMap::new(),
            live_pools: HashMap::new(),
            live_rules: HashMap::new(),
        }
    }

    pub fn set_tolerant(&mut self, tolerant: bool) {
        self.tolerant = tolerant;
    }

    pub fn phony_rule(&self) -> RuleId {
        RuleId(0)
    }

    pub fn register_module_type(&mut self, name: impl Into<String>, factory: Box<dyn ModuleFactory>) {
        self.module_factories.insert(name.into(), factory);
    }

    /// Singletons have no properties of their own (§3), so unlike a module
    /// type a singleton type is instantiated immediately on registration.
    pub fn register_singleton_type(&mut self, name: impl Into<String>, factory: Box<dyn SingletonFactory>) {
        self.singletons.push(SingletonInfo {
            name: name.into(),
            actions: LocalBuildActions::default(),
        });
        self.singleton_objects.push(factory.new_singleton());
    }

    pub fn singletons(&self) -> &[SingletonInfo] {
        &self.singletons
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.module_index.get(name).copied()
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    // ---- Parse phase (§4.4, §6) ----------------------------------------

    /// Parses one Blueprints file belonging to package `pkg_path`. Returns
    /// the `subdirs` entries found at top level, for the file-driven driver
    /// (`gen`) to follow; diagnostics accumulate into `errors`.
    pub fn parse_file(&mut self, pkg_path: &str, file_name: impl Into<Arc<str>>, source: &str, errors: &mut ErrorSink) -> Vec<String> {
        let file_name = file_name.into();
        let file = match crate::parser::parse(file_name.clone(), source) {
            Ok(file) => file,
            Err(diag) => {
                errors.push(diag);
                return Vec::new();
            }
        };

        let pkg = self.registry.get_or_create(pkg_path);

        let mut subdirs = Vec::new();
        for assignment in &file.assignments {
            if errors.is_full() {
                break;
            }
            if assignment.name != "subdirs" {
                errors.push(Diagnostic::new(
                    ErrorKind::UnsupportedAssignment,
                    assignment.position.clone(),
                    format!("unsupported top-level assignment {:?}", assignment.name),
                ));
                continue;
            }
            let ast::Value::List(entries) = &assignment.value else {
                errors.push(Diagnostic::new(
                    ErrorKind::InvalidSubdirsPattern,
                    assignment.position.clone(),
                    "subdirs must be a list of string literals",
                ));
                continue;
            };
            for entry in entries {
                if !is_valid_subdirs_pattern(entry) {
                    errors.push(Diagnostic::new(
                        ErrorKind::InvalidSubdirsPattern,
                        assignment.position.clone(),
                        format!("invalid subdirs pattern {entry:?}"),
                    ));
                    continue;
                }
                subdirs.push(entry.clone());
            }
        }

        for block in &file.modules {
            if errors.is_full() {
                break;
            }
            self.register_module_block(pkg, &file_name, block, errors);
        }

        subdirs
    }

    fn register_module_block(&mut self, pkg: PkgId, file_name: &Arc<str>, block: &ast::ModuleBlock, errors: &mut ErrorSink) {
        let Some(factory) = self.module_factories.get(&block.type_name) else {
            if !self.tolerant {
                errors.push(Diagnostic::new(
                    ErrorKind::UnknownModuleType,
                    block.position.clone(),
                    format!("unknown module type {:?}", block.type_name),
                ));
            }
            return;
        };

        let (module, mut sinks) = factory.new_module();
        let props = crate::lower::lower_properties(&block.properties);

        let mut property_positions = HashMap::new();
        for p in &block.properties {
            property_positions.insert(p.name.clone(), p.position.clone());
        }

        let mut common = CommonProperties::default();
        let targets = {
            let mut sink_refs: Vec<&mut dyn PropertySink> = Vec::with_capacity(sinks.len() + 1);
            sink_refs.push(&mut common);
            for sink in sinks.iter_mut() {
                sink_refs.push(&mut **sink);
            }
            let targets = bind(&props, &mut sink_refs, MergeMode::Set, errors);
            let tag = module.target_tag(&NoConfig);
            if let Some(targets) = &targets {
                bind_target_overlay(targets, &tag, &mut sink_refs, errors);
            }
            targets
        };

        if ident::validate_module_name(&common.name).is_err() {
            errors.push(Diagnostic::new(
                ErrorKind::InvalidName,
                block.position.clone(),
                format!("invalid module name {:?}", common.name),
            ));
            return;
        }

        if let Some(&existing) = self.module_index.get(&common.name) {
            let existing_pos = self.modules[existing.index()].position.clone();
            errors.push(
                Diagnostic::new(
                    ErrorKind::DuplicateModule,
                    block.position.clone(),
                    format!("module {:?} already defined", common.name),
                )
                .with_related(existing_pos, "previous definition here"),
            );
            return;
        }

        let name = common.name.clone();
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleInfo {
            type_name: block.type_name.clone(),
            relative_source_path: file_name.to_string(),
            position: block.position.clone(),
            property_positions,
            name: name.clone(),
            declared_deps: common.deps,
            target_overlays: targets.unwrap_or_default(),
            direct_deps: Vec::new(),
            actions: LocalBuildActions::default(),
            file_deps: Vec::new(),
        });
        self.module_objects.push(module);
        self.module_index.insert(name, id);
        let _ = pkg;
    }

    // ---- Resolve phase (§4.4) -------------------------------------------

    pub fn resolve(&mut self, config: &dyn Config) -> Result<(), GeneratorError> {
        if self.resolved {
            return Ok(());
        }

        let mut errors = ErrorSink::new();
        let mut declared: Vec<Vec<String>> = Vec::with_capacity(self.modules.len());

        for (i, info) in self.modules.iter().enumerate() {
            let mut deps: Vec<String> = info.declared_deps.clone();
            deps.extend(self.module_objects[i].dynamic_dependencies(config));
            deps.sort();
            deps.dedup();
            declared.push(deps);
        }

        for (i, deps) in declared.into_iter().enumerate() {
            let position = self.modules[i]
                .property_positions
                .get("deps")
                .cloned()
                .unwrap_or_else(|| self.modules[i].position.clone());
            let mut direct = Vec::with_capacity(deps.len());
            for dep_name in deps {
                if errors.is_full() {
                    break;
                }
                if dep_name == self.modules[i].name {
                    errors.push(Diagnostic::new(ErrorKind::SelfDep, position.clone(), format!("module {dep_name:?} depends on itself")));
                    continue;
                }
                match self.module_index.get(&dep_name) {
                    Some(&dep_id) => direct.push(dep_id),
                    None => errors.push(Diagnostic::new(
                        ErrorKind::UnknownDep,
                        position.clone(),
                        format!("module {:?} depends on unknown module {dep_name:?}", self.modules[i].name),
                    )),
                }
            }
            self.modules[i].direct_deps = direct;
        }

        if !errors.is_empty() {
            return Err(GeneratorError::Resolve(errors.into_vec()));
        }

        self.check_module_cycles(&mut errors);
        if !errors.is_empty() {
            return Err(GeneratorError::Resolve(errors.into_vec()));
        }

        self.resolved = true;
        Ok(())
    }

    fn check_module_cycles(&self, errors: &mut ErrorSink) {
        let mut dag = digraph::Dag::<ModuleId, Position>::new();
        for (i, info) in self.modules.iter().enumerate() {
            let id = ModuleId(i as u32);
            dag.add_node_or_get_index(&id);
            for &dep in &info.direct_deps {
                let edge_pos = info.property_positions.get("deps").cloned().unwrap_or_else(|| info.position.clone());
                let from = dag.add_node_or_get_index(&id);
                let to = dag.add_node_or_get_index(&dep);
                dag.add_edge(from, to, edge_pos);
            }
        }

        for cycle in dag.find_cycles() {
            if errors.is_full() {
                break;
            }
            let start_name = &self.modules[cycle.start.index()].name;
            let mut diag = Diagnostic::new(
                ErrorKind::DependencyCycle,
                self.modules[cycle.start.index()].position.clone(),
                format!("dependency cycle detected starting at module {start_name:?}"),
            );
            for (from, to, pos) in &cycle.edges {
                let from_name = &self.modules[from.index()].name;
                let to_name = &self.modules[to.index()].name;
                diag = diag.with_related(pos.clone(), format!("{from_name:?} depends on {to_name:?}"));
            }
            errors.push(diag);
        }
    }

    // ---- Generate phase (§4.6) -------------------------------------------

    #[tracing::instrument(skip_all)]
    pub fn prepare_build_actions(&mut self, config: &dyn Config) -> Result<(), GeneratorError> {
        self.resolve(config)?;

        let mut errors = ErrorSink::new();
        let mut tracker = LiveTracker::new(&self.registry, &self.variables, &self.pools, &self.rules, config);
        self.builddir = None;
        self.required_version = DownstreamVersion { major: 1, minor: 0, micro: 0 };

        let order = self.module_post_order();
        for &id in &order {
            self.generate_module(id, config, &mut tracker, &mut errors);
            if errors.is_full() {
                break;
            }
        }

        let mut singleton_names: Vec<usize> = (0..self.singletons.len()).collect();
        singleton_names.sort_by_key(|&i| self.singletons[i].name.clone());
        for i in singleton_names {
            if errors.is_full() {
                break;
            }
            self.generate_singleton(i, &mut tracker, &mut errors);
        }

        if let Some(builddir) = self.builddir.clone() {
            tracker.add_ninja_string_list_deps(std::iter::once(&builddir));
        }

        let (live_variables, live_pools, live_rules) = {
            let labels = crate::namer::resolve_labels(
                &self.registry,
                &self.variables,
                &self.pools,
                &self.rules,
                tracker.live_variables().keys().copied().collect::<Vec<_>>(),
                tracker.live_pools().keys().copied().collect::<Vec<_>>(),
                tracker.live_rules().keys().copied().collect::<Vec<_>>(),
            );
            self.pkg_labels = labels;
            let cycles = tracker.variable_cycles();
            if !cycles.is_empty() {
                crate::error::programming_error(format!(
                    "variable-reference cycle detected starting at {:?}",
                    self.variables[cycles[0].start.index()].name()
                ));
            }
            tracker.into_live_sets()
        };

        if !errors.is_empty() {
            return Err(GeneratorError::Generate(errors.into_vec()));
        }

        self.live_variables = live_variables;
        self.live_pools = live_pools;
        self.live_rules = live_rules;
        self.build_actions_ready = true;
        Ok(())
    }

    /// Depth-first post-order over modules, each node's children visited in
    /// its pre-sorted `directDeps` order (§4.6 point 3).
    fn module_post_order(&self) -> Vec<ModuleId> {
        let mut visited = vec![false; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());

        for i in 0..self.modules.len() {
            self.visit_post_order(ModuleId(i as u32), &mut visited, &mut order);
        }
        order
    }

    fn visit_post_order(&self, id: ModuleId, visited: &mut [bool], order: &mut Vec<ModuleId>) {
        if visited[id.index()] {
            return;
        }
        visited[id.index()] = true;
        for &dep in &self.modules[id.index()].direct_deps {
            self.visit_post_order(dep, visited, order);
        }
        order.push(id);
    }

    fn generate_module(&mut self, id: ModuleId, config: &dyn Config, tracker: &mut LiveTracker<'_>, errors: &mut ErrorSink) {
        let name_prefix = format!("{}.", self.modules[id.index()].name);
        let scope = self.registry.new_scope(None);
        let mut mctx = ModuleContext {
            context_scope: scope,
            name_prefix,
            registry: &mut self.registry,
            variables: &mut self.variables,
            pools: &mut self.pools,
            rules: &mut self.rules,
            modules: &self.modules,
            config,
            local: LocalBuildActions::default(),
            file_deps: Vec::new(),
            errors,
            failed: false,
            module_id: id,
        };

        {
            let object = &mut self.module_objects[id.index()];
            object.generate_build_actions(&mut mctx);
        }

        let local = mctx.local;
        let file_deps = mctx.file_deps;
        self.modules[id.index()].file_deps = file_deps;
        self.harvest_locals(id, local, tracker);
    }

    fn generate_singleton(&mut self, index: usize, tracker: &mut LiveTracker<'_>, errors: &mut ErrorSink) {
        let scope = self.registry.new_scope(None);
        let name_prefix = format!("{}.", self.singletons[index].name);
        let mut sctx = SingletonContext {
            inner: ModuleContext {
                context_scope: scope,
                name_prefix,
                registry: &mut self.registry,
                variables: &mut self.variables,
                pools: &mut self.pools,
                rules: &mut self.rules,
                modules: &self.modules,
                config: &NoConfig,
                local: LocalBuildActions::default(),
                file_deps: Vec::new(),
                errors,
                failed: false,
                module_id: ModuleId(u32::MAX),
            },
            builddir: &mut self.builddir,
            required_version: &mut self.required_version,
        };

        {
            let object = &mut self.singleton_objects[index];
            object.generate_build_actions(&mut sctx);
        }

        self.singletons[index].actions = harvest(tracker, sctx.inner.local);
    }

    /// "Local-action harvesting" (§4.6): fold the module's build defs into
    /// the tracker first so globals they reference get pulled in, then keep
    /// only the locals the tracker actually reached, removing them from the
    /// tracker's global maps so they print in the module's own section.
    fn harvest_locals(&mut self, id: ModuleId, local: LocalBuildActions, tracker: &mut LiveTracker<'_>) {
        self.modules[id.index()].actions = harvest(tracker, local);
    }

    // ---- Write phase (§4.9) ----------------------------------------------

    pub fn write(&self, out: &mut impl std::fmt::Write) -> Result<(), GeneratorError> {
        if !self.build_actions_ready {
            return Err(GeneratorError::BuildActionsNotReady);
        }

        let data = ManifestData {
            pkg_labels: &self.pkg_labels,
            variables: &self.variables,
            pools: &self.pools,
            rules: &self.rules,
            live_variables: &self.live_variables,
            live_pools: &self.live_pools,
            live_rules: &self.live_rules,
            builddir: self.builddir.as_ref(),
            required_version: self.required_version,
            modules: &self.modules,
            singletons: &self.singletons,
        };

        write_manifest(out, &data).map_err(|e| GeneratorError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

/// Shared by module and singleton generation (§4.6's "local-action
/// harvesting"): folds `local`'s rules/variables/builds into `tracker` so
/// any globals they reference get pulled in, then keeps only the entries
/// the tracker actually reached, removing them from its global maps so they
/// print in the owner's own manifest section instead.
fn harvest(tracker: &mut LiveTracker<'_>, local: LocalBuildActions) -> LocalBuildActions {
    for &rule in &local.rules {
        tracker.add_rule(rule);
    }
    for build in &local.builds {
        tracker.add_build_def_deps(build);
    }
    for &var in &local.variables {
        tracker.add_variable(var);
    }

    let mut kept = LocalBuildActions::default();
    for &rule in &local.rules {
        if tracker.contains_rule(rule) {
            tracker.take_rule(rule);
            kept.rules.push(rule);
        }
    }
    for &var in &local.variables {
        if tracker.contains_variable(var) {
            tracker.take_variable(var);
            kept.variables.push(var);
        }
    }
    kept.builds = local.builds;
    kept
}

/// The capability surface §6 exposes to an external module's
/// `generate_build_actions` callback.
pub struct ModuleContext<'a> {
    context_scope: ScopeId,
    name_prefix: String,
    registry: &'a mut PackageRegistry,
    variables: &'a mut Vec<Variable>,
    pools: &'a mut Vec<Pool>,
    rules: &'a mut Vec<Rule>,
    modules: &'a [ModuleInfo],
    config: &'a dyn Config,
    local: LocalBuildActions,
    file_deps: Vec<String>,
    errors: &'a mut ErrorSink,
    failed: bool,
    module_id: ModuleId,
}

impl<'a> ModuleContext<'a> {
    pub fn config(&self) -> &dyn Config {
        self.config
    }

    pub fn module_name(&self) -> &str {
        if self.module_id.0 == u32::MAX {
            ""
        } else {
            &self.modules[self.module_id.index()].name
        }
    }

    pub fn contains_property(&self, name: &str) -> bool {
        if self.module_id.index() >= self.modules.len() {
            return false;
        }
        self.modules[self.module_id.index()].property_positions.contains_key(name)
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn other_module_name(&self, id: ModuleId) -> &str {
        &self.modules[id.index()].name
    }

    /// `reparentTo` (§4.6): switches the local scope's parent to `pkg`'s
    /// scope, supporting cross-package invocations.
    pub fn reparent_to(&mut self, pkg: PkgId) {
        let parent = self.registry.package(pkg).scope;
        self.registry.scope_mut(self.context_scope).parent = Some(parent);
    }

    pub fn errorf(&mut self, position: Position, message: impl Into<String>) {
        self.failed = true;
        if !self.errors.is_full() {
            self.errors.push(Diagnostic::new(ErrorKind::InvalidName, position, message));
        }
    }

    pub fn module_errorf(&mut self, message: impl Into<String>) {
        let position = if self.module_id.index() < self.modules.len() {
            self.modules[self.module_id.index()].position.clone()
        } else {
            Position::synthetic()
        };
        self.errorf(position, message);
    }

    pub fn property_errorf(&mut self, property: &str, message: impl Into<String>) {
        let position = if self.module_id.index() < self.modules.len() {
            self.modules[self.module_id.index()]
                .property_positions
                .get(property)
                .cloned()
                .unwrap_or_else(|| self.modules[self.module_id.index()].position.clone())
        } else {
            Position::synthetic()
        };
        self.errorf(position, message);
    }

    pub fn add_file_deps(&mut self, deps: impl IntoIterator<Item = String>) {
        self.file_deps.extend(deps);
    }

    pub fn file_deps(&self) -> &[String] {
        &self.file_deps
    }

    /// `VisitDepsDepthFirst` (§6): walks this module's transitive deps,
    /// depth-first, each visited once.
    pub fn visit_deps_depth_first(&self, mut visit: impl FnMut(ModuleId)) {
        self.visit_deps_depth_first_if(|_| true, &mut visit);
    }

    pub fn visit_deps_depth_first_if(&self, pred: impl Fn(ModuleId) -> bool, visit: &mut impl FnMut(ModuleId)) {
        if self.module_id.index() >= self.modules.len() {
            return;
        }
        let mut seen = vec![false; self.modules.len()];
        self.walk_deps(self.module_id, &pred, visit, &mut seen);
    }

    fn walk_deps(&self, id: ModuleId, pred: &impl Fn(ModuleId) -> bool, visit: &mut impl FnMut(ModuleId), seen: &mut [bool]) {
        for &dep in &self.modules[id.index()].direct_deps {
            if seen[dep.index()] {
                continue;
            }
            seen[dep.index()] = true;
            self.walk_deps(dep, pred, visit, seen);
            if pred(dep) {
                visit(dep);
            }
        }
    }

    /// `variable(pkg, name, value)` (§4.6): adds a local variable parsed
    /// against this module's local scope; duplicate names abort.
    pub fn variable(&mut self, name: &str, raw_value: &str) -> VarId {
        let scope = self.context_scope;
        let id = VarId(self.variables.len() as u32);
        let template = parse_template(raw_value, |n| self.registry.lookup_variable(scope, n))
            .unwrap_or_else(|e| crate::error::programming_error(format!("local variable {name:?}: {e}")));
        self.variables.push(Variable::Local {
            name_prefix: self.name_prefix.clone(),
            name: name.to_owned(),
            template,
        });
        self.registry.scope_mut(scope).add_variable(name, id);
        self.local.variables.push(id);
        id
    }

    /// `rule(pkg, name, params, argNames)` (§4.6): adds a local rule with its
    /// own arg-shadowing child scope.
    pub fn rule(&mut self, name: &str, params: RuleParams, arg_names: Vec<String>) -> RuleId {
        for arg in &arg_names {
            if ident::validate_arg_name(arg).is_err() {
                crate::error::programming_error(format!("invalid rule arg name {arg:?}"));
            }
        }
        let rule_scope = self.registry.new_scope(Some(self.context_scope));
        for arg in ident::BUILTIN_ARGS.into_iter().chain(arg_names.iter().map(String::as_str)) {
            let arg_id = VarId(self.variables.len() as u32);
            self.variables.push(Variable::Arg { name: arg.to_owned() });
            self.registry.scope_mut(rule_scope).add_variable(arg, arg_id);
        }

        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule::Local {
            name_prefix: self.name_prefix.clone(),
            name: name.to_owned(),
            params,
            arg_names,
            scope: rule_scope,
        });
        self.local.rules.push(id);
        id
    }

    /// `build(pkg, params)` (§4.6): parses each template field under the
    /// local scope and appends a `BuildDef`.
    pub fn build(&mut self, def: BuildDef) {
        self.local.builds.push(def);
    }

    pub fn local_scope(&self) -> ScopeId {
        self.context_scope
    }
}

/// Adds the singleton-only capabilities on top of [`ModuleContext`] (§6).
pub struct SingletonContext<'a> {
    inner: ModuleContext<'a>,
    builddir: &'a mut Option<ValueTemplate>,
    required_version: &'a mut DownstreamVersion,
}

impl<'a> std::ops::Deref for SingletonContext<'a> {
    type Target = ModuleContext<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a> std::ops::DerefMut for SingletonContext<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<'a> SingletonContext<'a> {
    pub fn visit_all_modules(&self, mut visit: impl FnMut(ModuleId)) {
        self.visit_all_modules_if(|_| true, &mut visit);
    }

    pub fn visit_all_modules_if(&self, pred: impl Fn(ModuleId) -> bool, visit: &mut impl FnMut(ModuleId)) {
        for i in 0..self.inner.modules.len() {
            let id = ModuleId(i as u32);
            if pred(id) {
                visit(id);
            }
        }
    }

    pub fn blueprint_file(&self, id: ModuleId) -> &str {
        &self.inner.modules[id.index()].relative_source_path
    }

    /// `requireVersion` (§4.9): major mismatch is fatal; otherwise the
    /// stored (minor, micro) is monotonically bumped.
    pub fn require_downstream_version(&mut self, major: u32, minor: u32, micro: u32) {
        if self.required_version.major != major {
            crate::error::programming_error(format!(
                "downstream requires major version {major}, context is fixed at {}",
                self.required_version.major
            ));
        }
        if (minor, micro) > (self.required_version.minor, self.required_version.micro) {
            self.required_version.minor = minor;
            self.required_version.micro = micro;
        }
    }

    pub fn set_build_dir(&mut self, raw_value: &str) {
        let scope = self.inner.context_scope;
        let template = parse_template(raw_value, |n| self.inner.registry.lookup_variable(scope, n))
            .unwrap_or_else(|e| crate::error::programming_error(format!("builddir: {e}")));
        *self.builddir = Some(template);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{host_target_tag, ModuleFactory};
    use crate::property::FieldKind;

    struct EchoModule;

    impl Module for EchoModule {
        fn generate_build_actions(&mut self, mctx: &mut ModuleContext<'_>) {
            let var = mctx.variable("greeting", "hello");
            let rule = mctx.rule(
                "echo",
                RuleParams {
                    command: Some(ValueTemplate::literal("echo $out")),
                    ..Default::default()
                },
                Vec::new(),
            );
            let mut def = BuildDef::new(rule);
            def.outputs.push(ValueTemplate::literal("out.txt"));
            mctx.build(def);
            let _ = var;
        }
    }

    struct EchoFactory;

    impl ModuleFactory for EchoFactory {
        fn new_module(&self) -> (Box<dyn Module>, Vec<Box<dyn PropertySink>>) {
            (Box::new(EchoModule), Vec::new())
        }
    }

    fn src(name: &str) -> &str {
        name
    }

    #[test]
    fn parse_registers_module_with_common_properties() {
        let mut ctx = Context::new();
        ctx.register_module_type("echo_module", Box::new(EchoFactory));
        let mut errors = ErrorSink::new();
        let subdirs = ctx.parse_file("root", src("root/Blueprints"), "echo_module { name: \"A\" }", &mut errors);
        assert!(errors.is_empty());
        assert!(subdirs.is_empty());
        assert!(ctx.module_id("A").is_some());
    }

    #[test]
    fn duplicate_module_name_is_reported() {
        let mut ctx = Context::new();
        ctx.register_module_type("echo_module", Box::new(EchoFactory));
        let mut errors = ErrorSink::new();
        ctx.parse_file("root", src("root/Blueprints"), "echo_module { name: \"A\" }", &mut errors);
        ctx.parse_file("root", src("root/Blueprints"), "echo_module { name: \"A\" }", &mut errors);
        assert_eq!(errors.as_slice().len(), 1);
        assert_eq!(errors.as_slice()[0].kind, ErrorKind::DuplicateModule);
    }

    #[test]
    fn unknown_dep_is_reported_on_resolve() {
        let mut ctx = Context::new();
        ctx.register_module_type("echo_module", Box::new(EchoFactory));
        let mut errors = ErrorSink::new();
        ctx.parse_file(
            "root",
            src("root/Blueprints"),
            "echo_module {\n  name: \"A\",\n  deps: [\"Missing\"]\n}",
            &mut errors,
        );
        assert!(errors.is_empty());

        let block_position = ctx.modules[ctx.module_id("A").unwrap().index()].position.clone();
        let deps_position = ctx.modules[ctx.module_id("A").unwrap().index()]
            .property_positions
            .get("deps")
            .cloned()
            .unwrap();
        assert_ne!(block_position, deps_position, "deps property must have its own position");

        let err = ctx.resolve(&NoConfig).unwrap_err();
        let diags = err.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnknownDep);
        assert_eq!(diags[0].message, "module \"A\" depends on unknown module \"Missing\"");
        assert_eq!(diags[0].position, deps_position);
    }

    #[test]
    fn self_dep_is_reported_at_deps_property_position() {
        let mut ctx = Context::new();
        ctx.register_module_type("echo_module", Box::new(EchoFactory));
        let mut errors = ErrorSink::new();
        ctx.parse_file(
            "root",
            src("root/Blueprints"),
            "echo_module {\n  name: \"A\",\n  deps: [\"A\"]\n}",
            &mut errors,
        );
        assert!(errors.is_empty());

        let deps_position = ctx.modules[ctx.module_id("A").unwrap().index()]
            .property_positions
            .get("deps")
            .cloned()
            .unwrap();

        let err = ctx.resolve(&NoConfig).unwrap_err();
        let diags = err.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::SelfDep);
        assert_eq!(diags[0].position, deps_position);
    }

    #[test]
    fn prepare_build_actions_harvests_locals_and_is_writable() {
        let mut ctx = Context::new();
        ctx.register_module_type("echo_module", Box::new(EchoFactory));
        let mut errors = ErrorSink::new();
        ctx.parse_file("root", src("root/Blueprints"), "echo_module { name: \"A\" }", &mut errors);
        assert!(errors.is_empty());

        ctx.prepare_build_actions(&NoConfig).unwrap();
        assert!(ctx.build_actions_ready);

        let mut out = String::new();
        ctx.write(&mut out).unwrap();
        assert!(out.contains("build out.txt:"));
        assert!(out.contains("rule A.echo"));
    }

    #[test]
    fn write_before_prepare_is_rejected() {
        let ctx = Context::new();
        let mut out = String::new();
        let err = ctx.write(&mut out).unwrap_err();
        assert!(matches!(err, GeneratorError::BuildActionsNotReady));
    }

    #[test]
    fn default_target_tag_is_host_os() {
        assert_eq!(EchoModuleTag.target_tag(&NoConfig), host_target_tag());
    }

    struct EchoModuleTag;
    impl Module for EchoModuleTag {
        fn generate_build_actions(&mut self, _mctx: &mut ModuleContext<'_>) {}
    }

    #[test]
    fn field_kind_sanity_for_common_properties() {
        let common = CommonProperties::default();
        assert_eq!(common.field_kind("name"), Some(FieldKind::Str));
    }
}
