// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Module records and the capability traits external module types
//! implement (§3, §4.4, §6).

use std::collections::HashMap;

use crate::config::Config;
use crate::error::Position;
use crate::ids::{ModuleId, RuleId, VarId};
use crate::property::{Property, PropertySink, PropertyValue, FieldKind, MergeMode};
use crate::value::ValueTemplate;

/// `{ outputs, implicitOutputs, inputs, implicits, orderOnly, args }` (§3).
#[derive(Debug, Clone)]
pub struct BuildDef {
    pub rule: RuleId,
    pub outputs: Vec<ValueTemplate>,
    pub implicit_outputs: Vec<ValueTemplate>,
    pub inputs: Vec<ValueTemplate>,
    pub implicits: Vec<ValueTemplate>,
    pub order_only: Vec<ValueTemplate>,
    pub args: HashMap<String, ValueTemplate>,
}

impl BuildDef {
    pub fn new(rule: RuleId) -> Self {
        Self {
            rule,
            outputs: Vec::new(),
            implicit_outputs: Vec::new(),
            inputs: Vec::new(),
            implicits: Vec::new(),
            order_only: Vec::new(),
            args: HashMap::new(),
        }
    }

    /// All templates this build statement references, for the live-set
    /// tracker to walk (§4.5's `addBuildDefDeps`).
    pub fn templates(&self) -> impl Iterator<Item = &ValueTemplate> {
        self.outputs
            .iter()
            .chain(&self.implicit_outputs)
            .chain(&self.inputs)
            .chain(&self.implicits)
            .chain(&self.order_only)
            .chain(self.args.values())
    }
}

/// `{ variables, rules, builds }`, each in insertion order (§3, §4.9).
#[derive(Debug, Clone, Default)]
pub struct LocalBuildActions {
    pub variables: Vec<VarId>,
    pub rules: Vec<RuleId>,
    pub builds: Vec<BuildDef>,
}

/// `{ typeName, relativeSourcePath, position, propertyPositions, properties
/// { name, deps, perTargetOverlays }, directDeps, actions }` (§3).
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub type_name: String,
    pub relative_source_path: String,
    pub position: Position,
    pub property_positions: HashMap<String, Position>,
    pub name: String,
    pub declared_deps: Vec<String>,
    pub target_overlays: HashMap<String, Vec<Property>>,
    pub direct_deps: Vec<ModuleId>,
    pub actions: LocalBuildActions,
    pub file_deps: Vec<String>,
}

/// `{ factory, instance, actions }` (§3). Singletons are visited in
/// name-sorted order, never participate in the dependency graph.
pub struct SingletonInfo {
    pub name: String,
    pub actions: LocalBuildActions,
}

/// Host OS tag used by the default [`Module::target_tag`] implementation
/// (§4.4: "otherwise use a default selector that returns the host OS").
pub fn host_target_tag() -> String {
    std::env::consts::OS.to_owned()
}

/// The callback surface every registered module type implements.
///
/// `dynamic_dependencies` and `target_tag` model the *DynamicDependencies*
/// and *TargetSelector* capabilities from §4.4/§6: Go's Blueprint expresses
/// these as optional interface type-assertions, which Rust has no
/// equivalent for without a capability registry. Default method bodies
/// (no extra deps, host-OS tag) stand in for "capability absent", matching
/// the behavior §4.4 specifies for that case exactly.
pub trait Module {
    fn generate_build_actions(&mut self, mctx: &mut crate::context::ModuleContext<'_>);

    fn dynamic_dependencies(&self, _config: &dyn Config) -> Vec<String> {
        Vec::new()
    }

    fn target_tag(&self, _config: &dyn Config) -> String {
        host_target_tag()
    }
}

/// Registered once per module type name; produces a fresh module instance
/// and its list of typed property receivers for each Blueprints block of
/// that type (§3, §4.4, §6).
pub trait ModuleFactory {
    fn new_module(&self) -> (Box<dyn Module>, Vec<Box<dyn PropertySink>>);
}

/// The built-in receiver every module block gets in addition to its own
/// type-specific receivers (§4.4): `{ Name: string, Deps: [string], Targets:
/// mapping tag → list of properties }`.
#[derive(Debug, Default)]
pub struct CommonProperties {
    pub name: String,
    pub deps: Vec<String>,
}

impl PropertySink for CommonProperties {
    fn field_names(&self) -> &'static [&'static str] {
        &["name", "deps", "targets"]
    }

    fn field_kind(&self, field: &str) -> Option<FieldKind> {
        match field {
            "name" => Some(FieldKind::Str),
            "deps" => Some(FieldKind::StrList),
            "targets" => Some(FieldKind::Targets),
            _ => None,
        }
    }

    fn set_bool(&mut self, field: &str, _value: bool, _mode: MergeMode) {
        crate::error::programming_error(format!("{field} is not a bool field on CommonProperties"))
    }

    fn set_string(&mut self, field: &str, value: &str, mode: MergeMode) {
        match (field, mode) {
            ("name", MergeMode::Set) => self.name = value.to_owned(),
            ("name", MergeMode::Append) => self.name.push_str(value),
            ("name", MergeMode::Prepend) => self.name = format!("{value}{}", self.name),
            _ => crate::error::programming_error(format!("{field} is not a string field on CommonProperties")),
        }
    }

    fn set_string_list(&mut self, field: &str, value: &[String], mode: MergeMode) {
        match (field, mode) {
            ("deps", MergeMode::Set) => self.deps = value.to_vec(),
            ("deps", MergeMode::Append) => self.deps.extend_from_slice(value),
            ("deps", MergeMode::Prepend) => {
                let mut merged = value.to_vec();
                merged.extend(std::mem::take(&mut self.deps));
                self.deps = merged;
            }
            _ => crate::error::programming_error(format!("{field} is not a string-list field on CommonProperties")),
        }
    }

    fn nested_mut(&mut self, field: &str) -> &mut dyn PropertySink {
        crate::error::programming_error(format!("{field} has no nested receiver on CommonProperties"))
    }
}

/// Extracts a node's `PropertyValue::Targets` payload if it names the
/// reserved `targets` field, otherwise `None`. Used by the Parse phase once
/// property lowering (`crate::lower`) has produced the full property list.
pub fn extract_targets(props: &[Property]) -> Option<HashMap<String, Vec<Property>>> {
    props.iter().find_map(|p| match &p.value {
        PropertyValue::Targets(map) if p.name == "targets" => Some(map.clone()),
        _ => None,
    })
}

/// The additional callback surface a registered singleton type implements
/// (§4.6, §6). Has no dependencies and no properties of its own.
pub trait Singleton {
    fn generate_build_actions(&mut self, sctx: &mut crate::context::SingletonContext<'_>);
}

pub trait SingletonFactory {
    fn new_singleton(&self) -> Box<dyn Singleton>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_def_templates_covers_every_slot() {
        let mut def = BuildDef::new(RuleId(0));
        def.outputs.push(ValueTemplate::literal("out"));
        def.implicit_outputs.push(ValueTemplate::literal("impl_out"));
        def.inputs.push(ValueTemplate::literal("in"));
        def.implicits.push(ValueTemplate::literal("impl_in"));
        def.order_only.push(ValueTemplate::literal("order"));
        def.args.insert("flag".to_owned(), ValueTemplate::literal("x"));
        assert_eq!(def.templates().count(), 6);
    }

    #[test]
    fn common_properties_bind_name_and_deps() {
        use crate::error::ErrorSink;

        let props = vec![
            Property::new("name", Position::synthetic(), PropertyValue::Str("A".to_owned())),
            Property::new(
                "deps",
                Position::synthetic(),
                PropertyValue::StrList(vec!["B".to_owned()]),
            ),
        ];
        let mut rec = CommonProperties::default();
        let mut errors = ErrorSink::new();
        crate::property::bind(&props, &mut [&mut rec], MergeMode::Set, &mut errors);
        assert!(errors.is_empty());
        assert_eq!(rec.name, "A");
        assert_eq!(rec.deps, vec!["B".to_owned()]);
    }
}
