// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Property Binder (§4.1): binds a tree of parsed (name, value) pairs onto
//! typed receivers with Set/Append/Prepend merge semantics and per-target
//! overlays.
//!
//! Per §9's design note (a), there is no reflection and no derive macro:
//! every receiver implements [`PropertySink`] by hand, the way the teacher
//! hand-writes `Deserialize` impls (`stone_recipe::Upstream`, `::Path`) when
//! the built-in derive can't express the needed semantics.

use std::collections::{HashMap, HashSet};

use crate::error::{Diagnostic, ErrorKind, ErrorSink, Position, programming_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Set,
    Append,
    Prepend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Str,
    StrList,
    Nested,
    Targets,
}

#[derive(Debug, Clone)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    StrList(Vec<String>),
    Nested(Vec<Property>),
    /// Per-target overlay map: tag → the overlay's own unbound properties
    /// (§3, §4.1's final paragraph).
    Targets(HashMap<String, Vec<Property>>),
}

impl PropertyValue {
    fn kind(&self) -> FieldKind {
        match self {
            PropertyValue::Bool(_) => FieldKind::Bool,
            PropertyValue::Str(_) => FieldKind::Str,
            PropertyValue::StrList(_) => FieldKind::StrList,
            PropertyValue::Nested(_) => FieldKind::Nested,
            PropertyValue::Targets(_) => FieldKind::Targets,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub position: Position,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, position: Position, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            position,
            value,
        }
    }
}

/// Implemented by hand for every typed receiver a module factory, singleton
/// factory, or the built-in `{ name, deps, targets }` record supplies.
///
/// `field_names` returns each field already mapped to its property name
/// (§4.1: "lower-case the first rune of the field name"); the hand-written
/// impl performs that translation once, at write time, rather than at
/// binding time.
pub trait PropertySink {
    fn field_names(&self) -> &'static [&'static str];

    /// The declared kind of `field`. Every name `field_names` returns must
    /// answer here; a missing or inconsistent answer is a caller bug.
    fn field_kind(&self, field: &str) -> Option<FieldKind>;

    fn set_bool(&mut self, field: &str, value: bool, mode: MergeMode);
    fn set_string(&mut self, field: &str, value: &str, mode: MergeMode);
    fn set_string_list(&mut self, field: &str, value: &[String], mode: MergeMode);

    /// The child sink to recurse into for a `Nested`-kind field.
    fn nested_mut(&mut self, field: &str) -> &mut dyn PropertySink;
}

/// Binds `props` onto `sinks` in order, in `mode`. Returns the raw value of
/// any field declared `Targets` and present in the input, for the caller to
/// hand to [`bind_target_overlay`] once it has picked a target tag.
pub fn bind(
    props: &[Property],
    sinks: &mut [&mut dyn PropertySink],
    mode: MergeMode,
    errors: &mut ErrorSink,
) -> Option<HashMap<String, Vec<Property>>> {
    for sink in sinks.iter() {
        for &field in sink.field_names() {
            if sink.field_kind(field).is_none() {
                programming_error(format!("receiver field {field:?} declares no valid kind"));
            }
        }
    }

    let mut first_seen: HashMap<&str, &Property> = HashMap::new();
    for prop in props {
        if let Some(prev) = first_seen.get(prop.name.as_str()) {
            if !errors.is_full() {
                errors.push(
                    Diagnostic::new(
                        ErrorKind::PropertyDuplicate,
                        prop.position.clone(),
                        format!("duplicate property {:?}", prop.name),
                    )
                    .with_related(prev.position.clone(), "previous definition here"),
                );
            }
            continue;
        }
        first_seen.insert(prop.name.as_str(), prop);
    }

    let mut matched: HashSet<&str> = HashSet::new();
    let mut targets_value = None;

    for sink in sinks.iter_mut() {
        for &field in sink.field_names() {
            let kind = sink.field_kind(field).expect("validated above");
            let Some(prop) = first_seen.get(field).copied() else {
                continue;
            };
            matched.insert(field);

            if prop.value.kind() != kind {
                if !errors.is_full() {
                    errors.push(Diagnostic::new(
                        ErrorKind::PropertyTypeMismatch,
                        prop.position.clone(),
                        format!("property {:?} expects {kind:?}, found {:?}", field, prop.value.kind()),
                    ));
                }
                continue;
            }

            match &prop.value {
                PropertyValue::Bool(b) => sink.set_bool(field, *b, mode),
                PropertyValue::Str(s) => sink.set_string(field, s, mode),
                PropertyValue::StrList(l) => sink.set_string_list(field, l, mode),
                PropertyValue::Nested(children) => {
                    let child = sink.nested_mut(field);
                    bind(children, &mut [child], mode, errors);
                }
                PropertyValue::Targets(map) => {
                    targets_value.get_or_insert_with(|| map.clone());
                }
            }
        }
    }

    let mut unknown: Vec<&Property> = first_seen
        .iter()
        .filter(|(name, _)| !matched.contains(*name))
        .map(|(_, prop)| *prop)
        .collect();
    unknown.sort_by(|a, b| a.name.cmp(&b.name));
    for prop in unknown {
        if errors.is_full() {
            break;
        }
        errors.push(Diagnostic::new(
            ErrorKind::PropertyUnknown,
            prop.position.clone(),
            format!("unknown property {:?}", prop.name),
        ));
    }

    targets_value
}

/// Applies a per-target overlay (§4.1's final paragraph): if `tag` is
/// present in `targets`, its properties are bound into `sinks` in
/// [`MergeMode::Append`] regardless of the mode used for the initial pass.
pub fn bind_target_overlay(
    targets: &HashMap<String, Vec<Property>>,
    tag: &str,
    sinks: &mut [&mut dyn PropertySink],
    errors: &mut ErrorSink,
) {
    if let Some(overlay) = targets.get(tag) {
        bind(overlay, sinks, MergeMode::Append, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct ModRecord {
        name: String,
        deps: Vec<String>,
    }

    impl PropertySink for ModRecord {
        fn field_names(&self) -> &'static [&'static str] {
            &["name", "deps"]
        }

        fn field_kind(&self, field: &str) -> Option<FieldKind> {
            match field {
                "name" => Some(FieldKind::Str),
                "deps" => Some(FieldKind::StrList),
                _ => None,
            }
        }

        fn set_bool(&mut self, field: &str, _value: bool, _mode: MergeMode) {
            programming_error(format!("{field} is not a bool field"))
        }

        fn set_string(&mut self, field: &str, value: &str, mode: MergeMode) {
            match (field, mode) {
                ("name", MergeMode::Set) => self.name = value.to_owned(),
                ("name", MergeMode::Append) => self.name.push_str(value),
                ("name", MergeMode::Prepend) => self.name = format!("{value}{}", self.name),
                _ => programming_error(format!("{field} is not a string field")),
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
                _ => programming_error(format!("{field} is not a string-list field")),
            }
        }

        fn nested_mut(&mut self, field: &str) -> &mut dyn PropertySink {
            programming_error(format!("{field} has no nested receiver"))
        }
    }

    fn pos() -> Position {
        Position::synthetic()
    }

    fn str_prop(name: &str, value: &str) -> Property {
        Property::new(name, pos(), PropertyValue::Str(value.to_owned()))
    }

    fn list_prop(name: &str, values: &[&str]) -> Property {
        Property::new(
            name,
            pos(),
            PropertyValue::StrList(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[test]
    fn binds_known_fields_in_set_mode() {
        let props = vec![str_prop("name", "A"), list_prop("deps", &["B", "C"])];
        let mut rec = ModRecord::default();
        let mut errors = ErrorSink::new();
        bind(&props, &mut [&mut rec], MergeMode::Set, &mut errors);

        assert!(errors.is_empty());
        assert_eq!(rec.name, "A");
        assert_eq!(rec.deps, vec!["B".to_owned(), "C".to_owned()]);
    }

    #[test]
    fn unknown_property_is_reported_once_binding_is_attempted() {
        let props = vec![str_prop("name", "A"), str_prop("bogus", "x")];
        let mut rec = ModRecord::default();
        let mut errors = ErrorSink::new();
        bind(&props, &mut [&mut rec], MergeMode::Set, &mut errors);

        assert_eq!(errors.as_slice().len(), 1);
        assert_eq!(errors.as_slice()[0].kind, ErrorKind::PropertyUnknown);
    }

    #[test]
    fn duplicate_property_yields_two_linked_errors() {
        let props = vec![str_prop("name", "A"), str_prop("name", "B")];
        let mut rec = ModRecord::default();
        let mut errors = ErrorSink::new();
        bind(&props, &mut [&mut rec], MergeMode::Set, &mut errors);

        assert_eq!(errors.as_slice().len(), 1);
        let diag = &errors.as_slice()[0];
        assert_eq!(diag.kind, ErrorKind::PropertyDuplicate);
        assert_eq!(diag.related.len(), 1);
        // First definition wins; the duplicate is not applied.
        assert_eq!(rec.name, "A");
    }

    #[test]
    fn type_mismatch_is_reported() {
        let props = vec![Property::new("name", pos(), PropertyValue::Bool(true))];
        let mut rec = ModRecord::default();
        let mut errors = ErrorSink::new();
        bind(&props, &mut [&mut rec], MergeMode::Set, &mut errors);

        assert_eq!(errors.as_slice().len(), 1);
        assert_eq!(errors.as_slice()[0].kind, ErrorKind::PropertyTypeMismatch);
    }

    #[test]
    fn append_and_prepend_merge_strings() {
        let mut rec = ModRecord {
            name: "base".to_owned(),
            deps: vec![],
        };
        let mut errors = ErrorSink::new();
        bind(&[str_prop("name", "_suffix")], &mut [&mut rec], MergeMode::Append, &mut errors);
        assert_eq!(rec.name, "base_suffix");

        bind(&[str_prop("name", "prefix_")], &mut [&mut rec], MergeMode::Prepend, &mut errors);
        assert_eq!(rec.name, "prefix_base_suffix");
        assert!(errors.is_empty());
    }

    #[test]
    fn target_overlay_appends_after_initial_set() {
        // Scenario (f): mod { name: "m", s: "base", targets: { linux: { s: "_linux" } } }
        let mut overlays = HashMap::new();
        overlays.insert("linux".to_owned(), vec![str_prop("name", "_linux")]);

        let mut rec = ModRecord::default();
        let mut errors = ErrorSink::new();
        bind(&[str_prop("name", "base")], &mut [&mut rec], MergeMode::Set, &mut errors);
        bind_target_overlay(&overlays, "linux", &mut [&mut rec], &mut errors);

        assert_eq!(rec.name, "base_linux");
        assert!(errors.is_empty());
    }

    #[test]
    fn error_cap_stops_accumulation_at_ten() {
        let props: Vec<Property> = (0..20).map(|i| str_prop(&format!("bogus{i}"), "x")).collect();
        let mut rec = ModRecord::default();
        let mut errors = ErrorSink::new();
        bind(&props, &mut [&mut rec], MergeMode::Set, &mut errors);
        assert_eq!(errors.as_slice().len(), ErrorSink::CAP);
    }
}
