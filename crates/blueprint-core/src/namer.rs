// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Unique-Name Resolver (§4.7): assigns each live package a short label,
//! falling back to its full dotted name on collision.

use std::collections::HashMap;

use crate::ids::{PkgId, PoolId, RuleId, VarId};
use crate::scope::PackageRegistry;
use crate::variable::{Pool, Rule, Variable};

/// Computes the `pkg → label` map used for all name printing (§4.7), from
/// the set of packages that actually contribute a live variable, pool or
/// rule. The built-in (package-less) `phony` rule contributes nothing.
pub fn resolve_labels(
    registry: &PackageRegistry,
    variables: &[Variable],
    pools: &[Pool],
    rules: &[Rule],
    live_variables: impl IntoIterator<Item = VarId>,
    live_pools: impl IntoIterator<Item = PoolId>,
    live_rules: impl IntoIterator<Item = RuleId>,
) -> HashMap<PkgId, String> {
    let mut contributing: Vec<PkgId> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut note = |pkg: Option<PkgId>, contributing: &mut Vec<PkgId>| {
        if let Some(pkg) = pkg {
            if seen.insert(pkg) {
                contributing.push(pkg);
            }
        }
    };

    for id in live_variables {
        note(variables[id.index()].pkg(), &mut contributing);
    }
    for id in live_pools {
        note(Some(pools[id.index()].pkg()), &mut contributing);
    }
    for id in live_rules {
        note(rules[id.index()].pkg(), &mut contributing);
    }

    let mut result: HashMap<PkgId, String> = HashMap::new();
    let mut seen_short: HashMap<String, PkgId> = HashMap::new();
    let mut collided: std::collections::HashSet<PkgId> = std::collections::HashSet::new();

    for &pkg in &contributing {
        let short = registry.package(pkg).short_name.clone();
        match seen_short.get(&short) {
            None => {
                seen_short.insert(short.clone(), pkg);
                result.insert(pkg, short);
            }
            Some(&other) if other != pkg => {
                collided.insert(pkg);
                collided.insert(other);
            }
            _ => {}
        }
    }

    for pkg in collided {
        result.insert(pkg, registry.package(pkg).full_name.clone());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_shortnames_keep_shortname() {
        let mut reg = PackageRegistry::new();
        let a = reg.get_or_create("a/foo");
        let b = reg.get_or_create("b/bar");
        let variables = vec![
            Variable::Static {
                pkg: a,
                name: "x".to_owned(),
                raw_value: crate::value::ValueTemplate::literal(""),
            },
            Variable::Static {
                pkg: b,
                name: "y".to_owned(),
                raw_value: crate::value::ValueTemplate::literal(""),
            },
        ];
        let labels = resolve_labels(&reg, &variables, &[], &[], vec![VarId(0), VarId(1)], vec![], vec![]);
        assert_eq!(labels[&a], "foo");
        assert_eq!(labels[&b], "bar");
    }

    #[test]
    fn colliding_shortnames_fall_back_to_fullname() {
        let mut reg = PackageRegistry::new();
        let a = reg.get_or_create("a/foo");
        let b = reg.get_or_create("b/foo");
        let variables = vec![
            Variable::Static {
                pkg: a,
                name: "x".to_owned(),
                raw_value: crate::value::ValueTemplate::literal(""),
            },
            Variable::Static {
                pkg: b,
                name: "y".to_owned(),
                raw_value: crate::value::ValueTemplate::literal(""),
            },
        ];
        let labels = resolve_labels(&reg, &variables, &[], &[], vec![VarId(0), VarId(1)], vec![], vec![]);
        assert_eq!(labels[&a], "a.foo");
        assert_eq!(labels[&b], "b.foo");
    }
}
