// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Converts a parsed [`crate::parser::ast`] property tree into the
//! [`crate::property`] types the Binder consumes.
//!
//! The AST can't distinguish a plain nested record from a per-target
//! overlay map — both parse as `Value::Map` — so this module uses the
//! reserved field name `targets` (§4.4's built-in receiver names it
//! literally `Targets`) as the signal: a node named `targets` whose value
//! is a map-of-maps lowers to [`PropertyValue::Targets`], everything else
//! lowers structurally.

use std::collections::HashMap;

use crate::parser::ast;
use crate::property::{Property, PropertyValue};

/// Lowers one module block's (or nested record's) property list.
pub fn lower_properties(nodes: &[ast::PropertyNode]) -> Vec<Property> {
    nodes.iter().map(lower_node).collect()
}

fn lower_node(node: &ast::PropertyNode) -> Property {
    let value = if node.name == "targets" {
        match lower_targets(node) {
            Ok(map) => PropertyValue::Targets(map),
            Err(_) => PropertyValue::Nested(Vec::new()),
        }
    } else {
        match &node.value {
            ast::Value::Str(s) => PropertyValue::Str(s.clone()),
            ast::Value::Bool(b) => PropertyValue::Bool(*b),
            ast::Value::List(items) => PropertyValue::StrList(items.clone()),
            ast::Value::Map(children) => PropertyValue::Nested(lower_properties(children)),
        }
    };
    Property::new(node.name.clone(), node.position.clone(), value)
}

/// A malformed `targets` node (not a map-of-maps) is reported by the caller
/// as a type mismatch once the Binder sees the fallback empty nested value;
/// this just signals that fallback.
fn lower_targets(node: &ast::PropertyNode) -> Result<HashMap<String, Vec<Property>>, ()> {
    let ast::Value::Map(tags) = &node.value else {
        return Err(());
    };
    let mut out = HashMap::new();
    for tag in tags {
        let ast::Value::Map(props) = &tag.value else {
            return Err(());
        };
        out.insert(tag.name.clone(), lower_properties(props));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn node(name: &str, value: ast::Value) -> ast::PropertyNode {
        ast::PropertyNode {
            name: name.to_owned(),
            position: Position::synthetic(),
            value,
        }
    }

    #[test]
    fn lowers_scalar_kinds() {
        let nodes = vec![
            node("name", ast::Value::Str("A".to_owned())),
            node("enabled", ast::Value::Bool(true)),
            node("deps", ast::Value::List(vec!["B".to_owned()])),
        ];
        let props = lower_properties(&nodes);
        assert!(matches!(props[0].value, PropertyValue::Str(ref s) if s == "A"));
        assert!(matches!(props[1].value, PropertyValue::Bool(true)));
        assert!(matches!(props[2].value, PropertyValue::StrList(ref l) if l == &["B".to_owned()]));
    }

    #[test]
    fn lowers_targets_map_of_maps() {
        let inner = node("s", ast::Value::Str("_linux".to_owned()));
        let tag = node("linux", ast::Value::Map(vec![inner]));
        let targets = node("targets", ast::Value::Map(vec![tag]));

        let props = lower_properties(std::slice::from_ref(&targets));
        match &props[0].value {
            PropertyValue::Targets(map) => {
                assert_eq!(map["linux"].len(), 1);
                assert_eq!(map["linux"][0].name, "s");
            }
            other => panic!("unexpected value {other:?}"),
        }
    }
}
