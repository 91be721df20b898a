// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Arena-index handles. Every long-lived entity (package, scope, variable,
//! pool, rule, module, singleton) is referenced by a small `Copy` id rather
//! than a pointer, the way `petgraph::NodeIndex` already does in the
//! teacher's `dag` crate — this sidesteps the original's reflection-based,
//! pointer-heavy object graph (§9 design notes) without fighting the borrow
//! checker.

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(PkgId);
arena_id!(ScopeId);
arena_id!(VarId);
arena_id!(PoolId);
arena_id!(RuleId);
arena_id!(ModuleId);
arena_id!(SingletonId);
