// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The user-supplied configuration object threaded through one
//! `prepare_build_actions` call (§3.2). Config-driven variables, pools and
//! rules receive it as `&dyn Config`; concrete applications downcast via
//! [`Config::as_any`] the way the teacher's `config::Config` trait is
//! implemented per-domain rather than generically.

use std::any::Any;
use std::fmt;

pub trait Config: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Stand-in config for tests and singleton-only generators that evaluate no
/// config-driven entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfig;

impl Config for NoConfig {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
