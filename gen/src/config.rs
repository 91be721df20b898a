// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The concrete [`blueprint_core::Config`] this binary loads and hands to
//! `prepare_build_actions` (§3.2): an arbitrary YAML document, kept as a map
//! so config-driven module types can pull whatever named values they need
//! out of it via [`GenConfig::get`].

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;

use fs_err as fs;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct GenConfig {
    #[serde(flatten)]
    values: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reading {0}")]
    Read(String, #[source] std::io::Error),
    #[error("parsing {0}")]
    Parse(String, #[source] serde_yaml::Error),
}

impl GenConfig {
    /// `None` loads an empty config (§3.2: "or an empty default if none is
    /// given").
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|e| Error::Read(path.display().to_string(), e))?;
        serde_yaml::from_str(&text).map_err(|e| Error::Parse(path.display().to_string(), e))
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.values.get(key)
    }
}

impl blueprint_core::Config for GenConfig {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_empty_config() {
        let config = GenConfig::load(None).unwrap();
        assert!(config.get("anything").is_none());
    }
}
