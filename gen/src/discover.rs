// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! File-system-driven Parse phase (§6): reads the root `Blueprints` file,
//! follows each returned `subdirs` entry, and expands a single trailing `*`
//! wildcard directory component into every child directory present on disk.
//! A wildcard child with no `Blueprints` file is recorded as a bare
//! directory dependency instead of being traversed (§6).

use std::path::{Path, PathBuf};

use blueprint_core::{Context, ErrorSink};
use fs_err as fs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reading {0}")]
    Read(PathBuf, #[source] std::io::Error),
}

/// Parses every `Blueprints` file reachable from `root`, registering each
/// against `ctx`. `file_deps` collects the bare directory paths of wildcard
/// children that carry no `Blueprints` file, for change detection.
pub fn discover(ctx: &mut Context, root: &Path, errors: &mut ErrorSink, file_deps: &mut Vec<String>) -> Result<(), Error> {
    let mut queue = vec![(String::new(), root.to_path_buf())];

    while let Some((pkg_path, dir)) = queue.pop() {
        if errors.is_full() {
            break;
        }

        let file = dir.join("Blueprints");
        if !file.is_file() {
            continue;
        }

        let source = fs::read_to_string(&file).map_err(|e| Error::Read(file.clone(), e))?;
        let subdirs = ctx.parse_file(&pkg_path, file.to_string_lossy().into_owned(), &source, errors);

        for entry in subdirs {
            queue_entry(&pkg_path, &dir, &entry, &mut queue, file_deps);
        }
    }

    Ok(())
}

fn queue_entry(pkg_path: &str, dir: &Path, entry: &str, queue: &mut Vec<(String, PathBuf)>, file_deps: &mut Vec<String>) {
    let Some(parent) = entry.strip_suffix('*').map(|p| p.trim_end_matches('/')) else {
        queue.push((join_pkg(pkg_path, entry), dir.join(entry)));
        return;
    };

    let base = if parent.is_empty() { dir.to_path_buf() } else { dir.join(parent) };
    let Ok(read_dir) = fs::read_dir(&base) else {
        return;
    };

    let mut children: Vec<String> = read_dir
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    children.sort();

    for name in children {
        let child_entry = if parent.is_empty() { name.clone() } else { format!("{parent}/{name}") };
        let child_dir = base.join(&name);
        if child_dir.join("Blueprints").is_file() {
            queue.push((join_pkg(pkg_path, &child_entry), child_dir));
        } else {
            file_deps.push(child_dir.to_string_lossy().into_owned());
        }
    }
}

fn join_pkg(pkg_path: &str, entry: &str) -> String {
    if pkg_path.is_empty() {
        entry.to_owned()
    } else {
        format!("{pkg_path}/{entry}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_core::module::{Module, ModuleFactory};
    use blueprint_core::property::PropertySink;

    struct NoopModule;
    impl Module for NoopModule {
        fn generate_build_actions(&mut self, _mctx: &mut blueprint_core::context::ModuleContext<'_>) {}
    }
    struct NoopFactory;
    impl ModuleFactory for NoopFactory {
        fn new_module(&self) -> (Box<dyn Module>, Vec<Box<dyn PropertySink>>) {
            (Box::new(NoopModule), Vec::new())
        }
    }

    #[test]
    fn discovers_nested_blueprints_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("Blueprints"), "subdirs = [\"pkgs/*\"]\n").unwrap();
        fs::create_dir_all(root.join("pkgs/a")).unwrap();
        fs::write(root.join("pkgs/a/Blueprints"), "noop_module { name: \"A\" }\n").unwrap();

        let mut ctx = Context::new();
        ctx.register_module_type("noop_module", Box::new(NoopFactory));
        let mut errors = ErrorSink::new();
        let mut file_deps = Vec::new();
        discover(&mut ctx, root, &mut errors, &mut file_deps).unwrap();

        assert!(errors.is_empty());
        assert!(ctx.module_id("A").is_some());
        assert!(file_deps.is_empty());
    }

    #[test]
    fn wildcard_child_without_blueprints_is_recorded_as_file_dep() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("Blueprints"), "subdirs = [\"pkgs/*\"]\n").unwrap();
        fs::create_dir_all(root.join("pkgs/data")).unwrap();

        let mut ctx = Context::new();
        ctx.register_module_type("noop_module", Box::new(NoopFactory));
        let mut errors = ErrorSink::new();
        let mut file_deps = Vec::new();
        discover(&mut ctx, root, &mut errors, &mut file_deps).unwrap();

        assert!(errors.is_empty());
        assert_eq!(file_deps.len(), 1);
        assert!(file_deps[0].ends_with("pkgs/data") || file_deps[0].ends_with("pkgs\\data"));
    }
}
