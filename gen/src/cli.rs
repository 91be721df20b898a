// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::Write as _;
use std::path::PathBuf;

use blueprint_core::{Context, ErrorSink, GeneratorError};
use clap::{CommandFactory, Parser};
use clap_complete::{
    generate_to,
    shells::{Bash, Fish, Zsh},
};
use clap_mangen::Man;
use fs_err as fs;
use thiserror::Error;

use crate::config::GenConfig;
use crate::discover;
use crate::logging;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// Reads a tree of Blueprints files rooted at `root` and writes the
/// resulting build manifest (§1, §6).
#[derive(Debug, Parser)]
#[command(name = "gen", version)]
pub struct Command {
    /// Root directory containing the top-level `Blueprints` file.
    pub root: Option<PathBuf>,

    /// Destination for the generated manifest; stdout if omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// YAML file deserialized into the `Config` passed to `prepare_build_actions`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Treat unknown module types as a no-op instead of a registration error.
    #[arg(long)]
    pub tolerant: bool,

    #[arg(short, long)]
    pub verbose: bool,
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
    #[arg(long)]
    pub log_file: Option<String>,

    #[arg(long, hide = true)]
    pub generate_manpages: Option<PathBuf>,
    #[arg(long, hide = true)]
    pub generate_completions: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("reading Blueprints tree")]
    Discover(#[from] discover::Error),
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    #[error("{0}")]
    Generator(String, #[source] GeneratorError),
    #[error("io error")]
    Io(#[from] std::io::Error),
}

pub fn process() -> Result<(), Error> {
    let command = Command::parse();

    if let Some(dir) = &command.generate_manpages {
        fs::create_dir_all(dir)?;
        let cmd = Command::command();
        let man = Man::new(cmd);
        let mut buffer = fs::File::create(dir.join("gen.1"))?;
        man.render(&mut buffer)?;
        return Ok(());
    }

    if let Some(dir) = &command.generate_completions {
        fs::create_dir_all(dir)?;
        let mut cmd = Command::command();
        generate_to(Bash, &mut cmd, "gen", dir)?;
        generate_to(Fish, &mut cmd, "gen", dir)?;
        generate_to(Zsh, &mut cmd, "gen", dir)?;
        return Ok(());
    }

    let verbosity = if command.quiet {
        Verbosity::Quiet
    } else if command.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    logging::init(verbosity, command.log_format, command.log_file.clone());

    let root = command.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = GenConfig::load(command.config.as_deref())?;

    let mut ctx = Context::new();
    ctx.set_tolerant(command.tolerant);

    let mut errors = ErrorSink::new();
    let mut file_deps = Vec::new();
    discover::discover(&mut ctx, &root, &mut errors, &mut file_deps)?;
    if !errors.is_empty() {
        return Err(Error::Generator(
            format!("{} error(s) parsing Blueprints files", errors.as_slice().len()),
            GeneratorError::Parse(errors.into_vec()),
        ));
    }
    for dep in &file_deps {
        tracing::debug!(path = %dep, "bare directory dependency");
    }

    ctx.prepare_build_actions(&config)
        .map_err(|e| Error::Generator(e.to_string(), e))?;

    let mut manifest = String::new();
    ctx.write(&mut manifest)
        .map_err(|e| Error::Generator(e.to_string(), e))?;

    match &command.output {
        Some(path) => fs::write(path, manifest)?,
        None => std::io::stdout().write_all(manifest.as_bytes())?,
    }

    Ok(())
}
