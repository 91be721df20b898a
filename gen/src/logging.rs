// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Wires `tracing_common`'s subscriber registry (§3.3) from this binary's CLI
//! flags.

use tracing::level_filters::LevelFilter;
use tracing_common::{OutputDestination, OutputFormat};

use crate::cli::{LogFormat, Verbosity};

pub fn init(verbosity: Verbosity, format: LogFormat, log_file: Option<String>) {
    let level = match verbosity {
        Verbosity::Quiet => LevelFilter::WARN,
        Verbosity::Normal => LevelFilter::INFO,
        Verbosity::Verbose => LevelFilter::DEBUG,
    };
    let format = match format {
        LogFormat::Text => OutputFormat::Text,
        LogFormat::Json => OutputFormat::Json,
    };
    let destination = match log_file {
        Some(path) => OutputDestination::File(path),
        None => OutputDestination::Stderr,
    };
    tracing_common::init(format, level, destination);
}
