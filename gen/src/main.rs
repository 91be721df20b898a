// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::error::Error as _;

use tracing::error;

mod cli;
mod config;
mod discover;
mod logging;

fn main() {
    if let Err(error) = cli::process() {
        report_error(error);
        std::process::exit(1);
    }
}

fn report_error(error: cli::Error) {
    let chain = std::iter::successors(Some(&error as &dyn std::error::Error), |e| e.source())
        .map(std::string::ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    error!(%chain, "gen failed");
    eprintln!("error: {chain}");

    if let cli::Error::Generator(_, inner) = &error {
        for diagnostic in inner.diagnostics() {
            eprintln!("{diagnostic}");
        }
    }
}
