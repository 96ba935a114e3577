// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `pfr-update-tool` is a simple command-line tool for inspecting PFR update
//! capsules and applying them to emulated flash.

#![deny(missing_docs)]
#![deny(warnings)]
#![deny(unused)]
#![deny(unsafe_code)]

use structopt::StructOpt as _;

#[macro_use]
mod util;

mod capsule;
mod update;

/// A command-line tool for working with PFR update capsules.
#[allow(missing_docs)]
#[derive(structopt::StructOpt)]
#[structopt(author)]
enum CliCommand {
    #[structopt(flatten)]
    Capsule(capsule::Capsule),
    #[structopt(flatten)]
    Update(update::Update),
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .init();

    match CliCommand::from_args() {
        CliCommand::Capsule(c) => c.run(),
        CliCommand::Update(u) => u.run(),
    }
}
