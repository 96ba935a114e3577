// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! I/O utilities.

use std::fs;
use std::fs::File;
use std::io;
use std::io::Read as _;
use std::io::Write;
use std::path::Path;

/// Like `?`, but crashes the binary with a nice error message.
macro_rules! check {
    ($result:expr, $fmt:literal $(, $args:expr)* $(,)?) => {
        match $result {
            Ok(x) => x,
            Err(e) => {
                eprintln!("error: {}: {:?}", format_args!($fmt, $($args,)*), e);
                std::process::exit(2)
            }
        }
    }
}

/// Reads the whole input file, or stdin if there is none.
pub fn read_input(input_file: Option<impl AsRef<Path>>) -> Vec<u8> {
    match input_file {
        Some(path) => check!(fs::read(path), "failed to read input file"),
        None => {
            let mut buf = Vec::new();
            check!(io::stdin().read_to_end(&mut buf), "failed to read stdin");
            buf
        }
    }
}

/// Opens the output file, or stdout if there is none.
pub fn output(output_file: Option<impl AsRef<Path>>) -> Box<dyn Write> {
    match output_file {
        Some(path) => {
            Box::new(check!(File::create(path), "failed to open output file"))
        }
        None => Box::new(io::stdout()),
    }
}

/// Writes `value` as JSON, followed by a newline.
pub fn write_json(
    mut w: impl Write,
    value: &impl serde::Serialize,
    pretty: bool,
) {
    let r = match pretty {
        true => serde_json::to_writer_pretty(&mut w, value),
        false => serde_json::to_writer(&mut w, value),
    };
    check!(r, "failed to serialize output");
    check!(writeln!(w), "failed to write output");
}
