//! CLI binary for `pm`.
//!
//! This binary is a thin wrapper that parses arguments, reads stdin when the
//! command needs it, and delegates to the library.

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use pm::cli::{run, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Only read stdin for commands that need it (avoids blocking on terminal)
    let stdin = if cli.command.needs_stdin() { read_stdin() } else { String::new() };

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error reading current directory: {e}");
            return ExitCode::from(1);
        }
    };

    let output = run(cli, &stdin, &cwd);

    for msg in output.stdout {
        println!("{msg}");
    }
    for msg in output.stderr {
        eprintln!("{msg}");
    }

    output.exit_code
}

fn read_stdin() -> String {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("Error reading stdin: {e}");
    }
    input
}
