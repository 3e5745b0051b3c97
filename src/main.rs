#![forbid(unsafe_code)]

//! rsw — Retention Sweeper CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    match cli_app::run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("rsw: {e}");
            std::process::exit(1);
        }
    }
}
