//! simtest CLI
//!
//! Runs (CHECK) or regenerates (TRAIN) the simulation tests of a recipe
//! repository.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use simtest::commands::{run_simulation, DEFAULT_MANIFEST};
use simtest::{Mode, RunConfig};

fn main() {
    simtest::init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = &args[1];

    match command.as_str() {
        "run" | "train" => {
            let mode = if command == "train" {
                Mode::Train
            } else {
                Mode::Check
            };
            let mut config = RunConfig::new(mode);
            let mut manifest = PathBuf::from(DEFAULT_MANIFEST);

            for arg in args.iter().skip(2) {
                if let Some(path) = arg.strip_prefix("--manifest=") {
                    manifest = PathBuf::from(path);
                } else if let Some(path) = arg.strip_prefix("--json=") {
                    config.json_output = Some(PathBuf::from(path));
                } else if let Some(jobs) = arg.strip_prefix("--jobs=") {
                    let Ok(jobs) = jobs.parse::<NonZeroUsize>() else {
                        eprintln!("error: --jobs expects a positive number, got {jobs:?}");
                        std::process::exit(1);
                    };
                    config.jobs = Some(jobs);
                } else if arg == "--verbose" || arg == "-v" {
                    config.verbose = true;
                } else if arg.starts_with('-') {
                    eprintln!("Unknown option: {arg}");
                    eprintln!("Usage: simtest {command} [FILTER...] [options]");
                    std::process::exit(1);
                } else {
                    config.filters.push(arg.clone());
                }
            }

            std::process::exit(run_simulation(&manifest, &config));
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        "version" | "--version" | "-V" => {
            println!("simtest {}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("simtest - parallel simulation tests for recipe repositories");
    println!();
    println!("Usage: simtest <command> [FILTER...] [options]");
    println!();
    println!("Commands:");
    println!("  run                 Check every test case against its expectation file");
    println!("  train               Regenerate expectation files, deleting stale ones");
    println!("  help                Show this message");
    println!("  version             Show the version");
    println!();
    println!("Filters:");
    println!("  RECIPE              Every test of recipes matching the glob");
    println!("  RECIPE.TEST         Test cases whose full name matches the glob");
    println!();
    println!("Options:");
    println!("  --manifest=<path>   Repository manifest (default: {DEFAULT_MANIFEST})");
    println!("  --json=<path>       Write the final outcome as JSON");
    println!("  --jobs=<n>          Number of workers (default: available CPUs)");
    println!("  --verbose, -v       One line per test case instead of progress glyphs");
    println!();
    println!("Environment:");
    println!("  RUST_LOG            Enable debug logging (e.g. simtest=debug)");
    println!("  SIMTEST_LOG_TREE    Log as an indented span tree");
    println!("  COLUMNS             Width of the progress display");
    println!();
    println!("Examples:");
    println!("  simtest run");
    println!("  simtest train 'deploy'");
    println!("  simtest run 'cq:*' 'deploy.full*' --jobs=4");
}
