//! Function for running the command line program.

use super::{
    batch::run_batch_subcommand, build, completions::run_completions_subcommand,
    interpolate::run_interpolate_subcommand,
};
use clap::ArgMatches;
use std::time::Instant;

/// Runs the `plevel` command line program.
pub fn run() {
    run_with_args(build::build().get_matches());
}

/// Runs the `plevel` command line program with the given parsed arguments.
pub fn run_with_args(arguments: ArgMatches) {
    let start_instant = Instant::now();

    match arguments.subcommand() {
        Some(("interpolate", interpolate_arguments)) => {
            run_interpolate_subcommand(interpolate_arguments)
        }
        Some(("batch", batch_arguments)) => run_batch_subcommand(batch_arguments),
        Some(("completions", completions_arguments)) => {
            run_completions_subcommand(completions_arguments)
        }
        _ => {}
    }

    if arguments.get_flag("timing") {
        println!("Elapsed time: {} s", start_instant.elapsed().as_secs_f64());
    }
}
