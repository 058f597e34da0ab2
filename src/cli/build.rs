//! Function for building the command line hierarchy.

use super::{
    batch::create_batch_subcommand, completions::create_completions_subcommand,
    interpolate::create_interpolate_subcommand,
};
use clap::{self, Arg, ArgAction, Command};

/// Build the `plevel` command line hierarchy.
pub fn build() -> Command {
    Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .author(clap::crate_authors!())
        .about(clap::crate_description!())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .disable_help_subcommand(true)
        .arg(
            Arg::new("timing")
                .short('t')
                .long("timing")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Display elapsed time when done"),
        )
        .subcommand(create_interpolate_subcommand())
        .subcommand(create_batch_subcommand())
        .subcommand(create_completions_subcommand())
}
