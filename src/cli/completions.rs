//! Command line interface for generating a command line completion script.

use super::build;
use clap::{value_parser, Arg, ArgMatches, Command};
use clap_complete::Shell;
use std::io;

/// Creates a subcommand for printing a shell completion script.
pub fn create_completions_subcommand() -> Command {
    Command::new("completions")
        .about("Generate tab-completion script for your shell")
        .hide(true)
        .arg(
            Arg::new("shell")
                .value_name("SHELL")
                .required(true)
                .value_parser(value_parser!(Shell))
                .help("The shell to generate the script for"),
        )
        .after_help(
            r#"DISCUSSION
    The script is output on `stdout`, allowing one to re-direct the
    output to the file of their choosing. Where you place the file
    will depend on which shell, and which operating system you are
    using.

    BASH:

        $ mkdir -p ~/.local/share/bash-completion/completions
        $ plevel completions bash >> ~/.local/share/bash-completion/completions/plevel

    ZSH:

    Add a directory such as `~/.zfunc` to `$fpath` in your `.zshrc`
    before `compinit`, then run

        $ plevel completions zsh > ~/.zfunc/_plevel

    FISH:

        $ mkdir -p ~/.config/fish/completions
        $ plevel completions fish > ~/.config/fish/completions/plevel.fish

    You may have to log out and log back in to your shell session for
    the changes to take affect."#,
        )
}

pub fn run_completions_subcommand(arguments: &ArgMatches) {
    let shell = *arguments
        .get_one::<Shell>("shell")
        .expect("No value for required argument");
    clap_complete::generate(
        shell,
        &mut build::build(),
        clap::crate_name!(),
        &mut io::stdout(),
    );
}
