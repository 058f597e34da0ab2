//! Command line interface for interpolating many datasets.

use super::utils;
use crate::{
    batch::{BatchConfig, BatchDriver, BatchOutcome, RunLayout, RunSelection, WorkItem},
    exit_on_error, exit_with_error,
    interpolation::LogPressureInterpolator,
    levels,
};
use clap::{value_parser, Arg, ArgGroup, ArgMatches, Command};
use std::path::PathBuf;

/// Creates a subcommand for interpolating the output of many runs.
pub fn create_batch_subcommand() -> Command {
    let command = Command::new("batch")
        .about("Interpolate the datasets of many experiment runs onto fixed pressure levels")
        .long_about(
            "Interpolate the datasets of many experiment runs onto fixed pressure levels.\n\
             Input datasets are found at <BASE_DIR>/<EXPERIMENT>/run<NNNN>/<FILE_NAME>.<EXTENSION>\n\
             and written to <OUTPUT_DIR>/<EXPERIMENT>/run<NNNN>/<FILE_NAME><SUFFIX>.<EXTENSION>.\n\
             Datasets whose output already exists are skipped, so an interrupted batch\n\
             can be resumed by running the same command again.",
        )
        .arg(
            Arg::new("base-dir")
                .long("base-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory containing the experiment directories"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .requires("base-dir")
                .help("Directory to write the output to [default: BASE_DIR]"),
        )
        .arg(
            Arg::new("experiments")
                .short('e')
                .long("experiments")
                .value_name("NAMES")
                .requires("base-dir")
                .help("Space or comma separated list of experiment names"),
        )
        .arg(
            Arg::new("runs")
                .short('r')
                .long("runs")
                .value_name("FIRST-LAST")
                .help("Range of run numbers to process"),
        )
        .arg(
            Arg::new("run-names")
                .long("run-names")
                .value_name("NAMES")
                .help("Space or comma separated list of run directory names"),
        )
        .group(ArgGroup::new("run-selection").args(["runs", "run-names"]))
        .arg(
            Arg::new("file-name")
                .long("file-name")
                .value_name("NAME")
                .default_value("atmos_monthly")
                .help("Name of the dataset file in each run directory, without extension"),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .value_name("SUFFIX")
                .default_value(RunLayout::DEFAULT_OUTPUT_SUFFIX)
                .help("Suffix appended to the file name of the output"),
        )
        .arg(
            Arg::new("extension")
                .long("extension")
                .value_name("EXTENSION")
                .default_value(RunLayout::DEFAULT_EXTENSION)
                .help("Extension of the dataset files"),
        )
        .arg(
            Arg::new("items")
                .long("items")
                .value_name("INPUT=OUTPUT")
                .num_args(1..)
                .help("Explicit pairs of input and output paths to process"),
        );

    #[cfg(feature = "json")]
    let command = command.arg(
        Arg::new("config-file")
            .short('c')
            .long("config-file")
            .value_name("CONFIG_FILE")
            .value_parser(value_parser!(PathBuf))
            .conflicts_with_all([
                "base-dir",
                "items",
                "fields",
                "all-fields",
                "levels",
                "level-preset",
                "extrapolate-below-surface",
            ])
            .help("JSON file specifying the complete batch"),
    );

    utils::add_verbosity_arguments(utils::add_interpolation_arguments(command))
}

/// Runs the actions for the `batch` subcommand using the given arguments.
pub fn run_batch_subcommand(arguments: &ArgMatches) {
    let config = parse_batch_config(arguments);
    exit_on_error!(config.validate(), "Error: {}");

    let driver = BatchDriver::new(config, LogPressureInterpolator::new())
        .with_verbosity(utils::parse_verbosity(arguments))
        .with_interrupt_flag(utils::interrupt_flag());

    let summary = driver.execute_all();
    println!("{}", summary);

    match summary.outcome() {
        BatchOutcome::Empty | BatchOutcome::AllSucceeded => {}
        BatchOutcome::PartialSuccess | BatchOutcome::NoSuccess => {
            exit_with_error!("Error: {} work items failed", summary.n_failed())
        }
        BatchOutcome::Interrupted => exit_with_error!("Error: Batch was interrupted"),
    }
}

fn parse_batch_config(arguments: &ArgMatches) -> BatchConfig {
    #[cfg(feature = "json")]
    if let Some(config_file_path) = arguments.get_one::<PathBuf>("config-file") {
        return exit_on_error!(
            BatchConfig::from_json_file(config_file_path),
            "Error: Could not load batch configuration from {}: {}",
            config_file_path.display()
        );
    }

    let mut config = BatchConfig::new(
        utils::parse_level_set(arguments),
        utils::parse_field_selection(arguments),
        utils::parse_masking(arguments),
    );

    if let Some(base_dir) = arguments.get_one::<PathBuf>("base-dir") {
        let experiments: Vec<String> = arguments
            .get_one::<String>("experiments")
            .map(|names| levels::split_list(names).map(String::from).collect())
            .unwrap_or_default();
        let runs = if let Some(range) = arguments.get_one::<String>("runs") {
            exit_on_error!(RunSelection::parse_range(range), "Error: {}")
        } else if let Some(names) = arguments.get_one::<String>("run-names") {
            RunSelection::Named(levels::split_list(names).map(String::from).collect())
        } else {
            RunSelection::None
        };
        let mut layout = RunLayout::new(
            base_dir,
            experiments,
            runs,
            arguments
                .get_one::<String>("file-name")
                .expect("No value for argument with default")
                .as_str(),
        )
        .with_output_suffix(
            arguments
                .get_one::<String>("suffix")
                .expect("No value for argument with default")
                .as_str(),
        )
        .with_extension(
            arguments
                .get_one::<String>("extension")
                .expect("No value for argument with default")
                .as_str(),
        );
        if let Some(output_dir) = arguments.get_one::<PathBuf>("output-dir") {
            layout = layout.with_output_dir(output_dir);
        }
        config = config.with_layout(layout);
    }

    if let Some(items) = arguments.get_many::<String>("items") {
        for item in items {
            let (input, output) = match item.split_once('=') {
                Some(paths) => paths,
                None => exit_with_error!("Error: Invalid work item {} (expected INPUT=OUTPUT)", item),
            };
            config = config.with_item(WorkItem::new(input, output));
        }
    }
    config
}
