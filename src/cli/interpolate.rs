//! Command line interface for interpolating a single dataset.

use super::utils;
use crate::{
    batch::RunLayout,
    exit_on_error,
    interpolation::LogPressureInterpolator,
    job::{InterpolationJob, JobOutcome},
};
use clap::{value_parser, Arg, ArgMatches, Command};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Creates a subcommand for interpolating one dataset onto pressure levels.
pub fn create_interpolate_subcommand() -> Command {
    let command = Command::new("interpolate")
        .about("Interpolate fields of a dataset onto fixed pressure levels")
        .arg(
            Arg::new("input-file")
                .value_name("INPUT_FILE")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help(
                    "Path to the dataset on native model levels.\n\
                     Assumes the following format based on the file extension:\n\
                     *.nc: NetCDF file (requires the netcdf feature)\n\
                     *.pickle, *.pkl: Pickled dataset (requires the pickle feature)",
                ),
        )
        .arg(
            Arg::new("output-file")
                .value_name("OUTPUT_FILE")
                .value_parser(value_parser!(PathBuf))
                .help(
                    "Path where the interpolated dataset should be written\n \
                     [default: input path with the output suffix appended to the file stem]",
                ),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .value_name("SUFFIX")
                .default_value(RunLayout::DEFAULT_OUTPUT_SUFFIX)
                .conflicts_with("output-file")
                .help("Suffix appended to the input file stem to form the default output path"),
        );
    utils::add_verbosity_arguments(utils::add_interpolation_arguments(command))
}

/// Runs the actions for the `interpolate` subcommand using the given arguments.
pub fn run_interpolate_subcommand(arguments: &ArgMatches) {
    let input_file_path = arguments
        .get_one::<PathBuf>("input-file")
        .expect("No value for required argument");
    let output_file_path = arguments
        .get_one::<PathBuf>("output-file")
        .cloned()
        .unwrap_or_else(|| {
            default_output_path(
                input_file_path,
                arguments
                    .get_one::<String>("suffix")
                    .expect("No value for argument with default"),
            )
        });

    let job = InterpolationJob::new(
        input_file_path,
        &output_file_path,
        utils::parse_field_selection(arguments),
        Arc::new(utils::parse_level_set(arguments)),
        utils::parse_masking(arguments),
    );
    let verbosity = utils::parse_verbosity(arguments);

    match exit_on_error!(
        job.run(
            &LogPressureInterpolator::new(),
            &verbosity,
            &utils::interrupt_flag()
        ),
        "Error: Could not interpolate {}: {}",
        input_file_path.display()
    ) {
        JobOutcome::Skipped => {
            println!("Output {} already exists, skipping", output_file_path.display())
        }
        JobOutcome::Completed(report) => {
            if verbosity.print_messages() {
                println!(
                    "Interpolated {} over {} columns ({} values masked)",
                    report.interpolated_fields.join(", "),
                    report.n_columns,
                    report.n_masked_values
                );
            }
        }
    }
}

/// Inserts the suffix between the file stem and extension of the input path.
pub fn default_output_path<P: AsRef<Path>>(input_file_path: P, suffix: &str) -> PathBuf {
    let input_file_path = input_file_path.as_ref();
    let stem = input_file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match input_file_path.extension() {
        Some(extension) => format!("{}{}.{}", stem, suffix, extension.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input_file_path.with_file_name(file_name)
}
