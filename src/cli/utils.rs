//! Utilities for creating the command line interface.

use crate::{
    batch::InterruptFlag,
    exit_on_error, exit_with_error,
    interpolation::MaskingPolicy,
    io::Verbosity,
    job::FieldSelection,
    levels::{LevelSet, DEFAULT_MAX_SURFACE_PRESSURE, PRESET_NAMES},
};
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use indicatif::ProgressStyle;
use lazy_static::lazy_static;

lazy_static! {
    static ref DEFAULT_PROGRESS_STYLE: ProgressStyle = ProgressStyle::default_bar()
        .template("Progress: {bar:40}  {percent}% | ETA: {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    static ref INTERRUPT_FLAG: InterruptFlag =
        InterruptFlag::install_handler().unwrap_or_else(|err| {
            eprintln!("Warning: Could not install interrupt handler: {}", err);
            InterruptFlag::new()
        });
}

/// Returns the flag raised when the user interrupts the program.
pub fn interrupt_flag() -> InterruptFlag {
    INTERRUPT_FLAG.clone()
}

/// Adds the arguments selecting target levels, fields and masking.
pub fn add_interpolation_arguments(command: Command) -> Command {
    command
        .arg(
            Arg::new("fields")
                .short('f')
                .long("fields")
                .value_name("NAMES")
                .help("Space or comma separated list of fields to interpolate"),
        )
        .arg(
            Arg::new("all-fields")
                .short('a')
                .long("all-fields")
                .action(ArgAction::SetTrue)
                .help("Interpolate every field defined on native levels"),
        )
        .group(ArgGroup::new("field-selection").args(["fields", "all-fields"]))
        .arg(
            Arg::new("levels")
                .short('p')
                .long("levels")
                .value_name("PRESSURES")
                .help("Space or comma separated list of target pressures [Pa]"),
        )
        .arg(
            Arg::new("level-preset")
                .long("level-preset")
                .value_name("NAME")
                .value_parser(PRESET_NAMES)
                .help("Predefined set of target pressures"),
        )
        .group(ArgGroup::new("level-source").args(["levels", "level-preset"]))
        .arg(
            Arg::new("max-surface-pressure")
                .long("max-surface-pressure")
                .value_name("PRESSURE")
                .value_parser(value_parser!(f64))
                .default_value("1e7")
                .help("Upper bound on plausible surface pressures [Pa]"),
        )
        .arg(
            Arg::new("extrapolate-below-surface")
                .short('x')
                .long("extrapolate-below-surface")
                .action(ArgAction::SetTrue)
                .help("Hold the bottom value below the surface instead of masking it"),
        )
}

/// Adds the `verbose` and `progress` arguments.
pub fn add_verbosity_arguments(command: Command) -> Command {
    command
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Print status messages"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Show progress bars"),
        )
}

pub fn parse_verbosity(arguments: &ArgMatches) -> Verbosity {
    if arguments.get_flag("progress") {
        Verbosity::Progress(DEFAULT_PROGRESS_STYLE.clone())
    } else if arguments.get_flag("verbose") {
        Verbosity::Messages
    } else {
        Verbosity::Quiet
    }
}

pub fn parse_level_set(arguments: &ArgMatches) -> LevelSet {
    let max_surface_pressure = arguments
        .get_one::<f64>("max-surface-pressure")
        .copied()
        .unwrap_or(DEFAULT_MAX_SURFACE_PRESSURE);
    let level_set = if let Some(levels) = arguments.get_one::<String>("levels") {
        LevelSet::parse(levels, max_surface_pressure)
    } else if let Some(preset) = arguments.get_one::<String>("level-preset") {
        LevelSet::preset(preset, max_surface_pressure)
    } else {
        exit_with_error!("Error: No target pressure levels specified")
    };
    exit_on_error!(level_set, "Error: {}")
}

pub fn parse_field_selection(arguments: &ArgMatches) -> FieldSelection {
    if arguments.get_flag("all-fields") {
        FieldSelection::AllOnNativeLevels
    } else if let Some(fields) = arguments.get_one::<String>("fields") {
        let selection = FieldSelection::from_list(fields);
        if selection == FieldSelection::Named(Vec::new()) {
            exit_with_error!("Error: No field names given");
        }
        selection
    } else {
        exit_with_error!("Error: No fields specified")
    }
}

pub fn parse_masking(arguments: &ArgMatches) -> MaskingPolicy {
    if arguments.get_flag("extrapolate-below-surface") {
        MaskingPolicy::ExtrapolateBelowSurface
    } else {
        MaskingPolicy::MaskBelowSurface
    }
}
