//! Idempotent processing of many interpolation jobs.

use crate::{
    error::{PlevelError, PlevelResult},
    interpolation::{MaskingPolicy, VerticalInterpolator},
    io::Verbosity,
    job::{FieldSelection, InterpolationJob, JobOutcome, JobReport},
    levels::LevelSet,
};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

#[cfg(feature = "json")]
use crate::{
    io::utils,
    levels::{self, DEFAULT_MAX_SURFACE_PRESSURE},
};
#[cfg(feature = "json")]
use serde::Deserialize;

/// Flag signalling that processing should stop as soon as possible.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that is raised when the process receives an
    /// interrupt or termination signal.
    pub fn install_handler() -> Result<Self, ctrlc::Error> {
        let flag = Self::new();
        let handler_flag = flag.clone();
        ctrlc::set_handler(move || {
            eprintln!("Interrupted, stopping after cleaning up the current job");
            handler_flag.interrupt();
        })?;
        Ok(flag)
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns an `Interrupted` error if the flag has been raised.
    pub fn check(&self) -> PlevelResult<()> {
        if self.is_interrupted() {
            Err(PlevelError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// A pair of input and output paths to process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl WorkItem {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input_path: P, output_path: Q) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
        }
    }
}

/// Processing state of a work item.
///
/// Items start out `Pending` and end up either `Skipped`, `Completed` or
/// `Failed`, passing through `Running` unless skipped.
#[derive(Debug)]
pub enum WorkItemState {
    Pending,
    Skipped,
    Running,
    Completed(JobReport),
    Failed(PlevelError),
}

impl WorkItemState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Which run directories of an experiment to process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunSelection {
    /// Files lie directly in the experiment directory.
    None,
    /// Runs `run<first>` through `run<last>` (inclusive), zero-padded to four digits.
    Range { first: u32, last: u32 },
    /// Explicitly named run directories.
    Named(Vec<String>),
}

impl RunSelection {
    /// Parses a run range of the form `FIRST-LAST` or a single run number.
    pub fn parse_range(text: &str) -> PlevelResult<Self> {
        let parse_number = |number: &str| {
            number.trim().parse::<u32>().map_err(|err| {
                PlevelError::InvalidConfig(format!("Invalid run number {}: {}", number, err))
            })
        };
        let (first, last) = match text.split_once('-') {
            Some((first, last)) => (parse_number(first)?, parse_number(last)?),
            None => {
                let run = parse_number(text)?;
                (run, run)
            }
        };
        if first > last {
            return Err(PlevelError::InvalidConfig(format!(
                "First run {} comes after last run {}",
                first, last
            )));
        }
        Ok(Self::Range { first, last })
    }

    /// Returns the names of the selected run directories.
    pub fn directory_names(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Range { first, last } => (*first..=*last).map(|run| format!("run{:04}", run)).collect(),
            Self::Named(names) => names.clone(),
        }
    }
}

/// Directory layout of experiment output, used to enumerate work items.
///
/// Input files are located at `<base_dir>/<experiment>/<run>/<file_name>.<extension>`
/// and outputs are written to `<output_dir>/<experiment>/<run>/<file_name><suffix>.<extension>`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunLayout {
    base_dir: PathBuf,
    output_dir: Option<PathBuf>,
    experiments: Vec<String>,
    runs: RunSelection,
    file_name: String,
    output_suffix: String,
    extension: String,
}

impl RunLayout {
    pub const DEFAULT_OUTPUT_SUFFIX: &'static str = "_interp";
    pub const DEFAULT_EXTENSION: &'static str = "nc";

    pub fn new<P, S>(base_dir: P, experiments: Vec<String>, runs: RunSelection, file_name: S) -> Self
    where
        P: AsRef<Path>,
        S: Into<String>,
    {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            output_dir: None,
            experiments,
            runs,
            file_name: file_name.into(),
            output_suffix: Self::DEFAULT_OUTPUT_SUFFIX.to_string(),
            extension: Self::DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_output_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Self {
        self.output_dir = Some(output_dir.as_ref().to_path_buf());
        self
    }

    pub fn with_output_suffix<S: Into<String>>(mut self, output_suffix: S) -> Self {
        self.output_suffix = output_suffix.into();
        self
    }

    pub fn with_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Checks that the layout can produce distinct inputs and outputs.
    pub fn validate(&self) -> PlevelResult<()> {
        if self.experiments.is_empty() {
            return Err(PlevelError::InvalidConfig(
                "No experiments given".to_string(),
            ));
        }
        if self.file_name.is_empty() {
            return Err(PlevelError::InvalidConfig("No file name given".to_string()));
        }
        if self.output_suffix.is_empty()
            && self.output_dir.as_ref().map_or(true, |dir| *dir == self.base_dir)
        {
            return Err(PlevelError::InvalidConfig(
                "An empty output suffix requires a separate output directory".to_string(),
            ));
        }
        Ok(())
    }

    /// Enumerates the work items of the layout, experiment by experiment.
    pub fn work_items(&self) -> Vec<WorkItem> {
        let output_dir = self.output_dir.as_ref().unwrap_or(&self.base_dir);
        let input_file_name = self.file_name_with_extension(&self.file_name);
        let output_file_name =
            self.file_name_with_extension(&format!("{}{}", self.file_name, self.output_suffix));
        let run_names = self.runs.directory_names();

        let mut work_items = Vec::new();
        for experiment in &self.experiments {
            let input_experiment_dir = self.base_dir.join(experiment);
            let output_experiment_dir = output_dir.join(experiment);
            if run_names.is_empty() {
                work_items.push(WorkItem::new(
                    input_experiment_dir.join(&input_file_name),
                    output_experiment_dir.join(&output_file_name),
                ));
            }
            for run_name in &run_names {
                work_items.push(WorkItem::new(
                    input_experiment_dir.join(run_name).join(&input_file_name),
                    output_experiment_dir.join(run_name).join(&output_file_name),
                ));
            }
        }
        work_items
    }

    fn file_name_with_extension(&self, file_name: &str) -> String {
        if self.extension.is_empty() {
            file_name.to_string()
        } else {
            format!("{}.{}", file_name, self.extension)
        }
    }
}

/// Settings shared by all work items of a batch.
///
/// Constructed once per invocation and never modified while the batch runs.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    level_set: Arc<LevelSet>,
    fields: FieldSelection,
    masking: MaskingPolicy,
    layouts: Vec<RunLayout>,
    items: Vec<WorkItem>,
}

impl BatchConfig {
    pub fn new(level_set: LevelSet, fields: FieldSelection, masking: MaskingPolicy) -> Self {
        Self {
            level_set: Arc::new(level_set),
            fields,
            masking,
            layouts: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn with_layout(mut self, layout: RunLayout) -> Self {
        self.layouts.push(layout);
        self
    }

    pub fn with_item(mut self, item: WorkItem) -> Self {
        self.items.push(item);
        self
    }

    /// Checks everything that would invalidate the batch as a whole.
    pub fn validate(&self) -> PlevelResult<()> {
        self.level_set.validate()?;
        if let FieldSelection::Named(names) = &self.fields {
            if names.is_empty() {
                return Err(PlevelError::InvalidConfig("No fields given".to_string()));
            }
        }
        for layout in &self.layouts {
            layout.validate()?;
        }
        if self.layouts.is_empty() && self.items.is_empty() {
            return Err(PlevelError::InvalidConfig(
                "Neither a run layout nor explicit work items given".to_string(),
            ));
        }
        Ok(())
    }

    pub fn level_set(&self) -> &Arc<LevelSet> {
        &self.level_set
    }

    pub fn fields(&self) -> &FieldSelection {
        &self.fields
    }

    pub fn masking(&self) -> MaskingPolicy {
        self.masking
    }

    pub fn layouts(&self) -> &[RunLayout] {
        &self.layouts
    }

    /// Returns all work items: those enumerated by the layouts followed by
    /// the explicitly listed ones.
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.layouts
            .iter()
            .flat_map(RunLayout::work_items)
            .chain(self.items.iter().cloned())
            .collect()
    }

    /// Reads a batch configuration from the given JSON file.
    #[cfg(feature = "json")]
    pub fn from_json_file<P: AsRef<Path>>(file_path: P) -> PlevelResult<Self> {
        let file_path = file_path.as_ref();
        let text = utils::read_text_file(file_path).map_err(|err| {
            PlevelError::InvalidConfig(format!("Could not read {}: {}", file_path.display(), err))
        })?;
        Self::from_json_str(&text)
    }

    /// Parses a batch configuration from JSON text.
    #[cfg(feature = "json")]
    pub fn from_json_str(text: &str) -> PlevelResult<Self> {
        let file: BatchFile = serde_json::from_str(text)
            .map_err(|err| PlevelError::InvalidConfig(format!("Invalid batch file: {}", err)))?;
        file.into_config()
    }
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList<T> {
    Text(String),
    List(Vec<T>),
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
#[serde(untagged)]
enum RunFileSpec {
    Range { first: u32, last: u32 },
    Names(Vec<String>),
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutFile {
    base_dir: PathBuf,
    output_dir: Option<PathBuf>,
    experiments: TextOrList<String>,
    runs: Option<RunFileSpec>,
    file_name: String,
    suffix: Option<String>,
    extension: Option<String>,
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemFile {
    input: PathBuf,
    output: PathBuf,
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchFile {
    levels: Option<TextOrList<f64>>,
    level_preset: Option<String>,
    max_surface_pressure: Option<f64>,
    fields: Option<TextOrList<String>>,
    #[serde(default)]
    all_fields: bool,
    #[serde(default)]
    extrapolate_below_surface: bool,
    #[serde(default)]
    layouts: Vec<LayoutFile>,
    #[serde(default)]
    items: Vec<ItemFile>,
}

#[cfg(feature = "json")]
impl BatchFile {
    fn into_config(self) -> PlevelResult<BatchConfig> {
        let max_surface_pressure = self
            .max_surface_pressure
            .unwrap_or(DEFAULT_MAX_SURFACE_PRESSURE);
        let level_set = match (self.levels, self.level_preset) {
            (Some(TextOrList::Text(text)), None) => LevelSet::parse(&text, max_surface_pressure)?,
            (Some(TextOrList::List(pressures)), None) => {
                LevelSet::new(pressures, max_surface_pressure)?
            }
            (None, Some(preset)) => LevelSet::preset(&preset, max_surface_pressure)?,
            (Some(_), Some(_)) => {
                return Err(PlevelError::InvalidConfig(
                    "Only one of levels and level_preset may be given".to_string(),
                ))
            }
            (None, None) => {
                return Err(PlevelError::InvalidConfig(
                    "One of levels and level_preset must be given".to_string(),
                ))
            }
        };

        let fields = match (self.fields, self.all_fields) {
            (Some(TextOrList::Text(text)), false) => FieldSelection::from_list(&text),
            (Some(TextOrList::List(names)), false) => FieldSelection::Named(names),
            (None, true) => FieldSelection::AllOnNativeLevels,
            (Some(_), true) => {
                return Err(PlevelError::InvalidConfig(
                    "Only one of fields and all_fields may be given".to_string(),
                ))
            }
            (None, false) => {
                return Err(PlevelError::InvalidConfig(
                    "One of fields and all_fields must be given".to_string(),
                ))
            }
        };

        let masking = if self.extrapolate_below_surface {
            MaskingPolicy::ExtrapolateBelowSurface
        } else {
            MaskingPolicy::MaskBelowSurface
        };

        let mut config = BatchConfig::new(level_set, fields, masking);
        for layout_file in self.layouts {
            let experiments = match layout_file.experiments {
                TextOrList::Text(text) => levels::split_list(&text).map(String::from).collect(),
                TextOrList::List(experiments) => experiments,
            };
            let runs = match layout_file.runs {
                Some(RunFileSpec::Range { first, last }) => RunSelection::Range { first, last },
                Some(RunFileSpec::Names(names)) => RunSelection::Named(names),
                None => RunSelection::None,
            };
            let mut layout =
                RunLayout::new(layout_file.base_dir, experiments, runs, layout_file.file_name);
            if let Some(output_dir) = layout_file.output_dir {
                layout = layout.with_output_dir(output_dir);
            }
            if let Some(suffix) = layout_file.suffix {
                layout = layout.with_output_suffix(suffix);
            }
            if let Some(extension) = layout_file.extension {
                layout = layout.with_extension(extension);
            }
            config = config.with_layout(layout);
        }
        for item in self.items {
            config = config.with_item(WorkItem::new(item.input, item.output));
        }

        config.validate()?;
        Ok(config)
    }
}

/// Work item together with its final processing state.
#[derive(Debug)]
pub struct WorkItemRecord {
    pub item: WorkItem,
    pub state: WorkItemState,
}

/// Overall result of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// There were no work items.
    Empty,
    AllSucceeded,
    PartialSuccess,
    NoSuccess,
    /// The batch was stopped before all items were processed.
    Interrupted,
}

/// Summary of an executed batch.
#[derive(Debug)]
pub struct BatchSummary {
    records: Vec<WorkItemRecord>,
    elapsed: Duration,
    interrupted: bool,
}

impl BatchSummary {
    pub fn records(&self) -> &[WorkItemRecord] {
        &self.records
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    fn count<F: Fn(&WorkItemState) -> bool>(&self, predicate: F) -> usize {
        self.records
            .iter()
            .filter(|record| predicate(&record.state))
            .count()
    }

    pub fn n_completed(&self) -> usize {
        self.count(|state| matches!(state, WorkItemState::Completed(_)))
    }

    pub fn n_skipped(&self) -> usize {
        self.count(|state| matches!(state, WorkItemState::Skipped))
    }

    pub fn n_failed(&self) -> usize {
        self.count(|state| matches!(state, WorkItemState::Failed(_)))
    }

    pub fn n_pending(&self) -> usize {
        self.count(|state| !state.is_terminal())
    }

    /// Returns the failed work items with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&WorkItem, &PlevelError)> {
        self.records.iter().filter_map(|record| match &record.state {
            WorkItemState::Failed(err) => Some((&record.item, err)),
            _ => None,
        })
    }

    pub fn outcome(&self) -> BatchOutcome {
        let n_succeeded = self.n_completed() + self.n_skipped();
        if self.interrupted {
            BatchOutcome::Interrupted
        } else if self.records.is_empty() {
            BatchOutcome::Empty
        } else if n_succeeded == self.records.len() {
            BatchOutcome::AllSucceeded
        } else if n_succeeded > 0 {
            BatchOutcome::PartialSuccess
        } else {
            BatchOutcome::NoSuccess
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} work items in {:.2} s: {} completed, {} skipped, {} failed",
            self.records.len(),
            self.elapsed.as_secs_f64(),
            self.n_completed(),
            self.n_skipped(),
            self.n_failed()
        )?;
        let n_pending = self.n_pending();
        if n_pending > 0 {
            write!(f, ", {} not processed", n_pending)?;
        }
        for (item, err) in self.failures() {
            write!(
                f,
                "\n  {} -> {}: {}: {}",
                item.input_path.display(),
                item.output_path.display(),
                err.kind(),
                err
            )?;
        }
        match self.outcome() {
            BatchOutcome::Empty => write!(f, "\nNo work items"),
            BatchOutcome::AllSucceeded => Ok(()),
            BatchOutcome::PartialSuccess => write!(f, "\nSome work items failed"),
            BatchOutcome::NoSuccess => write!(f, "\nAll work items failed"),
            BatchOutcome::Interrupted => write!(f, "\nInterrupted"),
        }
    }
}

/// Runs interpolation jobs for work items one after another.
#[derive(Debug)]
pub struct BatchDriver<I: VerticalInterpolator> {
    config: BatchConfig,
    interpolator: I,
    verbosity: Verbosity,
    interrupt: InterruptFlag,
}

impl<I: VerticalInterpolator> BatchDriver<I> {
    pub fn new(config: BatchConfig, interpolator: I) -> Self {
        Self {
            config,
            interpolator,
            verbosity: Verbosity::Quiet,
            interrupt: InterruptFlag::new(),
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_interrupt_flag(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Processes all work items of the configuration.
    pub fn execute_all(&self) -> BatchSummary {
        self.execute(&self.config.work_items())
    }

    /// Processes the given work items in order.
    ///
    /// Items whose output exists are skipped. A failing item is recorded
    /// and processing continues with the next one. If interrupted, the
    /// remaining items are left pending.
    pub fn execute(&self, work_items: &[WorkItem]) -> BatchSummary {
        let start_instant = Instant::now();
        let n_items = work_items.len();
        let mut records: Vec<WorkItemRecord> = work_items
            .iter()
            .map(|item| WorkItemRecord {
                item: item.clone(),
                state: WorkItemState::Pending,
            })
            .collect();
        let mut interrupted = false;

        for (idx, record) in records.iter_mut().enumerate() {
            if self.interrupt.is_interrupted() {
                interrupted = true;
                break;
            }
            if self.verbosity.print_messages() {
                println!(
                    "[{}/{}] {}",
                    idx + 1,
                    n_items,
                    record.item.input_path.display()
                );
            }
            if record.item.output_path.exists() {
                record.state = WorkItemState::Skipped;
                continue;
            }

            record.state = WorkItemState::Running;
            let job = InterpolationJob::new(
                &record.item.input_path,
                &record.item.output_path,
                self.config.fields.clone(),
                Arc::clone(&self.config.level_set),
                self.config.masking,
            );
            record.state = match job.run(&self.interpolator, &self.verbosity, &self.interrupt) {
                Ok(JobOutcome::Skipped) => WorkItemState::Skipped,
                Ok(JobOutcome::Completed(report)) => WorkItemState::Completed(report),
                Err(err) => {
                    if let PlevelError::Interrupted = err {
                        interrupted = true;
                    } else {
                        eprintln!(
                            "Failed to process {}: {}",
                            record.item.input_path.display(),
                            err
                        );
                    }
                    WorkItemState::Failed(err)
                }
            };
            if interrupted {
                break;
            }
        }

        BatchSummary {
            records,
            elapsed: start_instant.elapsed(),
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::LogPressureInterpolator;
    use std::fs;

    fn config() -> BatchConfig {
        BatchConfig::new(
            LevelSet::preset("earth30", 1e7).unwrap(),
            FieldSelection::from_list("temp"),
            MaskingPolicy::MaskBelowSurface,
        )
    }

    fn summary(states: Vec<WorkItemState>, interrupted: bool) -> BatchSummary {
        BatchSummary {
            records: states
                .into_iter()
                .map(|state| WorkItemRecord {
                    item: WorkItem::new("in.nc", "out.nc"),
                    state,
                })
                .collect(),
            elapsed: Duration::from_millis(1500),
            interrupted,
        }
    }

    #[test]
    fn run_layout_enumerates_zero_padded_runs() {
        let layout = RunLayout::new(
            "/data",
            vec!["exp_a".to_string(), "exp_b".to_string()],
            RunSelection::parse_range("9-10").unwrap(),
            "atmos_monthly",
        );
        let items = layout.work_items();
        assert_eq!(items.len(), 4);
        assert_eq!(
            items[0],
            WorkItem::new(
                "/data/exp_a/run0009/atmos_monthly.nc",
                "/data/exp_a/run0009/atmos_monthly_interp.nc"
            )
        );
        assert_eq!(
            items[3],
            WorkItem::new(
                "/data/exp_b/run0010/atmos_monthly.nc",
                "/data/exp_b/run0010/atmos_monthly_interp.nc"
            )
        );
    }

    #[test]
    fn run_layout_supports_named_runs_and_output_dir() {
        let layout = RunLayout::new(
            "/data",
            vec!["exp".to_string()],
            RunSelection::Named(vec!["spinup".to_string()]),
            "atmos_daily",
        )
        .with_output_dir("/scratch")
        .with_output_suffix("_plev")
        .with_extension(".pickle");
        assert_eq!(
            layout.work_items(),
            vec![WorkItem::new(
                "/data/exp/spinup/atmos_daily.pickle",
                "/scratch/exp/spinup/atmos_daily_plev.pickle"
            )]
        );

        let layout = RunLayout::new("/data", vec!["exp".to_string()], RunSelection::None, "atmos");
        assert_eq!(
            layout.work_items(),
            vec![WorkItem::new("/data/exp/atmos.nc", "/data/exp/atmos_interp.nc")]
        );
        assert!(layout.with_output_suffix("").validate().is_err());
    }

    #[test]
    fn invalid_run_ranges_are_rejected() {
        assert_eq!(
            RunSelection::parse_range("7").unwrap(),
            RunSelection::Range { first: 7, last: 7 }
        );
        assert!(RunSelection::parse_range("12-3").is_err());
        assert!(RunSelection::parse_range("a-3").is_err());
    }

    #[test]
    fn outcomes_distinguish_partial_and_total_failure() {
        let failure = || WorkItemState::Failed(PlevelError::InvalidGrid("bad".to_string()));
        assert_eq!(summary(vec![], false).outcome(), BatchOutcome::Empty);
        assert_eq!(
            summary(vec![WorkItemState::Skipped], false).outcome(),
            BatchOutcome::AllSucceeded
        );
        assert_eq!(
            summary(vec![WorkItemState::Skipped, failure()], false).outcome(),
            BatchOutcome::PartialSuccess
        );
        assert_eq!(
            summary(vec![failure(), failure()], false).outcome(),
            BatchOutcome::NoSuccess
        );
        assert_eq!(
            summary(vec![WorkItemState::Skipped, WorkItemState::Pending], true).outcome(),
            BatchOutcome::Interrupted
        );

        let text = summary(vec![WorkItemState::Skipped, failure()], false).to_string();
        assert!(text.starts_with("Processed 2 work items in 1.50 s: 0 completed, 1 skipped, 1 failed"));
        assert!(text.contains("in.nc -> out.nc: InvalidGridError: Invalid vertical grid: bad"));
    }

    #[test]
    fn existing_outputs_are_skipped_and_failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let existing_output = dir.path().join("done_interp.pickle");
        fs::write(&existing_output, b"done").unwrap();
        let items = vec![
            WorkItem::new(dir.path().join("missing.pickle"), dir.path().join("missing_interp.pickle")),
            WorkItem::new(dir.path().join("done.pickle"), &existing_output),
        ];

        let driver = BatchDriver::new(config(), LogPressureInterpolator::new());
        let summary = driver.execute(&items);
        assert_eq!(summary.n_failed(), 1);
        assert_eq!(summary.n_skipped(), 1);
        assert_eq!(summary.outcome(), BatchOutcome::PartialSuccess);
        assert_eq!(summary.failures().next().unwrap().0, &items[0]);
        assert!(!dir.path().join("missing_interp.pickle").exists());
        assert_eq!(fs::read(&existing_output).unwrap(), b"done");
    }

    #[test]
    fn interrupted_batch_leaves_items_pending() {
        let interrupt = InterruptFlag::new();
        interrupt.interrupt();
        let driver = BatchDriver::new(config(), LogPressureInterpolator::new())
            .with_interrupt_flag(interrupt);
        let summary = driver.execute(&[WorkItem::new("a.pickle", "a_interp.pickle")]);
        assert_eq!(summary.n_pending(), 1);
        assert_eq!(summary.outcome(), BatchOutcome::Interrupted);
    }

    #[test]
    fn config_without_work_is_invalid() {
        let err = config().validate().unwrap_err();
        assert_eq!(err.kind(), "InvalidConfigError");
        assert!(err.is_batch_fatal());
        assert!(config().with_item(WorkItem::new("a.nc", "b.nc")).validate().is_ok());
    }

    #[cfg(feature = "json")]
    #[test]
    fn config_is_read_from_json() {
        let config = BatchConfig::from_json_str(
            r#"{
                "level_preset": "earth25",
                "fields": "ucomp vcomp temp",
                "extrapolate_below_surface": true,
                "layouts": [
                    {
                        "base_dir": "/isca_data",
                        "experiments": ["sbm_realistic"],
                        "runs": {"first": 10, "last": 11},
                        "file_name": "atmos_monthly"
                    }
                ],
                "items": [{"input": "a.nc", "output": "b.nc"}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.level_set().len(), 25);
        assert_eq!(
            config.fields(),
            &FieldSelection::Named(vec!["ucomp".into(), "vcomp".into(), "temp".into()])
        );
        assert_eq!(config.masking(), MaskingPolicy::ExtrapolateBelowSurface);
        let items = config.work_items();
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[1].output_path,
            PathBuf::from("/isca_data/sbm_realistic/run0011/atmos_monthly_interp.nc")
        );

        let err = BatchConfig::from_json_str(r#"{"levels": [100, 50, 200], "all_fields": true, "items": []}"#)
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidLevelSetError");
        assert!(BatchConfig::from_json_str(r#"{"levels": "100 200", "fields": "temp", "colour": 1}"#).is_err());
    }
}
