//! Job descriptor
//!
//! A job descriptor fully specifies one unit of work (image, command, dataset
//! paths, resource limits) so that any execution backend can run it. Inside
//! the system it is a typed struct; the flat `KEY=VALUE` representation only
//! exists at the CI-file and environment boundaries (see [`JobDescriptor::to_entries`]
//! and [`JobDescriptor::from_entries`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::run::RunKey;

/// Wire keys of the flat descriptor representation
pub mod keys {
    pub const TASK_ID: &str = "TIRA_TASK_ID";
    pub const DATASET_ID: &str = "TIRA_DATASET_ID";
    pub const VM_ID: &str = "TIRA_VM_ID";
    pub const RUN_ID: &str = "TIRA_RUN_ID";
    pub const IMAGE: &str = "TIRA_IMAGE_TO_EXECUTE";
    pub const COMMAND: &str = "TIRA_COMMAND_TO_EXECUTE";
    pub const OUTPUT_DIR: &str = "TIRA_OUTPUT_DIR";
    pub const DATASET_TYPE: &str = "TIRA_DATASET_TYPE";
    pub const SOFTWARE_ID: &str = "TIRA_SOFTWARE_ID";
    pub const EVALUATION_IMAGE: &str = "TIRA_EVALUATION_IMAGE_TO_EXECUTE";
    pub const EVALUATION_COMMAND: &str = "TIRA_EVALUATION_COMMAND_TO_EXECUTE";
    pub const EVALUATION_SOFTWARE_ID: &str = "TIRA_EVALUATION_SOFTWARE_ID";
    pub const GROUND_TRUTH_DIR: &str = "TIRA_GROUND_TRUTH_DIR";
    pub const INPUT_RUN_DATASET_ID: &str = "TIRA_INPUT_RUN_DATASET_ID";
    pub const INPUT_RUN_VM_ID: &str = "TIRA_INPUT_RUN_VM_ID";
    pub const INPUT_RUN_RUN_ID: &str = "TIRA_INPUT_RUN_RUN_ID";
    pub const INPUT_RUNS: &str = "TIRA_INPUT_RUNS";
    pub const HF_MODELS: &str = "TIRA_HF_MODELS";
    pub const CPU_COUNT: &str = "TIRA_CPU_COUNT";
    pub const MEMORY_IN_GIBIBYTE: &str = "TIRA_MEMORY_IN_GIBIBYTE";
    pub const GPU: &str = "TIRA_GPU";
    pub const GIT_ID: &str = "TIRA_GIT_ID";
    pub const ALLOW_NETWORK: &str = "TIRA_ALLOW_NETWORK";

    /// Keys every descriptor must define exactly once
    pub const REQUIRED: [&str; 9] = [
        TASK_ID,
        DATASET_ID,
        VM_ID,
        RUN_ID,
        IMAGE,
        COMMAND,
        OUTPUT_DIR,
        DATASET_TYPE,
        SOFTWARE_ID,
    ];
}

/// Software id marking a descriptor that only evaluates an existing run
pub const EVALUATION_ONLY_SOFTWARE_ID: &str = "-1";

/// Placeholder image of evaluation-only descriptors
pub const EVALUATION_ONLY_IMAGE: &str = "ubuntu:18.04";

/// Placeholder command of evaluation-only descriptors
pub const EVALUATION_ONLY_COMMAND: &str = "echo 'No software to execute. Only evaluation'";

/// Errors raised while building or reading a job descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("missing required key(s): {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("key {0} is defined more than once")]
    DuplicateKey(String),

    #[error("line {line_number} is not a KEY=VALUE pair: {line:?}")]
    MalformedLine { line_number: usize, line: String },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("inconsistent descriptor: {0}")]
    Inconsistent(String),
}

/// Whether a dataset is a training or a test dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Training,
    Test,
}

impl DatasetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Training => "training",
            DatasetType::Test => "test",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "training" => Some(DatasetType::Training),
            "test" => Some(DatasetType::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatasetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one of these holds per descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Execution,
    Evaluation,
}

/// The evaluator software attached to a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorSoftware {
    pub image: String,
    pub command: String,
    pub software_id: Option<String>,
}

/// GPU request of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuRequest {
    #[default]
    None,
    /// Any `n` devices
    Count(u32),
    /// Specific device ids
    Devices(Vec<String>),
}

impl GpuRequest {
    /// Parses `0`, `<n>` or `device=<id>,<id>`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Some(GpuRequest::None);
        }

        if let Some(ids) = value.strip_prefix("device=") {
            let ids: Vec<String> = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            return if ids.is_empty() {
                None
            } else {
                Some(GpuRequest::Devices(ids))
            };
        }

        match value.parse::<u32>().ok()? {
            0 => Some(GpuRequest::None),
            n => Some(GpuRequest::Count(n)),
        }
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self, GpuRequest::None)
    }
}

impl std::fmt::Display for GpuRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuRequest::None => write!(f, "0"),
            GpuRequest::Count(n) => write!(f, "{}", n),
            GpuRequest::Devices(ids) => write!(f, "device={}", ids.join(",")),
        }
    }
}

/// Resource limits handed to the execution environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_count: Option<u32>,
    pub memory_gib: Option<u32>,
    pub gpu: GpuRequest,
}

/// Paths a backend resolved for one job
///
/// The backend decides whether these are host or container paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input_dataset: String,
    pub ground_truth: String,
    pub output: String,
    pub eval_output: String,
    pub input_run: Option<String>,
}

/// Values substituted for the named placeholders of a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderBindings {
    pub input_dataset: String,
    pub output_dir: String,
    pub input_run: Option<String>,
}

impl PlaceholderBindings {
    /// Resolves `$inputDataset`, `$outputDir` and `$inputRun` (also in `${...}` form)
    ///
    /// A placeholder without a bound value is left untouched.
    pub fn resolve(&self, template: &str) -> String {
        let mut resolved = template.to_string();
        let mut bindings = vec![
            ("inputDataset", Some(self.input_dataset.as_str())),
            ("outputDir", Some(self.output_dir.as_str())),
            ("inputRun", self.input_run.as_deref()),
        ];
        // Longest names first so no placeholder is a prefix of an earlier one.
        bindings.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));

        for (name, value) in bindings {
            if let Some(value) = value {
                resolved = resolved.replace(&format!("${{{}}}", name), value);
                resolved = resolved.replace(&format!("${}", name), value);
            }
        }

        resolved
    }
}

/// Typed job descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub kind: JobKind,
    pub task_id: String,
    pub dataset_id: String,
    pub vm_id: String,
    pub run_id: String,
    pub image: String,

    /// Command template with `$inputDataset`, `$outputDir` and `$inputRun` placeholders
    pub command: String,

    /// Job directory receiving `output/` and the diagnostics files
    pub output_dir: PathBuf,
    pub dataset_type: DatasetType,
    pub software_id: Option<String>,
    pub evaluator: Option<EvaluatorSoftware>,
    pub ground_truth_dir: Option<PathBuf>,

    /// Previous-stage runs in the order they are staged
    pub input_runs: Vec<RunKey>,

    /// Hugging Face model ids to mount
    pub hf_models: Vec<String>,
    pub resources: ResourceLimits,
    pub allow_network: bool,
    pub git_id: Option<String>,
}

impl JobDescriptor {
    /// Creates a descriptor executing participant software
    pub fn execution(
        run: RunKey,
        task_id: impl Into<String>,
        image: impl Into<String>,
        command: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        dataset_type: DatasetType,
    ) -> Self {
        Self {
            kind: JobKind::Execution,
            task_id: task_id.into(),
            dataset_id: run.dataset_id,
            vm_id: run.vm_id,
            run_id: run.run_id,
            image: image.into(),
            command: command.into(),
            output_dir: output_dir.into(),
            dataset_type,
            software_id: None,
            evaluator: None,
            ground_truth_dir: None,
            input_runs: Vec::new(),
            hf_models: Vec::new(),
            resources: ResourceLimits::default(),
            allow_network: false,
            git_id: None,
        }
    }

    /// Creates a descriptor that only evaluates `evaluated`
    ///
    /// `run` names the evaluation run being produced.
    pub fn evaluation(
        run: RunKey,
        task_id: impl Into<String>,
        evaluated: RunKey,
        evaluator: EvaluatorSoftware,
        output_dir: impl Into<PathBuf>,
        dataset_type: DatasetType,
    ) -> Self {
        Self {
            kind: JobKind::Evaluation,
            software_id: Some(EVALUATION_ONLY_SOFTWARE_ID.to_string()),
            evaluator: Some(evaluator),
            input_runs: vec![evaluated],
            ..Self::execution(
                run,
                task_id,
                EVALUATION_ONLY_IMAGE,
                EVALUATION_ONLY_COMMAND,
                output_dir,
                dataset_type,
            )
        }
    }

    pub fn run_key(&self) -> RunKey {
        RunKey::new(&self.dataset_id, &self.vm_id, &self.run_id)
    }

    pub fn is_evaluation(&self) -> bool {
        self.kind == JobKind::Evaluation
    }

    /// Dataset directory relative to the data root
    pub fn input_dataset_path(&self) -> String {
        format!(
            "{}-datasets/{}/{}/",
            self.dataset_type, self.task_id, self.dataset_id
        )
    }

    /// Ground-truth directory, relative to the data root unless overridden
    pub fn truth_path(&self) -> String {
        match &self.ground_truth_dir {
            Some(dir) => dir.to_string_lossy().to_string(),
            None => format!(
                "{}-datasets-truth/{}/{}/",
                self.dataset_type, self.task_id, self.dataset_id
            ),
        }
    }

    /// Directory receiving the task artifacts
    pub fn task_output_dir(&self) -> PathBuf {
        self.output_dir.join("output")
    }

    /// The run an evaluation descriptor evaluates
    pub fn evaluated_run(&self) -> Option<&RunKey> {
        match self.kind {
            JobKind::Evaluation => self.input_runs.first(),
            JobKind::Execution => None,
        }
    }

    /// Binds placeholders according to the kind of job
    ///
    /// Evaluations write to the evaluation output and read the ground truth
    /// as their input dataset.
    pub fn bindings(&self, paths: &JobPaths) -> PlaceholderBindings {
        match self.kind {
            JobKind::Execution => PlaceholderBindings {
                input_dataset: paths.input_dataset.clone(),
                output_dir: paths.output.clone(),
                input_run: paths.input_run.clone(),
            },
            JobKind::Evaluation => PlaceholderBindings {
                input_dataset: paths.ground_truth.clone(),
                output_dir: paths.eval_output.clone(),
                input_run: paths.input_run.clone(),
            },
        }
    }

    /// The command this job runs, with placeholders resolved
    pub fn resolved_command(&self, paths: &JobPaths) -> String {
        let template = match (&self.kind, &self.evaluator) {
            (JobKind::Evaluation, Some(evaluator)) => evaluator.command.as_str(),
            _ => self.command.as_str(),
        };
        self.bindings(paths).resolve(template)
    }

    /// The image this job runs
    pub fn resolved_image(&self) -> &str {
        match (&self.kind, &self.evaluator) {
            (JobKind::Evaluation, Some(evaluator)) => &evaluator.image,
            _ => &self.image,
        }
    }

    /// Checks the invariants that the type alone does not enforce
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut missing = Vec::new();
        for (key, value) in [
            (keys::TASK_ID, &self.task_id),
            (keys::DATASET_ID, &self.dataset_id),
            (keys::VM_ID, &self.vm_id),
            (keys::RUN_ID, &self.run_id),
            (keys::IMAGE, &self.image),
            (keys::COMMAND, &self.command),
        ] {
            if value.trim().is_empty() {
                missing.push(key.to_string());
            }
        }
        if self.output_dir.as_os_str().is_empty() {
            missing.push(keys::OUTPUT_DIR.to_string());
        }
        if !missing.is_empty() {
            return Err(DescriptorError::MissingKeys(missing));
        }

        match self.kind {
            JobKind::Evaluation => {
                if self.evaluator.is_none() {
                    return Err(DescriptorError::Inconsistent(
                        "an evaluation needs an evaluator image and command".to_string(),
                    ));
                }
                if self.input_runs.is_empty() {
                    return Err(DescriptorError::Inconsistent(
                        "an evaluation needs the run it evaluates".to_string(),
                    ));
                }
            }
            JobKind::Execution => {
                if self.software_id.as_deref() == Some(EVALUATION_ONLY_SOFTWARE_ID) {
                    return Err(DescriptorError::Inconsistent(format!(
                        "software id {} is reserved for evaluations",
                        EVALUATION_ONLY_SOFTWARE_ID
                    )));
                }
            }
        }

        Ok(())
    }

    // =============================================================================
    // Flat Representation
    // =============================================================================

    /// Flattens the descriptor into ordered `KEY=VALUE` entries
    pub fn to_entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(&str, String)> = vec![
            (keys::IMAGE, self.image.clone()),
            (keys::VM_ID, self.vm_id.clone()),
            (keys::COMMAND, self.command.clone()),
            (
                keys::SOFTWARE_ID,
                self.software_id.clone().unwrap_or_default(),
            ),
            (keys::DATASET_ID, self.dataset_id.clone()),
            (keys::TASK_ID, self.task_id.clone()),
            (keys::RUN_ID, self.run_id.clone()),
            (
                keys::OUTPUT_DIR,
                self.output_dir.to_string_lossy().to_string(),
            ),
            (keys::DATASET_TYPE, self.dataset_type.to_string()),
        ];

        if let Some(git_id) = &self.git_id {
            entries.push((keys::GIT_ID, git_id.clone()));
        }

        if let Some(evaluator) = &self.evaluator {
            entries.push((keys::EVALUATION_IMAGE, evaluator.image.clone()));
            entries.push((keys::EVALUATION_COMMAND, evaluator.command.clone()));
            if let Some(software_id) = &evaluator.software_id {
                entries.push((keys::EVALUATION_SOFTWARE_ID, software_id.clone()));
            }
        }

        if let Some(truth) = &self.ground_truth_dir {
            entries.push((keys::GROUND_TRUTH_DIR, truth.to_string_lossy().to_string()));
        }

        if let Some(first) = self.input_runs.first() {
            entries.push((keys::INPUT_RUN_DATASET_ID, first.dataset_id.clone()));
            entries.push((keys::INPUT_RUN_VM_ID, first.vm_id.clone()));
            entries.push((keys::INPUT_RUN_RUN_ID, first.run_id.clone()));
            let all: Vec<String> = self.input_runs.iter().map(RunKey::to_string).collect();
            entries.push((keys::INPUT_RUNS, all.join(";")));
        }

        if !self.hf_models.is_empty() {
            entries.push((keys::HF_MODELS, self.hf_models.join(" ")));
        }

        if let Some(cpu_count) = self.resources.cpu_count {
            entries.push((keys::CPU_COUNT, cpu_count.to_string()));
        }
        if let Some(memory) = self.resources.memory_gib {
            entries.push((keys::MEMORY_IN_GIBIBYTE, memory.to_string()));
        }
        entries.push((keys::GPU, self.resources.gpu.to_string()));

        if self.allow_network {
            entries.push((keys::ALLOW_NETWORK, "true".to_string()));
        }

        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    /// Builds a descriptor from flat entries
    ///
    /// Fails if any key occurs twice or a required key is absent; the error
    /// names every missing key at once.
    pub fn from_entries<K, V>(entries: &[(K, V)]) -> Result<Self, DescriptorError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map: HashMap<&str, &str> = HashMap::new();
        for (key, value) in entries {
            if map.insert(key.as_ref(), value.as_ref()).is_some() {
                return Err(DescriptorError::DuplicateKey(key.as_ref().to_string()));
            }
        }

        let missing: Vec<String> = keys::REQUIRED
            .iter()
            .filter(|key| !map.contains_key(*key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DescriptorError::MissingKeys(missing));
        }

        let get = |key: &str| map.get(key).map(|v| v.trim().to_string());
        let required = |key: &str| get(key).unwrap_or_default();

        let dataset_type_raw = required(keys::DATASET_TYPE);
        let dataset_type = DatasetType::parse(&dataset_type_raw)
            .ok_or_else(|| invalid(keys::DATASET_TYPE, &dataset_type_raw, "expected training or test"))?;

        let software_id = get(keys::SOFTWARE_ID).filter(|s| !s.is_empty());
        let kind = if software_id.as_deref() == Some(EVALUATION_ONLY_SOFTWARE_ID) {
            JobKind::Evaluation
        } else {
            JobKind::Execution
        };

        let evaluator = match (get(keys::EVALUATION_IMAGE), get(keys::EVALUATION_COMMAND)) {
            (Some(image), Some(command)) => Some(EvaluatorSoftware {
                image,
                command,
                software_id: get(keys::EVALUATION_SOFTWARE_ID),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(DescriptorError::MissingKeys(vec![
                    keys::EVALUATION_COMMAND.to_string(),
                ]));
            }
            (None, Some(_)) => {
                return Err(DescriptorError::MissingKeys(vec![
                    keys::EVALUATION_IMAGE.to_string(),
                ]));
            }
        };

        let input_runs = parse_input_runs(&get)?;

        let hf_models = get(keys::HF_MODELS)
            .map(|models| models.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let resources = ResourceLimits {
            cpu_count: parse_number(keys::CPU_COUNT, get(keys::CPU_COUNT))?,
            memory_gib: parse_number(keys::MEMORY_IN_GIBIBYTE, get(keys::MEMORY_IN_GIBIBYTE))?,
            gpu: match get(keys::GPU) {
                Some(raw) => GpuRequest::parse(&raw)
                    .ok_or_else(|| invalid(keys::GPU, &raw, "expected a count or device=<ids>"))?,
                None => GpuRequest::None,
            },
        };

        let allow_network = match get(keys::ALLOW_NETWORK) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                _ => return Err(invalid(keys::ALLOW_NETWORK, &raw, "expected a boolean")),
            },
            None => false,
        };

        let descriptor = Self {
            kind,
            task_id: required(keys::TASK_ID),
            dataset_id: required(keys::DATASET_ID),
            vm_id: required(keys::VM_ID),
            run_id: required(keys::RUN_ID),
            image: required(keys::IMAGE),
            command: required(keys::COMMAND),
            output_dir: PathBuf::from(required(keys::OUTPUT_DIR)),
            dataset_type,
            software_id,
            evaluator,
            ground_truth_dir: get(keys::GROUND_TRUTH_DIR).map(PathBuf::from),
            input_runs,
            hf_models,
            resources,
            allow_network,
            git_id: get(keys::GIT_ID),
        };

        descriptor.validate()?;
        Ok(descriptor)
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> DescriptorError {
    DescriptorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number(key: &str, raw: Option<String>) -> Result<Option<u32>, DescriptorError> {
    match raw {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| invalid(key, &raw, "expected a non-negative integer")),
    }
}

fn parse_input_runs(
    get: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<RunKey>, DescriptorError> {
    if let Some(all) = get(keys::INPUT_RUNS).filter(|s| !s.is_empty()) {
        return all
            .split(';')
            .map(|triple| {
                RunKey::parse(triple)
                    .ok_or_else(|| invalid(keys::INPUT_RUNS, triple, "expected dataset/vm/run"))
            })
            .collect();
    }

    let single = (
        get(keys::INPUT_RUN_DATASET_ID),
        get(keys::INPUT_RUN_VM_ID),
        get(keys::INPUT_RUN_RUN_ID),
    );
    match single {
        (None, None, None) => Ok(Vec::new()),
        (Some(dataset), Some(vm), Some(run)) => Ok(vec![RunKey::new(dataset, vm, run)]),
        (dataset, vm, run) => {
            let missing = [
                (keys::INPUT_RUN_DATASET_ID, dataset.is_none()),
                (keys::INPUT_RUN_VM_ID, vm.is_none()),
                (keys::INPUT_RUN_RUN_ID, run.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(key, _)| key.to_string())
            .collect();
            Err(DescriptorError::MissingKeys(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> JobDescriptor {
        JobDescriptor::execution(
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            "task-1",
            "docker.io/team/software:1",
            "/run.sh --in $inputDataset --out $outputDir",
            "/runs/dataset-1/vm-1/2024-01-01-10-00-00",
            DatasetType::Test,
        )
    }

    fn evaluator() -> EvaluatorSoftware {
        EvaluatorSoftware {
            image: "evaluator:latest".to_string(),
            command: "evaluate --run ${inputRun} --truth $inputDataset --out $outputDir".to_string(),
            software_id: Some("ev-1".to_string()),
        }
    }

    fn paths() -> JobPaths {
        JobPaths {
            input_dataset: "/tira-data/input".to_string(),
            ground_truth: "/tira-data/input-truth".to_string(),
            output: "/tira-data/output".to_string(),
            eval_output: "/tira-data/eval_output".to_string(),
            input_run: Some("/tira-data/input-run".to_string()),
        }
    }

    #[test]
    fn test_derived_dataset_paths() {
        let job = execution();
        assert_eq!(job.input_dataset_path(), "test-datasets/task-1/dataset-1/");
        assert_eq!(job.truth_path(), "test-datasets-truth/task-1/dataset-1/");
    }

    #[test]
    fn test_execution_bindings() {
        let command = execution().resolved_command(&paths());
        assert_eq!(
            command,
            "/run.sh --in /tira-data/input --out /tira-data/output"
        );
    }

    #[test]
    fn test_evaluation_bindings_use_truth_and_eval_output() {
        let job = JobDescriptor::evaluation(
            RunKey::new("dataset-1", "vm-1", "2024-01-02-10-00-00"),
            "task-1",
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            evaluator(),
            "/runs/eval",
            DatasetType::Test,
        );

        assert!(job.validate().is_ok());
        assert_eq!(job.resolved_image(), "evaluator:latest");
        assert_eq!(
            job.resolved_command(&paths()),
            "evaluate --run /tira-data/input-run --truth /tira-data/input-truth --out /tira-data/eval_output"
        );
    }

    #[test]
    fn test_unbound_placeholder_is_kept() {
        let bindings = PlaceholderBindings {
            input_dataset: "/in".to_string(),
            output_dir: "/out".to_string(),
            input_run: None,
        };
        assert_eq!(bindings.resolve("cp $inputRun $outputDir"), "cp $inputRun /out");
    }

    #[test]
    fn test_entries_round_trip() {
        let mut job = execution();
        job.software_id = Some("sw-1".to_string());
        job.input_runs = vec![
            RunKey::new("dataset-2", "vm-1", "run-3"),
            RunKey::new("dataset-2", "vm-2", "run-4"),
        ];
        job.hf_models = vec!["bert-base-uncased".to_string(), "org/model".to_string()];
        job.resources = ResourceLimits {
            cpu_count: Some(2),
            memory_gib: Some(10),
            gpu: GpuRequest::Devices(vec!["0".to_string(), "1".to_string()]),
        };

        let parsed = JobDescriptor::from_entries(&job.to_entries()).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_evaluation_kind_comes_from_reserved_software_id() {
        let job = JobDescriptor::evaluation(
            RunKey::new("dataset-1", "vm-1", "eval-run"),
            "task-1",
            RunKey::new("dataset-1", "vm-1", "run-1"),
            evaluator(),
            "/runs/eval",
            DatasetType::Training,
        );
        let entries = job.to_entries();
        assert!(entries.contains(&(keys::SOFTWARE_ID.to_string(), "-1".to_string())));
        assert!(entries.contains(&(keys::IMAGE.to_string(), EVALUATION_ONLY_IMAGE.to_string())));

        let parsed = JobDescriptor::from_entries(&entries).unwrap();
        assert!(parsed.is_evaluation());
        assert_eq!(
            parsed.evaluated_run(),
            Some(&RunKey::new("dataset-1", "vm-1", "run-1"))
        );
    }

    #[test]
    fn test_missing_keys_are_all_named() {
        let entries = vec![(keys::TASK_ID, "task-1")];
        let err = JobDescriptor::from_entries(&entries).unwrap_err();
        match err {
            DescriptorError::MissingKeys(missing) => {
                assert!(missing.contains(&keys::IMAGE.to_string()));
                assert!(missing.contains(&keys::COMMAND.to_string()));
                assert!(!missing.contains(&keys::TASK_ID.to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut entries = execution().to_entries();
        entries.push((keys::TASK_ID.to_string(), "task-2".to_string()));
        assert_eq!(
            JobDescriptor::from_entries(&entries).unwrap_err(),
            DescriptorError::DuplicateKey(keys::TASK_ID.to_string())
        );
    }

    #[test]
    fn test_evaluation_without_evaluator_is_inconsistent() {
        let mut entries: Vec<(String, String)> = execution()
            .to_entries()
            .into_iter()
            .filter(|(key, _)| key != keys::SOFTWARE_ID)
            .collect();
        entries.push((keys::SOFTWARE_ID.to_string(), "-1".to_string()));

        assert!(matches!(
            JobDescriptor::from_entries(&entries),
            Err(DescriptorError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_gpu_request_parse() {
        assert_eq!(GpuRequest::parse("0"), Some(GpuRequest::None));
        assert_eq!(GpuRequest::parse("2"), Some(GpuRequest::Count(2)));
        assert_eq!(
            GpuRequest::parse("device=1,3"),
            Some(GpuRequest::Devices(vec!["1".to_string(), "3".to_string()]))
        );
        assert_eq!(GpuRequest::parse("device="), None);
        assert_eq!(GpuRequest::parse("many"), None);
    }
}
