//! Runner configuration
//!
//! Defines where the runner finds datasets and runs, how it reaches the
//! coordinator and the CI platform, and how many jobs of each resource class
//! it runs at once.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Coordinator base URL (e.g., "http://localhost:8080")
    pub coordinator_url: String,

    /// Container runtime binary, `podman` or `docker`
    pub container_runtime: String,

    /// Scratch space for staged inputs
    pub scratch_dir: PathBuf,

    /// Root holding `<type>-datasets/` and `<type>-datasets-truth/`
    pub data_dir: PathBuf,

    /// Root holding `<dataset>/<vm>/<run>/` run directories
    pub runs_dir: PathBuf,

    /// Hugging Face home, models are looked up below `<hf_home>/hub`
    pub hf_home: PathBuf,

    /// Jobs requesting a GPU that may run at once
    pub gpu_workers: usize,

    /// Jobs without a GPU that may run at once
    pub general_workers: usize,

    /// Checkout of the CI repository
    pub ci_repo_dir: PathBuf,

    /// Branch the CI job branches are merged back into
    pub ci_trunk: String,

    /// GitLab-compatible API base URL (e.g., "https://git.example.org/api/v4")
    pub ci_api_url: Option<String>,

    /// Private token of the CI API
    pub ci_token: Option<String>,

    /// Project id of the CI repository on the CI platform
    pub ci_project_id: Option<String>,

    /// Pipeline the persistence step runs in
    pub ci_pipeline_id: Option<String>,

    /// Upper bound of the delay between confirmation attempts
    pub confirm_backoff_max: Duration,
}

impl Config {
    /// Creates a configuration with defaults for the given coordinator
    pub fn new(coordinator_url: String) -> Self {
        Self {
            coordinator_url,
            container_runtime: "podman".to_string(),
            scratch_dir: std::env::temp_dir().join("tira-scratch"),
            data_dir: PathBuf::from("./data"),
            runs_dir: PathBuf::from("./runs"),
            hf_home: default_hf_home(),
            gpu_workers: 1,
            general_workers: 2,
            ci_repo_dir: PathBuf::from("."),
            ci_trunk: "main".to_string(),
            ci_api_url: None,
            ci_token: None,
            ci_project_id: None,
            ci_pipeline_id: None,
            confirm_backoff_max: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TIRA_COORDINATOR_URL (default: http://localhost:8080)
    /// - TIRA_CONTAINER_RUNTIME (default: podman)
    /// - TIRA_SCRATCH_DIR, TIRA_DATA_DIR, TIRA_RUNS_DIR, TIRA_HF_HOME
    /// - TIRA_GPU_WORKERS (default: 1), TIRA_GENERAL_WORKERS (default: 2)
    /// - TIRA_CI_REPO_DIR, TIRA_CI_TRUNK, TIRA_CI_API_URL, TIRA_CI_TOKEN
    /// - CI_PROJECT_ID, CI_PIPELINE_ID (set by the CI platform)
    /// - TIRA_CONFIRM_BACKOFF_MAX (seconds, default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new(
            std::env::var("TIRA_COORDINATOR_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        );

        let path = |name: &str, default: PathBuf| {
            std::env::var(name).map(PathBuf::from).unwrap_or(default)
        };
        let count = |name: &str, default: usize| -> anyhow::Result<usize> {
            match std::env::var(name) {
                Ok(value) => value
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("{} must be a number, got {:?}", name, value)),
                Err(_) => Ok(default),
            }
        };

        let confirm_backoff_max = std::env::var("TIRA_CONFIRM_BACKOFF_MAX")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.confirm_backoff_max);

        Ok(Self {
            container_runtime: std::env::var("TIRA_CONTAINER_RUNTIME")
                .unwrap_or(defaults.container_runtime.clone()),
            scratch_dir: path("TIRA_SCRATCH_DIR", defaults.scratch_dir.clone()),
            data_dir: path("TIRA_DATA_DIR", defaults.data_dir.clone()),
            runs_dir: path("TIRA_RUNS_DIR", defaults.runs_dir.clone()),
            hf_home: path("TIRA_HF_HOME", defaults.hf_home.clone()),
            gpu_workers: count("TIRA_GPU_WORKERS", defaults.gpu_workers)?,
            general_workers: count("TIRA_GENERAL_WORKERS", defaults.general_workers)?,
            ci_repo_dir: path("TIRA_CI_REPO_DIR", defaults.ci_repo_dir.clone()),
            ci_trunk: std::env::var("TIRA_CI_TRUNK").unwrap_or(defaults.ci_trunk.clone()),
            ci_api_url: std::env::var("TIRA_CI_API_URL").ok(),
            ci_token: std::env::var("TIRA_CI_TOKEN").ok(),
            ci_project_id: std::env::var("CI_PROJECT_ID").ok(),
            ci_pipeline_id: std::env::var("CI_PIPELINE_ID").ok(),
            confirm_backoff_max,
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.coordinator_url.starts_with("http://")
            && !self.coordinator_url.starts_with("https://")
        {
            anyhow::bail!("coordinator_url must start with http:// or https://");
        }

        if !matches!(self.container_runtime.as_str(), "podman" | "docker") {
            anyhow::bail!(
                "container_runtime must be podman or docker, got {:?}",
                self.container_runtime
            );
        }

        if self.general_workers == 0 {
            anyhow::bail!("general_workers must be greater than 0");
        }

        if let Some(url) = &self.ci_api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("ci_api_url must start with http:// or https://");
            }
        }

        Ok(())
    }

    /// Output directory of a stored run
    pub fn run_output_dir(&self, run: &tira_core::domain::run::RunKey) -> PathBuf {
        self.runs_dir
            .join(&run.dataset_id)
            .join(&run.vm_id)
            .join(&run.run_id)
            .join(tira_core::domain::diagnostics::OUTPUT_DIR)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8080".to_string())
    }
}

fn default_hf_home() -> PathBuf {
    match std::env::var("HF_HOME") {
        Ok(home) => PathBuf::from(home),
        Err(_) => std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".cache").join("huggingface"))
            .unwrap_or_else(|_| PathBuf::from(".cache/huggingface")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tira_core::domain::run::RunKey;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.container_runtime, "podman");
        assert_eq!(config.general_workers, 2);
        assert_eq!(config.ci_trunk, "main");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.coordinator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.coordinator_url = "http://localhost:8080".to_string();

        config.container_runtime = "lxc".to_string();
        assert!(config.validate().is_err());
        config.container_runtime = "docker".to_string();
        assert!(config.validate().is_ok());

        config.general_workers = 0;
        assert!(config.validate().is_err());
        config.general_workers = 1;

        config.ci_api_url = Some("git.example.org".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_output_dir() {
        let mut config = Config::default();
        config.runs_dir = PathBuf::from("/runs");
        assert_eq!(
            config.run_output_dir(&RunKey::new("d", "v", "r")),
            PathBuf::from("/runs/d/v/r/output")
        );
    }
}
