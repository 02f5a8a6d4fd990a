//! Container runtime invocation
//!
//! Builds the `podman run` (or `docker run`) argument list of a job and runs
//! it to completion. A non-zero exit code is captured in [`ContainerOutput`],
//! never raised, so the diagnostics of a failed job can still be written.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tira_core::domain::descriptor::{GpuRequest, ResourceLimits};
use tracing::{debug, info, warn};

/// Container path of the input dataset
pub const INPUT_MOUNT: &str = "/tira-data/input";
/// Container path of the job output
pub const OUTPUT_MOUNT: &str = "/tira-data/output";
/// Container path of the previous-stage run
pub const INPUT_RUN_MOUNT: &str = "/tira-data/input-run";
/// Container path of the ground truth
pub const TRUTH_MOUNT: &str = "/tira-data/input-truth";

/// A host directory bound into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl Volume {
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }

    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    fn arg(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host.display(),
            self.container,
            if self.read_only { "ro" } else { "rw" }
        )
    }
}

/// Everything the runtime needs to start one job container
#[derive(Debug, Clone)]
pub struct ContainerInvocation {
    pub image: String,
    pub command: String,
    volumes: Vec<Volume>,
    env: Vec<(String, String)>,
    pub resources: ResourceLimits,
    pub allow_network: bool,
}

impl ContainerInvocation {
    pub fn new(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: command.into(),
            volumes: Vec::new(),
            env: Vec::new(),
            resources: ResourceLimits::default(),
            allow_network: false,
        }
    }

    /// Adds a volume, rejecting a second volume at the same container path
    pub fn mount(&mut self, volume: Volume) -> Result<()> {
        if self.volumes.iter().any(|v| v.container == volume.container) {
            anyhow::bail!(
                "Container path {} is mounted twice (second source: {})",
                volume.container,
                volume.host.display()
            );
        }
        self.volumes.push(volume);
        Ok(())
    }

    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.push((key.into(), value.into()));
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    /// Arguments following the runtime binary
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if !self.allow_network {
            args.extend(["--network".to_string(), "none".to_string()]);
        }
        if let Some(cpus) = self.resources.cpu_count {
            args.extend(["--cpus".to_string(), cpus.to_string()]);
        }
        if let Some(memory) = self.resources.memory_gib {
            args.extend(["--memory".to_string(), format!("{}g", memory)]);
        }
        match &self.resources.gpu {
            GpuRequest::None => {}
            GpuRequest::Count(n) => args.extend(["--gpus".to_string(), n.to_string()]),
            GpuRequest::Devices(ids) => {
                for id in ids {
                    args.extend(["--device".to_string(), format!("nvidia.com/gpu={}", id)]);
                }
            }
        }

        for volume in &self.volumes {
            args.extend(["-v".to_string(), volume.arg()]);
        }
        for (key, value) in &self.env {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }

        args.extend([
            "--entrypoint".to_string(),
            "sh".to_string(),
            self.image.clone(),
            "-c".to_string(),
            format!("{}; sleep .1", self.command),
        ]);
        args
    }
}

/// Captured result of a finished container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ContainerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Container runtime binary
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    binary: String,
}

impl ContainerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs a container to completion
    ///
    /// Only a failure to start the runtime binary is an error.
    pub fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput> {
        let args = invocation.args();
        info!("Running {} in {}", invocation.image, self.binary);
        debug!("{} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to execute {} run", self.binary))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            debug!(
                "Container finished: stdout_len={}, stderr_len={}",
                stdout.len(),
                stderr.len()
            );
        } else {
            warn!(
                "Container for image {} exited with code {}",
                invocation.image, exit_code
            );
        }

        Ok(ContainerOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_disable_network_by_default() {
        let mut invocation = ContainerInvocation::new("alpine", "ls $inputDataset");
        invocation
            .mount(Volume::read_only("/data/in", INPUT_MOUNT))
            .unwrap();
        invocation
            .mount(Volume::read_write("/data/out", OUTPUT_MOUNT))
            .unwrap();
        invocation.env("outputDir", OUTPUT_MOUNT);

        assert_eq!(
            invocation.args(),
            vec![
                "run",
                "--rm",
                "--network",
                "none",
                "-v",
                "/data/in:/tira-data/input:ro",
                "-v",
                "/data/out:/tira-data/output:rw",
                "-e",
                "outputDir=/tira-data/output",
                "--entrypoint",
                "sh",
                "alpine",
                "-c",
                "ls $inputDataset; sleep .1",
            ]
        );
    }

    #[test]
    fn test_args_carry_resource_limits() {
        let mut invocation = ContainerInvocation::new("alpine", "true");
        invocation.allow_network = true;
        invocation.resources = ResourceLimits {
            cpu_count: Some(2),
            memory_gib: Some(10),
            gpu: GpuRequest::Devices(vec!["0".to_string(), "3".to_string()]),
        };

        let args = invocation.args().join(" ");
        assert!(!args.contains("--network"));
        assert!(args.contains("--cpus 2"));
        assert!(args.contains("--memory 10g"));
        assert!(args.contains("--device nvidia.com/gpu=0 --device nvidia.com/gpu=3"));

        invocation.resources.gpu = GpuRequest::Count(1);
        assert!(invocation.args().join(" ").contains("--gpus 1"));
    }

    #[test]
    fn test_duplicate_container_path_is_rejected() {
        let mut invocation = ContainerInvocation::new("alpine", "true");
        invocation
            .mount(Volume::read_only("/a", "/models"))
            .unwrap();
        let err = invocation
            .mount(Volume::read_only("/b", "/models"))
            .unwrap_err();
        assert!(err.to_string().contains("/models"));
        assert_eq!(invocation.volumes().len(), 1);
    }

    #[test]
    fn test_missing_runtime_binary_is_an_error() {
        let runtime = ContainerRuntime::new("tira-no-such-container-runtime");
        assert!(runtime.run(&ContainerInvocation::new("alpine", "true")).is_err());
    }
}
