//! GitLab-compatible CI platform
//!
//! Branches are created and merged with the `git` CLI against a local checkout
//! of the CI repository; pipelines and job logs come from the GitLab REST API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ACTIVE_PIPELINE_STATES, CiPlatform};

/// CI platform over a git checkout and the GitLab API
pub struct GitLabPlatform {
    repo_dir: PathBuf,
    trunk: String,
    api_url: String,
    token: String,
    project_id: String,
    pipeline_id: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Pipeline {
    #[serde(rename = "ref")]
    pipeline_ref: String,
}

#[derive(Debug, Deserialize)]
struct Job {
    id: u64,
    name: String,
}

impl GitLabPlatform {
    /// Creates the platform
    ///
    /// # Arguments
    /// * `repo_dir` - Local checkout of the CI repository
    /// * `trunk` - Branch job branches are merged into
    /// * `api_url` - API base URL, e.g. `https://git.example.org/api/v4`
    /// * `token` - Private token with API and repository access
    /// * `project_id` - Project id of the CI repository
    /// * `pipeline_id` - Current pipeline, needed for job logs only
    pub fn new(
        repo_dir: PathBuf,
        trunk: String,
        api_url: String,
        token: String,
        project_id: String,
        pipeline_id: Option<String>,
    ) -> Self {
        Self {
            repo_dir,
            trunk,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            project_id,
            pipeline_id,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/projects/{}/{}", self.api_url, self.project_id, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("{} answered {}", url, response.status());
        }
        Ok(response)
    }

    fn scratch_dir(&self) -> PathBuf {
        std::env::temp_dir().join(format!("tira-ci-{}", Uuid::new_v4()))
    }

    /// Merges `origin/<branch>` into the trunk of `dir` and pushes the trunk
    async fn merge_in(&self, dir: &Path, branch: &str) -> Result<()> {
        git(dir, &["fetch", "origin", &self.trunk, branch]).await?;
        git(dir, &["checkout", &self.trunk]).await?;
        git(dir, &["reset", "--hard", &format!("origin/{}", self.trunk)]).await?;
        git(
            dir,
            &[
                "merge",
                "--no-ff",
                "-m",
                &format!("Merge {} [skip ci]", branch),
                &format!("origin/{}", branch),
            ],
        )
        .await?;
        git(dir, &["push", "-o", "ci.skip", "origin", &self.trunk]).await?;
        Ok(())
    }
}

/// Runs `git -C <dir> <args>`, returning stdout
async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    debug!("git -C {} {:?}", dir.display(), args);
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .context("Failed to execute git")?;

    if !output.status.success() {
        anyhow::bail!(
            "git {} failed with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[async_trait]
impl CiPlatform for GitLabPlatform {
    async fn active_pipeline_refs(&self) -> Result<Vec<String>> {
        let mut refs = Vec::new();
        for status in ACTIVE_PIPELINE_STATES {
            let pipelines: Vec<Pipeline> = self
                .get(&format!("pipelines?status={}&per_page=100", status))
                .await?
                .json()
                .await
                .context("Failed to parse pipelines")?;
            refs.extend(pipelines.into_iter().map(|p| p.pipeline_ref));
        }
        Ok(refs)
    }

    async fn push_job_branch(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()> {
        let worktree = self.scratch_dir();
        let worktree_arg = worktree.to_string_lossy().to_string();

        git(&self.repo_dir, &["fetch", "origin", &self.trunk]).await?;
        git(
            &self.repo_dir,
            &[
                "worktree",
                "add",
                "-b",
                branch,
                &worktree_arg,
                &format!("origin/{}", self.trunk),
            ],
        )
        .await?;

        let result = async {
            let file = worktree.join(path);
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file, content)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            git(&worktree, &["add", path]).await?;
            git(&worktree, &["commit", "-m", message]).await?;
            git(&worktree, &["push", "origin", branch]).await?;
            Ok::<(), anyhow::Error>(())
        }
        .await;

        git(&self.repo_dir, &["worktree", "remove", "--force", &worktree_arg]).await?;
        result?;

        info!("Pushed branch {}", branch);
        Ok(())
    }

    async fn merge_in_place(&self, branch: &str) -> Result<()> {
        self.merge_in(&self.repo_dir, branch).await
    }

    async fn merge_from_fresh_clone(&self, branch: &str) -> Result<()> {
        let remote = git(&self.repo_dir, &["remote", "get-url", "origin"]).await?;
        let clone = self.scratch_dir();
        let clone_arg = clone.to_string_lossy().to_string();

        let output = Command::new("git")
            .args(["clone", remote.trim(), clone_arg.as_str()])
            .output()
            .await
            .context("Failed to execute git clone")?;
        if !output.status.success() {
            anyhow::bail!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let result = self.merge_in(&clone, branch).await;
        tokio::fs::remove_dir_all(&clone)
            .await
            .with_context(|| format!("Failed to remove {}", clone.display()))?;
        result
    }

    async fn job_log(&self, job_name: &str) -> Result<String> {
        let pipeline_id = self
            .pipeline_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("CI_PIPELINE_ID is not set"))?;

        let jobs: Vec<Job> = self
            .get(&format!("pipelines/{}/jobs?per_page=100", pipeline_id))
            .await?
            .json()
            .await
            .context("Failed to parse pipeline jobs")?;
        let job = jobs
            .into_iter()
            .find(|job| job.name == job_name)
            .ok_or_else(|| anyhow::anyhow!("No job {} in pipeline {}", job_name, pipeline_id))?;

        self.get(&format!("jobs/{}/trace", job.id))
            .await?
            .text()
            .await
            .context("Failed to read job log")
    }
}
