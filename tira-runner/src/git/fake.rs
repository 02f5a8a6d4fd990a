//! In-memory CI platform for tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::CiPlatform;

#[derive(Debug, Default)]
struct State {
    active_refs: Vec<String>,
    pushed: Vec<(String, String, String)>,
    merged: Vec<String>,
    fail_in_place: bool,
    fresh_clone_failures_left: u32,
    fresh_clone_attempts: u32,
    job_logs: HashMap<String, String>,
}

/// Records every call, pushes show up as active pipelines
#[derive(Debug, Default)]
pub struct FakeCiPlatform {
    state: Mutex<State>,
}

impl FakeCiPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_active_ref(&self, pipeline_ref: &str) {
        self.state.lock().unwrap().active_refs.push(pipeline_ref.to_string());
    }

    pub fn add_job_log(&self, job_name: &str, log: &str) {
        self.state
            .lock()
            .unwrap()
            .job_logs
            .insert(job_name.to_string(), log.to_string());
    }

    pub fn fail_in_place_merges(&self) {
        self.state.lock().unwrap().fail_in_place = true;
    }

    pub fn fail_fresh_clone_merges(&self, times: u32) {
        self.state.lock().unwrap().fresh_clone_failures_left = times;
    }

    /// Pushed `(branch, path, content)` triples
    pub fn pushed(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().pushed.clone()
    }

    pub fn merged(&self) -> Vec<String> {
        self.state.lock().unwrap().merged.clone()
    }

    pub fn fresh_clone_attempts(&self) -> u32 {
        self.state.lock().unwrap().fresh_clone_attempts
    }
}

#[async_trait]
impl CiPlatform for FakeCiPlatform {
    async fn active_pipeline_refs(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().active_refs.clone())
    }

    async fn push_job_branch(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        _message: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .pushed
            .push((branch.to_string(), path.to_string(), content.to_string()));
        state.active_refs.push(branch.to_string());
        Ok(())
    }

    async fn merge_in_place(&self, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_in_place {
            anyhow::bail!("in-place merge of {} rejected", branch);
        }
        state.merged.push(branch.to_string());
        Ok(())
    }

    async fn merge_from_fresh_clone(&self, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.fresh_clone_attempts += 1;
        if state.fresh_clone_failures_left > 0 {
            state.fresh_clone_failures_left -= 1;
            anyhow::bail!("clone of the repository failed");
        }
        state.merged.push(branch.to_string());
        Ok(())
    }

    async fn job_log(&self, job_name: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .job_logs
            .get(job_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no job named {}", job_name))
    }
}
