//! Run and review endpoints

use tira_core::domain::review::Review;
use tira_core::domain::run::{Run, RunKey};
use tira_core::dto::run::CreateRun;

use crate::CoordinatorClient;
use crate::error::Result;

impl CoordinatorClient {
    /// Create a run, the coordinator generates its run id
    pub async fn create_run(&self, req: CreateRun) -> Result<Run> {
        let url = format!("{}/v1/run", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a run with its lifecycle state
    pub async fn get_run(&self, key: &RunKey) -> Result<Run> {
        let url = format!("{}/v1/run/{}", self.base_url, key);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the review of a run, created by the auto-reviewer on first request
    pub async fn get_review(&self, key: &RunKey) -> Result<Review> {
        let url = format!("{}/v1/run/{}/review", self.base_url, key);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
