//! Hugging Face model cache
//!
//! Resolves model ids like `org/name` to their directory below
//! `<hf_home>/hub`. The hub is scanned once and kept until
//! [`HfCache::invalidate`] is called.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::container::Volume;

const MODEL_DIR_PREFIX: &str = "models--";

#[derive(Debug)]
pub struct HfCache {
    hub: PathBuf,
    models: Option<BTreeSet<String>>,
}

impl HfCache {
    pub fn new(hf_home: &Path) -> Self {
        Self {
            hub: hf_home.join("hub"),
            models: None,
        }
    }

    /// Model ids present in the hub
    pub fn models(&mut self) -> Result<&BTreeSet<String>> {
        let models = match self.models.take() {
            Some(models) => models,
            None => {
                let scanned = scan(&self.hub)?;
                debug!("Found {} model(s) in {}", scanned.len(), self.hub.display());
                scanned
            }
        };
        Ok(&*self.models.insert(models))
    }

    /// Read-only mount of one model, at the same path inside the container
    pub fn mount(&mut self, model_id: &str) -> Result<Volume> {
        if !self.models()?.contains(model_id) {
            anyhow::bail!(
                "The Hugging Face model {} is not available in {}",
                model_id,
                self.hub.display()
            );
        }

        let dir = self.hub.join(model_dir_name(model_id));
        let container = dir.to_string_lossy().to_string();
        Ok(Volume::read_only(dir, container))
    }

    /// Forgets the scanned models, the next lookup scans again
    pub fn invalidate(&mut self) {
        self.models = None;
    }
}

/// `org/name` is stored as `models--org--name`
fn model_dir_name(model_id: &str) -> String {
    format!("{}{}", MODEL_DIR_PREFIX, model_id.replace('/', "--"))
}

fn scan(hub: &Path) -> Result<BTreeSet<String>> {
    let mut models = BTreeSet::new();
    if !hub.is_dir() {
        return Ok(models);
    }

    let entries =
        std::fs::read_dir(hub).with_context(|| format!("Failed to list {}", hub.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", hub.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(id) = name.strip_prefix(MODEL_DIR_PREFIX) {
            models.insert(id.replace("--", "/"));
        }
    }

    Ok(models)
}
