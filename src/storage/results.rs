//! JSON result files keyed by job id

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{ForecastError, Result};
use crate::types::ForecastResult;

/// One persisted forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub result: ForecastResult,
}

/// Writes one `<job_id>.json` file per forecast under a directory
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist under a fresh job id and return it
    pub async fn save(&self, result: &ForecastResult) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stored = StoredResult {
            job_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            result: result.clone(),
        };
        let path = self.path_for(&stored.job_id)?;
        let json = serde_json::to_string_pretty(&stored)?;
        tokio::fs::write(&path, json).await?;

        tracing::debug!("Saved forecast for {} as job {}", result.metadata.symbol, stored.job_id);
        Ok(stored.job_id)
    }

    /// `None` when no result exists for `job_id`
    pub async fn load(&self, job_id: &str) -> Result<Option<StoredResult>> {
        let path = self.path_for(job_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Job ids are uuids; anything else would escape the directory
    fn path_for(&self, job_id: &str) -> Result<PathBuf> {
        let id = Uuid::parse_str(job_id)
            .map_err(|_| ForecastError::Validation(format!("invalid job id '{}'", job_id)))?;
        Ok(self.dir.join(format!("{}.json", id)))
    }
}
