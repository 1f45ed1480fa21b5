use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::schedule::ScheduleSnapshot;

/// Durable copy of the last-seen schedule, shared between runs through a
/// single JSON file.
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing cache file is a first run, not an error.
    pub fn load(&self) -> Result<Option<ScheduleSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache: {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache: {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Write-to-temp then rename, so a crash mid-write cannot leave a
    /// half-written snapshot behind.
    pub fn save(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .with_context(|| format!("Failed to write cache: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache: {}", self.path.display()))?;
        Ok(())
    }
}
