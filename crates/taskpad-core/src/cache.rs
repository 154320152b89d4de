use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::Task;
use crate::view::Tab;

/// UI state remembered between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub active_tab: Tab,
    #[serde(default)]
    pub sidebar_collapsed: bool,
}

/// Best-effort local copies of server data. Nothing here is
/// authoritative; it only backs offline display and preferences.
#[derive(Debug)]
pub struct LocalCache {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub prefs_path: PathBuf,
}

impl LocalCache {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let prefs_path = data_dir.join("prefs.json");

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            prefs = %prefs_path.display(),
            "opened local cache"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            prefs_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        Ok(load_json(&self.tasks_path)
            .context("failed to load tasks.json")?
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_json_atomic(&self.tasks_path, &tasks).context("failed to save tasks.json")
    }

    pub fn find_task(&self, id: &str) -> anyhow::Result<Option<Task>> {
        Ok(self.load_tasks()?.into_iter().find(|task| task.id == id))
    }

    /// Replaces the cached task with the same id or appends it.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn upsert_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut tasks = self.load_tasks()?;
        match tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.save_tasks(&tasks)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_task(&self, id: &str) -> anyhow::Result<()> {
        let mut tasks = self.load_tasks()?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        debug!(before, after = tasks.len(), "removed task from cache");
        self.save_tasks(&tasks)
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_tasks(&self) -> anyhow::Result<()> {
        if self.tasks_path.exists() {
            fs::remove_file(&self.tasks_path)
                .with_context(|| format!("failed removing {}", self.tasks_path.display()))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_prefs(&self) -> anyhow::Result<Preferences> {
        Ok(load_json(&self.prefs_path)
            .context("failed to load prefs.json")?
            .unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub fn save_prefs(&self, prefs: &Preferences) -> anyhow::Result<()> {
        save_json_atomic(&self.prefs_path, prefs).context("failed to save prefs.json")
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        debug!(file = %path.display(), "cache file missing");
        return Ok(None);
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    Ok(Some(value))
}

fn save_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
