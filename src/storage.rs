//! On-disk persistence: per-run result logs and summaries under `logs/`, and
//! operator-saved named configurations under `configs/`. Everything is plain
//! JSON files so runs remain inspectable without the service.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::fs;
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::TestSession;

#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Storage { root: root.into() }
    }

    fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    fn configs_dir(&self) -> PathBuf {
        self.root.join("configs")
    }

    /// Writes the full session (uncapped bodies included) plus a compact
    /// summary used by the history listing.
    pub async fn save_run(&self, session: &TestSession) -> Result<(), StorageError> {
        let dir = self.logs_dir();
        fs::create_dir_all(&dir).await?;

        // short id suffix keeps runs finishing in the same second distinct
        let stamp = format!(
            "{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &session.session_id.to_string()[..8]
        );

        let full = serde_json::to_vec_pretty(session)?;
        fs::write(dir.join(format!("load_test_{stamp}.json")), full).await?;

        let summary = json!({
            "session_id": session.session_id,
            "timestamp": stamp,
            "config": session.config,
            "stats": session.stats,
            "status": session.status,
        });
        fs::write(
            dir.join(format!("summary_{stamp}.json")),
            serde_json::to_vec_pretty(&summary)?,
        )
        .await?;
        Ok(())
    }

    /// All persisted run summaries, newest first. Unreadable files are
    /// skipped rather than failing the listing.
    pub async fn history(&self) -> Result<Vec<Value>, StorageError> {
        let mut summaries = Vec::new();
        let mut entries = match fs::read_dir(self.logs_dir()).await {
            Ok(entries) => entries,
            Err(_) => return Ok(summaries),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("summary_") || !name.ends_with(".json") {
                continue;
            }
            if let Some(summary) = read_json(&entry.path()).await {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| text_field(b, "timestamp").cmp(&text_field(a, "timestamp")));
        Ok(summaries)
    }

    /// Saves or updates a named configuration document. Creation rejects
    /// duplicate names; updates are addressed by id and follow a rename.
    pub async fn save_config(&self, mut doc: Value) -> Result<Value, StorageError> {
        let dir = self.configs_dir();
        fs::create_dir_all(&dir).await?;

        let obj = doc.as_object().ok_or(StorageError::InvalidDocument)?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("config_{}", Utc::now().format("%Y%m%d_%H%M%S")));
        let id = obj.get("id").and_then(Value::as_str).map(str::to_owned);
        let now = Utc::now().to_rfc3339();

        if let Some(id) = id {
            let (path, existing) = self
                .find_config(&id)
                .await?
                .ok_or(StorageError::ConfigNotFound)?;
            let created_at = existing
                .get("created_at")
                .cloned()
                .unwrap_or_else(|| json!(now));

            let obj = doc.as_object_mut().expect("checked above");
            obj.insert("name".into(), json!(name));
            obj.insert("saved_at".into(), json!(now));
            obj.insert("created_at".into(), created_at);

            let filename = config_filename(&name);
            let new_path = dir.join(&filename);
            fs::write(&new_path, serde_json::to_vec_pretty(&doc)?).await?;
            if new_path != path {
                let _ = fs::remove_file(&path).await;
            }
            return Ok(json!({ "status": "success", "filename": filename, "id": id }));
        }

        if self.config_name_taken(&name).await? {
            return Err(StorageError::DuplicateName);
        }

        let id = Uuid::new_v4().to_string();
        let obj = doc.as_object_mut().expect("checked above");
        obj.insert("id".into(), json!(id));
        obj.insert("name".into(), json!(name));
        obj.insert("saved_at".into(), json!(now));
        obj.insert("created_at".into(), json!(now));

        let filename = config_filename(&name);
        fs::write(dir.join(&filename), serde_json::to_vec_pretty(&doc)?).await?;
        Ok(json!({ "status": "success", "filename": filename, "id": id }))
    }

    pub async fn list_configs(&self) -> Result<Vec<Value>, StorageError> {
        let mut configs = Vec::new();
        for (path, doc) in self.read_configs().await? {
            let filename = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            configs.push(json!({
                "id": doc.get("id").cloned().unwrap_or_else(|| json!(filename)),
                "name": doc
                    .get("name")
                    .cloned()
                    .unwrap_or_else(|| json!(filename.trim_end_matches(".json"))),
                "saved_at": doc.get("saved_at").cloned().unwrap_or(json!("")),
                "filename": filename,
            }));
        }
        configs.sort_by(|a, b| text_field(b, "saved_at").cmp(&text_field(a, "saved_at")));
        Ok(configs)
    }

    pub async fn get_config(&self, id: &str) -> Result<Value, StorageError> {
        self.find_config(id)
            .await?
            .map(|(_, doc)| doc)
            .ok_or(StorageError::ConfigNotFound)
    }

    pub async fn delete_config(&self, id: &str) -> Result<(), StorageError> {
        let (path, _) = self
            .find_config(id)
            .await?
            .ok_or(StorageError::ConfigNotFound)?;
        fs::remove_file(path).await?;
        Ok(())
    }

    /// Looks a config up by its id, or by filename for pre-id documents.
    async fn find_config(&self, id: &str) -> Result<Option<(PathBuf, Value)>, StorageError> {
        for (path, doc) in self.read_configs().await? {
            let matches_id = doc.get("id").and_then(Value::as_str) == Some(id);
            let matches_file = path.file_name().map(|f| f.to_string_lossy() == id) == Some(true);
            if matches_id || matches_file {
                return Ok(Some((path, doc)));
            }
        }
        Ok(None)
    }

    async fn config_name_taken(&self, name: &str) -> Result<bool, StorageError> {
        for (_, doc) in self.read_configs().await? {
            if let Some(existing) = doc.get("name").and_then(Value::as_str) {
                if existing.eq_ignore_ascii_case(name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn read_configs(&self) -> Result<Vec<(PathBuf, Value)>, StorageError> {
        let mut configs = Vec::new();
        let mut entries = match fs::read_dir(self.configs_dir()).await {
            Ok(entries) => entries,
            Err(_) => return Ok(configs),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json") != Some(true) {
                continue;
            }
            if let Some(doc) = read_json(&path).await {
                configs.push((path, doc));
            }
        }
        Ok(configs)
    }
}

async fn read_json(path: &Path) -> Option<Value> {
    let bytes = fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn text_field(doc: &Value, key: &str) -> String {
    doc.get(key).and_then(Value::as_str).unwrap_or("").to_owned()
}

fn config_filename(name: &str) -> String {
    format!("{}.json", name.replace(' ', "_"))
}
