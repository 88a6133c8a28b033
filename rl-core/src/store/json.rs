//! JSON-file template store
//!
//! The whole store is one versioned JSON document holding the subject
//! registry and the templates. Each operation is its own transaction: load,
//! modify, write to a temp file, rename over the original. A process-local
//! lock serializes writers within this process.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::TemplateStore;
use crate::constants::paths;
use crate::error::{Result, RidgelineError};
use crate::template::Template;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTemplate {
    template: Template,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    updated_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    subjects: BTreeSet<String>,
    #[serde(default)]
    templates: BTreeMap<String, StoredTemplate>,
}

impl StoreDocument {
    const CURRENT_VERSION: u32 = 1;

    fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            subjects: BTreeSet::new(),
            templates: BTreeMap::new(),
        }
    }
}

/// Template store persisted to a JSON file
pub struct JsonTemplateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonTemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registered subjects, sorted
    pub fn subjects(&self) -> Result<Vec<String>> {
        Ok(self.load()?.subjects.into_iter().collect())
    }

    /// Registered subjects paired with whether each has a template, read in one load
    pub fn subject_listing(&self) -> Result<Vec<(String, bool)>> {
        let doc = self.load()?;
        Ok(doc
            .subjects
            .into_iter()
            .map(|id| {
                let enrolled = doc.templates.contains_key(&id);
                (id, enrolled)
            })
            .collect())
    }

    fn load(&self) -> Result<StoreDocument> {
        // Only a missing file means "empty"; any other stat failure is operational
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No template store yet, starting empty");
                return Ok(StoreDocument::new());
            }
            Err(e) => {
                return Err(RidgelineError::FileRead {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        if metadata.len() > paths::MAX_STORE_SIZE {
            return Err(RidgelineError::FileTooLarge {
                path: self.path.clone(),
                size: metadata.len(),
                max_size: paths::MAX_STORE_SIZE,
            });
        }

        let content = fs::read_to_string(&self.path).map_err(|e| RidgelineError::FileRead {
            path: self.path.clone(),
            source: e,
        })?;

        let mut doc: StoreDocument = serde_json::from_str(&content).map_err(|e| {
            RidgelineError::store(format!("{} is not a valid template store: {}", self.path.display(), e))
        })?;

        if doc.version > StoreDocument::CURRENT_VERSION {
            return Err(RidgelineError::store(format!(
                "{} has unsupported version {}",
                self.path.display(),
                doc.version
            )));
        }
        if doc.version < StoreDocument::CURRENT_VERSION {
            warn!(
                old_version = doc.version,
                new_version = StoreDocument::CURRENT_VERSION,
                "Migrating template store"
            );
            doc.version = StoreDocument::CURRENT_VERSION;
        }

        Ok(doc)
    }

    fn save(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| RidgelineError::FileWrite {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(doc)?;
        let temp_path = self.path.with_extension("json.tmp");
        let write_err = |e: io::Error| RidgelineError::FileWrite {
            path: temp_path.clone(),
            source: e,
        };

        let mut file = fs::File::create(&temp_path).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| RidgelineError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;

        debug!(
            path = ?self.path,
            subjects = doc.subjects.len(),
            templates = doc.templates.len(),
            "Saved template store"
        );
        Ok(())
    }
}

impl TemplateStore for JsonTemplateStore {
    fn get(&self, subject_id: &str) -> Result<Option<Template>> {
        Ok(self
            .load()?
            .templates
            .remove(subject_id)
            .map(|stored| stored.template))
    }

    fn get_all(&self) -> Result<Vec<(String, Template)>> {
        Ok(self
            .load()?
            .templates
            .into_iter()
            .map(|(id, stored)| (id, stored.template))
            .collect())
    }

    fn upsert(&self, subject_id: &str, template: &Template) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut doc = self.load()?;

        if !doc.subjects.contains(subject_id) {
            return Err(RidgelineError::ForeignKeyViolation(subject_id.to_string()));
        }

        let now = current_timestamp_ms();
        let created_at = doc
            .templates
            .get(subject_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        doc.templates.insert(
            subject_id.to_string(),
            StoredTemplate {
                template: template.clone(),
                created_at,
                updated_at: now,
            },
        );

        self.save(&doc)?;
        info!(subject = subject_id, len = template.len(), "Template enrolled");
        Ok(())
    }

    fn register_subject(&self, subject_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut doc = self.load()?;
        if !doc.subjects.insert(subject_id.to_string()) {
            return Ok(false);
        }
        self.save(&doc)?;
        info!(subject = subject_id, "Subject registered");
        Ok(true)
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> JsonTemplateStore {
        JsonTemplateStore::new(dir.path().join("store").join("templates.json"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.get_all().unwrap().is_empty());
        assert!(store.get("u1").unwrap().is_none());
    }

    #[test]
    fn test_unregistered_subject_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.upsert("u1", &Template::new(vec![1, 2])),
            Err(RidgelineError::ForeignKeyViolation(_))
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_enroll_and_replace_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.register_subject("u1").unwrap());
        assert!(!store.register_subject("u1").unwrap());

        store.upsert("u1", &Template::new(vec![1, 2])).unwrap();
        store.upsert("u1", &Template::new(vec![3, 4, 5])).unwrap();

        let reopened = JsonTemplateStore::new(store.path());
        assert_eq!(reopened.get("u1").unwrap(), Some(Template::new(vec![3, 4, 5])));
        assert_eq!(reopened.get_all().unwrap().len(), 1);
        assert_eq!(reopened.subjects().unwrap(), vec!["u1"]);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_replace_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.register_subject("u1").unwrap();
        store.upsert("u1", &Template::new(vec![1])).unwrap();
        let first = store.load().unwrap().templates["u1"].created_at;

        store.upsert("u1", &Template::new(vec![2])).unwrap();
        let doc = store.load().unwrap();
        assert_eq!(doc.templates["u1"].created_at, first);
        assert!(doc.templates["u1"].updated_at >= first);
    }

    #[test]
    fn test_templates_stored_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.register_subject("u1").unwrap();
        store.upsert("u1", &Template::new(vec![1, 2, 3])).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"AQID\""));
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonTemplateStore::new(&path);
        let err = store.get_all().unwrap_err();
        assert!(matches!(err, RidgelineError::StoreUnavailable(_)));
        assert!(err.is_operational());
    }

    #[test]
    fn test_future_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(&path, r#"{ "version": 99, "subjects": [], "templates": {} }"#).unwrap();

        let store = JsonTemplateStore::new(&path);
        assert!(store.get("u1").is_err());
    }

    #[test]
    fn test_subject_listing_flags_enrolled() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.subject_listing().unwrap().is_empty());

        store.register_subject("u2").unwrap();
        store.register_subject("u1").unwrap();
        store.upsert("u2", &Template::new(vec![7])).unwrap();

        assert_eq!(
            store.subject_listing().unwrap(),
            vec![("u1".to_string(), false), ("u2".to_string(), true)]
        );
    }

    #[test]
    fn test_unreachable_path_is_not_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"plain file").unwrap();

        let store = JsonTemplateStore::new(blocker.join("templates.json"));
        for err in [store.get_all().unwrap_err(), store.get("u1").unwrap_err()] {
            assert!(matches!(err, RidgelineError::FileRead { .. }));
            assert!(err.is_operational());
        }
    }
}
