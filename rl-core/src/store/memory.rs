//! In-process template store

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::TemplateStore;
use crate::error::{Result, RidgelineError};
use crate::template::Template;

/// Template store held in memory. Optionally enforces a subject registry.
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<BTreeMap<String, Template>>,
    registry: Option<RwLock<BTreeSet<String>>>,
}

impl MemoryTemplateStore {
    /// Store that accepts any subject
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that only accepts registered subjects
    pub fn with_registry<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            templates: RwLock::new(BTreeMap::new()),
            registry: Some(RwLock::new(subjects.into_iter().map(Into::into).collect())),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn get(&self, subject_id: &str) -> Result<Option<Template>> {
        Ok(self.templates.read().get(subject_id).cloned())
    }

    fn get_all(&self) -> Result<Vec<(String, Template)>> {
        Ok(self
            .templates
            .read()
            .iter()
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect())
    }

    fn upsert(&self, subject_id: &str, template: &Template) -> Result<()> {
        if let Some(registry) = &self.registry {
            if !registry.read().contains(subject_id) {
                return Err(RidgelineError::ForeignKeyViolation(subject_id.to_string()));
            }
        }

        let replaced = self
            .templates
            .write()
            .insert(subject_id.to_string(), template.clone())
            .is_some();
        debug!(subject = subject_id, replaced, "Template stored");
        Ok(())
    }

    fn register_subject(&self, subject_id: &str) -> Result<bool> {
        match &self.registry {
            Some(registry) => Ok(registry.write().insert(subject_id.to_string())),
            // Every subject is accepted, nothing to record
            None => {
                debug!(subject = subject_id, "No registry, subject accepted implicitly");
                Ok(false)
            }
        }
    }
}
