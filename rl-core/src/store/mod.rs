//! Template storage
//!
//! A store keeps at most one template per subject; enrolling again replaces
//! the previous template. Stores that carry a subject registry reject
//! templates for unknown subjects with `ForeignKeyViolation`.

pub mod json;
pub mod memory;

use crate::error::Result;
use crate::template::Template;

pub use json::JsonTemplateStore;
pub use memory::MemoryTemplateStore;

/// Keyed template persistence used by the service facade
pub trait TemplateStore: Send + Sync {
    /// Current template for a subject
    fn get(&self, subject_id: &str) -> Result<Option<Template>>;

    /// Every enrolled subject with its template, ordered by subject id
    fn get_all(&self) -> Result<Vec<(String, Template)>>;

    /// Insert or replace a subject's template
    fn upsert(&self, subject_id: &str, template: &Template) -> Result<()>;

    /// Add a subject to the registry. Returns true only when the subject was
    /// newly recorded. A store without a registry accepts every subject
    /// already, so registering returns false and changes nothing.
    fn register_subject(&self, subject_id: &str) -> Result<bool>;

    fn contains(&self, subject_id: &str) -> Result<bool> {
        Ok(self.get(subject_id)?.is_some())
    }
}
