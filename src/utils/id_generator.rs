//! Run identifier generation.

use uuid::Uuid;

/// Generates unique run identifiers.
///
/// A struct rather than a free function so alternative schemes (prefixed,
/// sortable) can slot in without touching call sites.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// A fresh v4 UUID in hyphenated form.
    #[must_use]
    pub fn generate_run_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
