//! # Sanity: Cache-Usage Anomaly Detection
//!
//! **Role**: Reads a snapshot of field-cache entries and reports two kinds of
//! insane usage:
//! - `VALUEMISMATCH`: one `(reader, field)` slot backed by several value objects.
//! - `SUBREADER`: a composite reader and one of its descendants both caching
//!   the same field, which duplicates memory across the hierarchy.
//!
//! **Design**:
//! - Readers and values are compared by identity ([`common::Identity`]), never
//!   by contents.
//! - The checker only reads its input; entries are never retained past a call.

pub mod checker;
pub mod descendants;
pub mod map_of_sets;
pub mod reader_field;

pub use checker::SanityChecker;
pub use descendants::descendant_reader_keys;
pub use map_of_sets::MapOfSets;
pub use reader_field::ReaderField;

use common::{CacheEntry, Insanity, InsanityError, InsanityType, ShallowSizeEstimator};
use std::sync::Arc;

/// Errors from sanity checks.
#[derive(Debug, thiserror::Error)]
pub enum SanityError {
    #[error("invalid finding: {0}")]
    Insanity(#[from] InsanityError),
    #[error("{count} insane cache usage pattern(s) found:\n{report}")]
    Insane { count: usize, report: String },
}

/// Checks `entries` with a default checker.
pub fn check_sanity(entries: &[CacheEntry]) -> Result<Vec<Insanity>, SanityError> {
    SanityChecker::new().check(entries)
}

/// Checks `entries` after attaching shallow size estimates to them.
pub fn check_sanity_with_estimates(entries: &[CacheEntry]) -> Result<Vec<Insanity>, SanityError> {
    SanityChecker::new()
        .with_size_estimator(Arc::new(ShallowSizeEstimator))
        .check(entries)
}

/// Checks `entries` and fails with `SanityError::Insane` on any finding.
///
/// # Examples
/// ```
/// # use common::{CacheEntry, CachedValue, CoreKey, ReaderKey};
/// let seg = ReaderKey::from_node(CoreKey::new("seg0"));
/// let sane = vec![CacheEntry::new(seg.clone(), "id", CachedValue::new(vec![1u32]))];
/// assert!(sanity::ensure_sane(&sane).is_ok());
///
/// let mut insane = sane.clone();
/// insane.push(CacheEntry::new(seg, "id", CachedValue::new(vec![1u32])));
/// assert!(sanity::ensure_sane(&insane).is_err());
/// ```
pub fn ensure_sane(entries: &[CacheEntry]) -> Result<(), SanityError> {
    reject_unexpected(check_sanity(entries)?)
}

/// Fails with `SanityError::Insane` if any finding is not tagged `EXPECTED`.
///
/// Callers that tolerate a known pattern re-tag those findings with
/// [`Insanity::with_kind`] before handing them over.
pub fn reject_unexpected(findings: Vec<Insanity>) -> Result<(), SanityError> {
    let insane: Vec<Insanity> = findings
        .into_iter()
        .filter(|i| i.kind() != InsanityType::Expected)
        .collect();

    if insane.is_empty() {
        return Ok(());
    }
    Err(SanityError::Insane {
        count: insane.len(),
        report: render_report(&insane),
    })
}

/// Renders findings one after another, each in its multi-line form.
pub fn render_report(insanity: &[Insanity]) -> String {
    insanity.iter().map(Insanity::to_string).collect()
}
