//! # Sanity Checker
//!
//! Three passes over one immutable snapshot of cache entries:
//! 1. **Index Pass**: value identity → entry positions, `ReaderField` → value
//!    identities, and the set of slots backed by more than one value.
//! 2. **Value-Mismatch Pass**: one finding per slot with several value objects.
//! 3. **Subreader Pass**: one finding per topmost reader whose descendants
//!    also cache the same field.
//!
//! Placeholder entries (slots still being populated) are skipped entirely.

use crate::descendants::descendant_reader_keys;
use crate::map_of_sets::MapOfSets;
use crate::reader_field::ReaderField;
use crate::SanityError;
use common::{
    CacheEntry, CacheEntrySource, Insanity, InsanityType, SizeEstimator, ValueIdentity,
};
use indexmap::IndexSet;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Detects wasteful or inconsistent cache usage.
///
/// Holds no state between calls except the optional size estimator.
#[derive(Clone, Default)]
pub struct SanityChecker {
    estimator: Option<Arc<dyn SizeEstimator>>,
}

impl SanityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches size estimates to every entry before analysis.
    pub fn with_size_estimator(mut self, estimator: Arc<dyn SizeEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn set_size_estimator(&mut self, estimator: Option<Arc<dyn SizeEstimator>>) {
        self.estimator = estimator;
    }

    /// Checks every live entry of `source`.
    pub fn check_source<S: CacheEntrySource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Vec<Insanity>, SanityError> {
        let entries = source.cache_entries();
        self.check(&entries)
    }

    /// Runs all passes over `entries`.
    ///
    /// Value-mismatch findings come first, then subreader findings. An empty
    /// snapshot yields no findings.
    ///
    /// # Errors
    /// `SanityError::Insanity` if a pass tried to build a finding with no
    /// entries, which means the pass itself is broken.
    pub fn check(&self, entries: &[CacheEntry]) -> Result<Vec<Insanity>, SanityError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(estimator) = &self.estimator {
            for entry in entries {
                entry.estimate_size(estimator.as_ref());
            }
        }

        let index = CacheIndex::build(entries);
        debug!(
            entries = entries.len(),
            values = index.value_index.len(),
            slots = index.key_index.len(),
            mismatched = index.mismatched.len(),
            "indexed cache entries"
        );

        let mut insanity = check_value_mismatch(&index)?;
        let value_mismatches = insanity.len();
        insanity.extend(check_subreaders(&index)?);
        debug!(
            value_mismatches,
            subreaders = insanity.len() - value_mismatches,
            "sanity check complete"
        );

        Ok(insanity)
    }
}

/// The two multimap indices plus the mismatched-slot marker set.
struct CacheIndex<'a> {
    entries: &'a [CacheEntry],
    /// Value identity → positions in `entries`.
    value_index: MapOfSets<ValueIdentity, usize>,
    key_index: MapOfSets<ReaderField, ValueIdentity>,
    mismatched: IndexSet<ReaderField>,
}

impl<'a> CacheIndex<'a> {
    fn build(entries: &'a [CacheEntry]) -> Self {
        let mut index = Self {
            entries,
            value_index: MapOfSets::new(),
            key_index: MapOfSets::new(),
            mismatched: IndexSet::new(),
        };

        for (pos, entry) in entries.iter().enumerate() {
            // TODO: placeholders may hide a slot stuck mid-population; decide
            // whether a long-lived placeholder deserves its own finding.
            let Some(value) = entry.value().value_identity() else {
                continue;
            };
            let rf = ReaderField::new(entry.reader_key().clone(), entry.field_name());

            index.value_index.put(value.clone(), pos);
            if index.key_index.put(rf.clone(), value.clone()) > 1 {
                index.mismatched.insert(rf);
            }
        }

        index
    }

    /// Entry positions behind every value of `rf`, added to `out` in order.
    fn collect_positions(&self, rf: &ReaderField, out: &mut IndexSet<usize>) {
        for value in self.key_index.values(rf) {
            out.extend(self.value_index.values(value).copied());
        }
    }

    fn materialize(&self, positions: IndexSet<usize>) -> Vec<CacheEntry> {
        positions
            .into_iter()
            .map(|pos| self.entries[pos].clone())
            .collect()
    }
}

/// One finding per slot backed by more than one value object.
///
/// Only reader, field and value identity are compared: two entries differing
/// just in their custom label but sharing a value object are not flagged.
fn check_value_mismatch(index: &CacheIndex<'_>) -> Result<Vec<Insanity>, SanityError> {
    let mut insanity = Vec::with_capacity(index.mismatched.len());

    for rf in &index.mismatched {
        let mut positions = IndexSet::new();
        index.collect_positions(rf, &mut positions);
        trace!(slot = %rf, entries = positions.len(), "value mismatch");

        insanity.push(Insanity::new(
            InsanityType::ValueMismatch,
            format!("Multiple distinct value objects for {}", rf),
            index.materialize(positions),
        )?);
    }

    Ok(insanity)
}

/// One finding per topmost reader whose descendants cache the same field.
///
/// Slots are visited in index order, each at most once. When a slot's
/// descendant already owns a record of bad descendants, that record is folded
/// into the ancestor's, so a grandparent → parent → child chain is reported
/// once, at the grandparent.
fn check_subreaders(index: &CacheIndex<'_>) -> Result<Vec<Insanity>, SanityError> {
    let mut bad_kids: MapOfSets<ReaderField, ReaderField> = MapOfSets::new();
    let mut seen: HashSet<ReaderField> = HashSet::new();

    for rf in index.key_index.keys() {
        if seen.contains(rf) {
            continue;
        }

        for kid_key in descendant_reader_keys(&rf.reader_key) {
            let kid = ReaderField::new(kid_key, rf.field_name.as_str());

            if let Some(grandkids) = bad_kids.remove(&kid) {
                bad_kids.put(rf.clone(), kid.clone());
                bad_kids.put_all(rf.clone(), grandkids);
            } else if index.key_index.contains_key(&kid) {
                bad_kids.put(rf.clone(), kid.clone());
            }

            seen.insert(kid);
        }

        seen.insert(rf.clone());
    }

    let mut insanity = Vec::with_capacity(bad_kids.len());
    for (parent, kids) in bad_kids.iter() {
        let mut positions = IndexSet::new();
        index.collect_positions(parent, &mut positions);
        for kid in kids {
            index.collect_positions(kid, &mut positions);
        }
        trace!(parent = %parent, descendants = kids.len(), "subreader overlap");

        insanity.push(Insanity::new(
            InsanityType::Subreader,
            format!("Found caches for descendants of {}", parent),
            index.materialize(positions),
        )?);
    }

    Ok(insanity)
}
