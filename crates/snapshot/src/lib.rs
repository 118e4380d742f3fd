//! # Cache Snapshots
//!
//! Loads a recorded cache state (reader hierarchy plus live entries) from a
//! JSON document, optionally gzip-compressed, and materializes it as
//! identity-bearing readers and values the checker can analyze.
//!
//! Entries that name the same `value` label share one value object. A `null`
//! value is the placeholder of a slot still being populated.

use common::{CacheEntry, CacheEntrySource, CachedValue, ReaderKey, ReaderNode, SizeEstimator};
use flate2::read::GzDecoder;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Errors from snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("duplicate reader id: {0}")]
    DuplicateReader(String),
    #[error("reader {parent} lists unknown child {child}")]
    UnknownChild { parent: String, child: String },
    #[error("entry {index} references unknown reader {reader}")]
    UnknownReader { index: usize, reader: String },
    #[error("reader hierarchy has a cycle through {0}")]
    CyclicHierarchy(String),
}

/// On-disk document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub readers: Vec<ReaderSpec>,
    #[serde(default)]
    pub entries: Vec<EntrySpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderSpec {
    pub id: String,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntrySpec {
    pub reader: String,
    pub field: String,
    #[serde(default = "default_cache_type")]
    pub cache_type: String,
    #[serde(default)]
    pub custom: Option<String>,
    /// Value label; `None` marks a placeholder.
    #[serde(default)]
    pub value: Option<String>,
    /// Declared footprint of the value object in bytes.
    #[serde(default)]
    pub bytes: Option<u64>,
}

fn default_cache_type() -> String {
    "object".to_string()
}

/// A reader materialized from a snapshot.
#[derive(Debug)]
pub struct SnapshotReader {
    pub id: String,
    children: Vec<ReaderKey>,
}

impl fmt::Display for SnapshotReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl ReaderNode for SnapshotReader {
    fn sub_reader_keys(&self) -> Vec<ReaderKey> {
        self.children.clone()
    }
}

/// A value object materialized from a snapshot.
#[derive(Debug)]
pub struct SnapshotValue {
    pub label: String,
    pub bytes: Option<u64>,
}

/// A loaded snapshot: readers by id (declaration order) and entries.
pub struct Snapshot {
    pub readers: IndexMap<String, ReaderKey>,
    pub entries: Vec<CacheEntry>,
}

impl Snapshot {
    /// Loads a snapshot file. Paths ending in `.gz` are gunzipped.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::from_reader(BufReader::new(reader))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SnapshotError> {
        let file: SnapshotFile = serde_json::from_reader(reader)?;
        Self::build(file)
    }

    pub fn parse(json: &str) -> Result<Self, SnapshotError> {
        let file: SnapshotFile = serde_json::from_str(json)?;
        Self::build(file)
    }

    /// Materializes a parsed document.
    ///
    /// # Algorithm
    /// 1. Add one graph node per reader and one edge per parent → child link.
    /// 2. Topologically sort; a cycle is rejected.
    /// 3. Build readers children-first so each parent can hold its children's keys.
    /// 4. Build entries, allocating one value object per distinct label.
    ///
    /// Readers referenced by entries but never declared are an error.
    pub fn build(file: SnapshotFile) -> Result<Self, SnapshotError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

        for spec in &file.readers {
            if nodes.contains_key(&spec.id) {
                return Err(SnapshotError::DuplicateReader(spec.id.clone()));
            }
            nodes.insert(spec.id.clone(), graph.add_node(spec.id.clone()));
        }
        for spec in &file.readers {
            let parent = nodes[&spec.id];
            for child in &spec.children {
                let child_node = nodes.get(child).ok_or_else(|| SnapshotError::UnknownChild {
                    parent: spec.id.clone(),
                    child: child.clone(),
                })?;
                graph.add_edge(parent, *child_node, ());
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| SnapshotError::CyclicHierarchy(graph[cycle.node_id()].clone()))?;

        let specs: HashMap<&str, &ReaderSpec> =
            file.readers.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut built: HashMap<String, ReaderKey> = HashMap::with_capacity(order.len());
        for node in order.into_iter().rev() {
            let id = &graph[node];
            let spec = specs[id.as_str()];
            let children = spec
                .children
                .iter()
                .map(|child| built[child].clone())
                .collect();
            let key = ReaderKey::from_node(SnapshotReader {
                id: id.clone(),
                children,
            });
            built.insert(id.clone(), key);
        }

        let readers: IndexMap<String, ReaderKey> = file
            .readers
            .iter()
            .map(|spec| (spec.id.clone(), built[&spec.id].clone()))
            .collect();

        let mut values: HashMap<String, Arc<SnapshotValue>> = HashMap::new();
        let mut entries = Vec::with_capacity(file.entries.len());
        for (index, spec) in file.entries.into_iter().enumerate() {
            let reader_key = readers
                .get(&spec.reader)
                .ok_or_else(|| SnapshotError::UnknownReader {
                    index,
                    reader: spec.reader.clone(),
                })?
                .clone();

            let value = match spec.value {
                None => CachedValue::Placeholder,
                Some(label) => {
                    let object = values.entry(label.clone()).or_insert_with(|| {
                        Arc::new(SnapshotValue {
                            label: label.clone(),
                            bytes: spec.bytes,
                        })
                    });
                    if spec.bytes.is_some() && object.bytes != spec.bytes {
                        warn!(
                            value = %label,
                            declared = ?spec.bytes,
                            kept = ?object.bytes,
                            "conflicting size declaration ignored"
                        );
                    }
                    CachedValue::from_arc(Arc::clone(object))
                }
            };

            let mut entry = CacheEntry::new(reader_key, spec.field, value)
                .with_cache_type(spec.cache_type);
            if let Some(custom) = spec.custom {
                entry = entry.with_custom(custom);
            }
            entries.push(entry);
        }

        debug!(
            readers = readers.len(),
            entries = entries.len(),
            values = values.len(),
            "snapshot materialized"
        );

        Ok(Self { readers, entries })
    }

    pub fn reader(&self, id: &str) -> Option<&ReaderKey> {
        self.readers.get(id)
    }

    /// Distinct field names cached directly on `reader`, in entry order.
    pub fn fields_of(&self, reader: &ReaderKey) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if entry.reader_key() == reader && !fields.contains(&entry.field_name()) {
                fields.push(entry.field_name());
            }
        }
        fields
    }
}

impl CacheEntrySource for Snapshot {
    fn cache_entries(&self) -> Vec<CacheEntry> {
        self.entries.clone()
    }
}

/// Sizes values by their declared `bytes`, falling back to the shallow size.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredSizeEstimator;

impl SizeEstimator for DeclaredSizeEstimator {
    fn estimate(&self, entry: &CacheEntry) -> Option<u64> {
        match entry.value().downcast_ref::<SnapshotValue>() {
            Some(SnapshotValue {
                bytes: Some(bytes), ..
            }) => Some(*bytes),
            _ => common::ShallowSizeEstimator.estimate(entry),
        }
    }
}
