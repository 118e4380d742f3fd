//! # Cache Entries: The Analyzer's Input
//!
//! A field-level value cache is keyed by `(reader, field)` and holds one value
//! object per slot. The analyzer only ever reads these records; it never owns
//! the cache they come from.
//!
//! **Core Types**:
//! - [`ReaderNode`]: anything a cache can be keyed on. Composite readers also
//!   expose the keys of their immediate sub-readers.
//! - [`ReaderKey`]: identity handle on a reader node.
//! - [`CachedValue`]: the cached object, or the placeholder for a slot still
//!   being populated.
//! - [`CacheEntry`]: one live cache slot.

use crate::identity::Identity;
use bytesize::ByteSize;
use std::any::Any;
use std::fmt::{self, Write};
use std::sync::{Arc, OnceLock};

/// A node in the reader hierarchy.
///
/// Composite readers return the keys of their immediate children in order.
/// The hierarchy must be acyclic: the descendant walk has no cycle detection.
pub trait ReaderNode: fmt::Display + Send + Sync {
    /// Keys of the immediate sub-readers. Leaf readers and opaque keys have none.
    fn sub_reader_keys(&self) -> Vec<ReaderKey> {
        Vec::new()
    }
}

/// Identity of a reader as seen by the cache.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ReaderKey(Identity<dyn ReaderNode>);

impl ReaderKey {
    pub fn new(node: Arc<dyn ReaderNode>) -> Self {
        Self(Identity::new(node))
    }

    /// Allocates `node` and keys on the new allocation.
    pub fn from_node<R: ReaderNode + 'static>(node: R) -> Self {
        Self::new(Arc::new(node))
    }

    pub fn sub_reader_keys(&self) -> Vec<ReaderKey> {
        self.0.get().sub_reader_keys()
    }

    pub fn addr(&self) -> usize {
        self.0.addr()
    }
}

impl fmt::Display for ReaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0.get(), f)
    }
}

impl fmt::Debug for ReaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReaderKey({}@{:#x})", self.0.get(), self.addr())
    }
}

/// Writes a label with backslash, newline, carriage return and tab escaped,
/// so it never spans more than one line of a rendered report.
pub struct OneLine<'a>(pub &'a str);

impl fmt::Display for OneLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Opaque, childless key (e.g. a segment core key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreKey {
    pub name: String,
}

impl CoreKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for CoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl ReaderNode for CoreKey {}

/// Identity of a cached value object.
pub type ValueIdentity = Identity<dyn Any + Send + Sync>;

/// Contents of a cache slot.
#[derive(Clone)]
pub enum CachedValue {
    /// The cache is still populating this slot.
    Placeholder,
    Ready {
        object: ValueIdentity,
        type_name: &'static str,
    },
}

impl CachedValue {
    /// Allocates `value` as a fresh cached object with its own identity.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an existing object. Clones of the same `Arc` share one identity.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        let object: Arc<dyn Any + Send + Sync> = value;
        Self::Ready {
            object: Identity::new(object),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    /// `None` for placeholders.
    pub fn value_identity(&self) -> Option<&ValueIdentity> {
        match self {
            Self::Placeholder => None,
            Self::Ready { object, .. } => Some(object),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Placeholder => None,
            Self::Ready { object, .. } => object.get().downcast_ref::<T>(),
        }
    }
}

impl fmt::Display for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => f.write_str("placeholder"),
            Self::Ready { object, type_name } => write!(f, "{}#{:#x}", type_name, object.addr()),
        }
    }
}

impl fmt::Debug for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One live slot of a field-level value cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    reader_key: ReaderKey,
    field_name: String,
    cache_type: String,
    custom: Option<String>,
    value: CachedValue,
    /// Attached by a [`SizeEstimator`]; the first estimate sticks.
    size: OnceLock<u64>,
}

impl CacheEntry {
    /// Creates an entry with the generic `"object"` cache type and no custom label.
    pub fn new(reader_key: ReaderKey, field_name: impl Into<String>, value: CachedValue) -> Self {
        Self {
            reader_key,
            field_name: field_name.into(),
            cache_type: "object".to_string(),
            custom: None,
            value,
            size: OnceLock::new(),
        }
    }

    /// Sets the cache type label (e.g. `"int"`, `"terms_index"`).
    pub fn with_cache_type(mut self, cache_type: impl Into<String>) -> Self {
        self.cache_type = cache_type.into();
        self
    }

    /// Sets the custom label (typically the parser that produced the value).
    pub fn with_custom(mut self, custom: impl Into<String>) -> Self {
        self.custom = Some(custom.into());
        self
    }

    pub fn reader_key(&self) -> &ReaderKey {
        &self.reader_key
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn cache_type(&self) -> &str {
        &self.cache_type
    }

    pub fn custom(&self) -> Option<&str> {
        self.custom.as_deref()
    }

    pub fn value(&self) -> &CachedValue {
        &self.value
    }

    pub fn estimated_size(&self) -> Option<u64> {
        self.size.get().copied()
    }

    /// Runs `estimator` and attaches its result. Returns the attached size.
    ///
    /// Advisory only: a second call keeps the first estimate.
    pub fn estimate_size(&self, estimator: &dyn SizeEstimator) -> Option<u64> {
        if let Some(bytes) = estimator.estimate(self) {
            let _ = self.size.set(bytes);
        }
        self.estimated_size()
    }
}

/// Single-line form, with labels escaped through [`OneLine`].
impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}'=>'{}',{}",
            OneLine(&self.reader_key.to_string()),
            OneLine(&self.field_name),
            OneLine(&self.cache_type)
        )?;
        if let Some(custom) = &self.custom {
            write!(f, ",{}", OneLine(custom))?;
        }
        write!(f, "=>{}", self.value)?;
        if let Some(bytes) = self.estimated_size() {
            write!(f, " (size =~ {})", ByteSize(bytes))?;
        }
        Ok(())
    }
}

/// Approximates the memory footprint of a cache entry.
pub trait SizeEstimator: Send + Sync {
    /// `None` when the estimator cannot size this entry.
    fn estimate(&self, entry: &CacheEntry) -> Option<u64>;
}

/// Reports the in-place size of the cached object, ignoring anything it owns
/// on the heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowSizeEstimator;

impl SizeEstimator for ShallowSizeEstimator {
    fn estimate(&self, entry: &CacheEntry) -> Option<u64> {
        entry
            .value()
            .value_identity()
            .map(|object| std::mem::size_of_val(object.get()) as u64)
    }
}

/// Anything that can list the live entries of a cache.
pub trait CacheEntrySource {
    fn cache_entries(&self) -> Vec<CacheEntry>;
}

impl CacheEntrySource for [CacheEntry] {
    fn cache_entries(&self) -> Vec<CacheEntry> {
        self.to_vec()
    }
}

impl CacheEntrySource for Vec<CacheEntry> {
    fn cache_entries(&self) -> Vec<CacheEntry> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Composite {
        name: &'static str,
        subs: Vec<ReaderKey>,
    }

    impl fmt::Display for Composite {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name)
        }
    }

    impl ReaderNode for Composite {
        fn sub_reader_keys(&self) -> Vec<ReaderKey> {
            self.subs.clone()
        }
    }

    #[test]
    fn test_reader_keys_compare_by_identity() {
        let a = ReaderKey::from_node(CoreKey::new("seg"));
        let b = ReaderKey::from_node(CoreKey::new("seg"));

        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_core_key_has_no_children() {
        let key = ReaderKey::from_node(CoreKey::new("leaf"));
        assert!(key.sub_reader_keys().is_empty());
    }

    #[test]
    fn test_composite_exposes_children_in_order() {
        let s0 = ReaderKey::from_node(CoreKey::new("s0"));
        let s1 = ReaderKey::from_node(CoreKey::new("s1"));
        let top = ReaderKey::from_node(Composite {
            name: "top",
            subs: vec![s0.clone(), s1.clone()],
        });

        assert_eq!(top.sub_reader_keys(), vec![s0, s1]);
    }

    #[test]
    fn test_shared_value_keeps_identity() {
        let shared = Arc::new(vec![1u32, 2, 3]);
        let a = CachedValue::from_arc(Arc::clone(&shared));
        let b = CachedValue::from_arc(shared);
        let c = CachedValue::new(vec![1u32, 2, 3]);

        assert_eq!(a.value_identity(), b.value_identity());
        assert_ne!(a.value_identity(), c.value_identity());
        assert_eq!(a.downcast_ref::<Vec<u32>>(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_placeholder_has_no_identity() {
        let value = CachedValue::Placeholder;
        assert!(value.is_placeholder());
        assert!(value.value_identity().is_none());
        assert!(value.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn test_entry_display() {
        let key = ReaderKey::from_node(CoreKey::new("seg0"));
        let entry = CacheEntry::new(key, "price", CachedValue::new(0u64))
            .with_cache_type("long")
            .with_custom("DEFAULT_LONG_PARSER");
        let text = entry.to_string();

        assert!(text.starts_with("'seg0'=>'price',long,DEFAULT_LONG_PARSER=>u64#0x"));
        assert!(!text.contains("size =~"));
    }

    #[test]
    fn test_placeholder_entry_display() {
        let key = ReaderKey::from_node(CoreKey::new("seg0"));
        let entry = CacheEntry::new(key, "price", CachedValue::Placeholder);
        assert_eq!(entry.to_string(), "'seg0'=>'price',object=>placeholder");
    }

    #[test]
    fn test_entry_display_stays_on_one_line() {
        let key = ReaderKey::from_node(CoreKey::new("seg\n0"));
        let entry = CacheEntry::new(key, "a\nb", CachedValue::Placeholder)
            .with_cache_type("int\r")
            .with_custom("tab\there");

        assert_eq!(
            entry.to_string(),
            r"'seg\n0'=>'a\nb',int\r,tab\there=>placeholder"
        );
    }

    #[test]
    fn test_one_line_escapes_backslash() {
        assert_eq!(OneLine(r"c:\dir").to_string(), r"c:\\dir");
        assert_eq!(OneLine("plain").to_string(), "plain");
    }

    #[test]
    fn test_slice_and_vec_sources_agree() {
        let key = ReaderKey::from_node(CoreKey::new("seg0"));
        let entries = vec![
            CacheEntry::new(key.clone(), "f", CachedValue::new(1u8)),
            CacheEntry::new(key, "g", CachedValue::Placeholder),
        ];
        let slice: &[CacheEntry] = &entries;

        assert_eq!(slice.cache_entries().len(), 2);
        assert_eq!(entries.cache_entries().len(), 2);
        assert_eq!(slice.cache_entries()[1].field_name(), "g");
    }

    #[test]
    fn test_size_estimate_attaches_once() {
        struct Fixed(u64);
        impl SizeEstimator for Fixed {
            fn estimate(&self, _entry: &CacheEntry) -> Option<u64> {
                Some(self.0)
            }
        }

        let key = ReaderKey::from_node(CoreKey::new("seg0"));
        let entry = CacheEntry::new(key, "f", CachedValue::new([0u8; 16]));

        assert_eq!(entry.estimated_size(), None);
        assert_eq!(entry.estimate_size(&Fixed(2048)), Some(2048));
        assert_eq!(entry.estimate_size(&Fixed(1)), Some(2048));
        assert!(entry.to_string().contains("(size =~ "));
    }

    #[test]
    fn test_shallow_estimator() {
        let key = ReaderKey::from_node(CoreKey::new("seg0"));
        let entry = CacheEntry::new(key.clone(), "f", CachedValue::new([0u8; 16]));
        let pending = CacheEntry::new(key, "f", CachedValue::Placeholder);

        assert_eq!(ShallowSizeEstimator.estimate(&entry), Some(16));
        assert_eq!(ShallowSizeEstimator.estimate(&pending), None);
    }
}
