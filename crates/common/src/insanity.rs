//! Findings produced by the sanity checker.

use crate::entry::{CacheEntry, OneLine};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Errors from building or parsing findings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InsanityError {
    #[error("an insanity must reference at least one cache entry")]
    NoEntries,
    #[error("unknown insanity type: {0}")]
    UnknownType(String),
    #[error("malformed insanity report: {0}")]
    Malformed(String),
}

/// Class of anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InsanityType {
    /// A reader and one of its descendants both cache the same field.
    #[serde(rename = "SUBREADER")]
    Subreader,
    /// One `(reader, field)` slot is backed by more than one value object.
    #[serde(rename = "VALUEMISMATCH")]
    ValueMismatch,
    /// Tag for findings a caller has decided to accept. Never produced by the checker.
    #[serde(rename = "EXPECTED")]
    Expected,
}

impl InsanityType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Subreader => "SUBREADER",
            Self::ValueMismatch => "VALUEMISMATCH",
            Self::Expected => "EXPECTED",
        }
    }
}

impl fmt::Display for InsanityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InsanityType {
    type Err = InsanityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBREADER" => Ok(Self::Subreader),
            "VALUEMISMATCH" => Ok(Self::ValueMismatch),
            "EXPECTED" => Ok(Self::Expected),
            other => Err(InsanityError::UnknownType(other.to_string())),
        }
    }
}

/// One reported anomaly: a kind, a message and the implicated entries.
///
/// Immutable once built. `entries` is never empty.
#[derive(Debug, Clone)]
pub struct Insanity {
    kind: InsanityType,
    message: String,
    entries: Vec<CacheEntry>,
}

impl Insanity {
    /// # Errors
    /// `InsanityError::NoEntries` when `entries` is empty.
    pub fn new(
        kind: InsanityType,
        message: impl Into<String>,
        entries: Vec<CacheEntry>,
    ) -> Result<Self, InsanityError> {
        if entries.is_empty() {
            return Err(InsanityError::NoEntries);
        }
        Ok(Self {
            kind,
            message: message.into(),
            entries,
        })
    }

    pub fn kind(&self) -> InsanityType {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Returns the same finding re-tagged as `kind` (e.g. `Expected`).
    pub fn with_kind(mut self, kind: InsanityType) -> Self {
        self.kind = kind;
        self
    }
}

/// `"<kind>: <message>"`, then one tab-indented line per entry. Line breaks
/// inside the message or entry labels are escaped.
impl fmt::Display for Insanity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.kind, OneLine(&self.message))?;
        for entry in &self.entries {
            writeln!(f, "\t{}", entry)?;
        }
        Ok(())
    }
}

/// A finding read back from its rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedInsanity {
    pub kind: InsanityType,
    pub message: String,
    pub entry_lines: Vec<String>,
}

impl RenderedInsanity {
    pub fn entry_count(&self) -> usize {
        self.entry_lines.len()
    }
}

impl FromStr for RenderedInsanity {
    type Err = InsanityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines();
        let header = lines
            .next()
            .ok_or_else(|| InsanityError::Malformed("empty report".to_string()))?;
        let (kind, message) = header
            .split_once(": ")
            .ok_or_else(|| InsanityError::Malformed(format!("no kind in header: {header}")))?;

        let mut entry_lines = Vec::new();
        for line in lines {
            match line.strip_prefix('\t') {
                Some(entry) => entry_lines.push(entry.to_string()),
                None if line.is_empty() => continue,
                None => {
                    return Err(InsanityError::Malformed(format!(
                        "entry line is not indented: {line}"
                    )))
                }
            }
        }
        if entry_lines.is_empty() {
            return Err(InsanityError::NoEntries);
        }

        Ok(Self {
            kind: kind.parse()?,
            message: message.to_string(),
            entry_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CacheEntry, CachedValue, CoreKey, ReaderKey};

    fn entries(n: usize) -> Vec<CacheEntry> {
        let key = ReaderKey::from_node(CoreKey::new("seg0"));
        (0..n)
            .map(|i| CacheEntry::new(key.clone(), "f", CachedValue::new(i)))
            .collect()
    }

    #[test]
    fn test_empty_entries_rejected() {
        let err = Insanity::new(InsanityType::Subreader, "msg", Vec::new()).unwrap_err();
        assert_eq!(err, InsanityError::NoEntries);
    }

    #[test]
    fn test_type_labels_round_trip() {
        for kind in [
            InsanityType::Subreader,
            InsanityType::ValueMismatch,
            InsanityType::Expected,
        ] {
            assert_eq!(kind.to_string().parse::<InsanityType>(), Ok(kind));
        }
        assert!("BOGUS".parse::<InsanityType>().is_err());
    }

    #[test]
    fn test_type_serializes_as_label() {
        let json = serde_json::to_string(&InsanityType::ValueMismatch).unwrap();
        assert_eq!(json, "\"VALUEMISMATCH\"");
    }

    #[test]
    fn test_render_layout() {
        let insanity = Insanity::new(InsanityType::ValueMismatch, "two values", entries(2)).unwrap();
        let text = insanity.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "VALUEMISMATCH: two values");
        assert_eq!(lines.len(), 3);
        assert!(lines[1..].iter().all(|l| l.starts_with("\t'seg0'=>'f'")));
    }

    #[test]
    fn test_rendered_entry_count_matches() {
        for n in [1, 3, 7] {
            let insanity = Insanity::new(InsanityType::Subreader, "nested", entries(n)).unwrap();
            let parsed: RenderedInsanity = insanity.to_string().parse().unwrap();

            assert_eq!(parsed.kind, InsanityType::Subreader);
            assert_eq!(parsed.message, "nested");
            assert_eq!(parsed.entry_count(), insanity.entries().len());
        }
    }

    #[test]
    fn test_line_breaks_in_labels_survive_round_trip() {
        let key = ReaderKey::from_node(CoreKey::new("seg\r\n0"));
        let entries = vec![
            CacheEntry::new(key.clone(), "a\nb", CachedValue::new(1u8)),
            CacheEntry::new(key, "a\nb", CachedValue::new(2u8)),
        ];
        let insanity =
            Insanity::new(InsanityType::ValueMismatch, "slot seg+a\nb", entries).unwrap();
        let text = insanity.to_string();
        let parsed: RenderedInsanity = text.parse().unwrap();

        assert_eq!(text.lines().count(), 3);
        assert_eq!(parsed.message, r"slot seg+a\nb");
        assert_eq!(parsed.entry_count(), 2);
        assert!(parsed.entry_lines[0].starts_with(r"'seg\r\n0'=>'a\nb'"));
    }

    #[test]
    fn test_parse_rejects_unindented_entry() {
        let err = "SUBREADER: x\nnot indented\n"
            .parse::<RenderedInsanity>()
            .unwrap_err();
        assert!(matches!(err, InsanityError::Malformed(_)));
    }

    #[test]
    fn test_with_kind_retags() {
        let insanity = Insanity::new(InsanityType::Subreader, "ok", entries(1))
            .unwrap()
            .with_kind(InsanityType::Expected);
        assert_eq!(insanity.kind(), InsanityType::Expected);
        assert!(insanity.to_string().starts_with("EXPECTED: ok\n"));
    }
}
