use common::ReaderKey;
use std::fmt;

/// One cache slot: an exact reader identity plus a field name.
///
/// Equality is identity on the reader and string equality on the field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReaderField {
    pub reader_key: ReaderKey,
    pub field_name: String,
}

impl ReaderField {
    pub fn new(reader_key: ReaderKey, field_name: impl Into<String>) -> Self {
        Self {
            reader_key,
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for ReaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.reader_key, self.field_name)
    }
}
