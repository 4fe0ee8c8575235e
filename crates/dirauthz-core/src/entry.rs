//! Directory entries as returned by the lookup/search facade.

use std::collections::HashMap;

/// A single directory entry: a DN plus its multi-valued attributes.
///
/// Entries are produced by the lookup/search facade and read-only to the
/// engine.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Attributes, each with an ordered list of string values.
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute insertion, mostly for tests and fixtures.
    pub fn with_attr(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(name.into(), values);
        self
    }

    /// First value of an attribute, if present.
    pub fn attr_first(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values of an attribute; empty slice when absent.
    pub fn attr_values(&self, name: &str) -> &[String] {
        self.attributes.get(name).map_or(&[], Vec::as_slice)
    }
}
