//! Ordered, case-insensitive header multimap.
//!
//! Header names are kept as `Arc<str>` so that repeated names (`content-type`,
//! `accept`, …) clone in O(1); the backing `SmallVec` keeps the common case of
//! at most [`MAX_INLINE_HEADERS`] entries off the heap. Insertion order is
//! preserved, both across names and across values of one name.

use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Raw storage: one `(name, value)` pair per header line.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Case-insensitive multimap of header names to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: HeaderVec,
}

impl HttpHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of the header (case-insensitive per RFC 7230).
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of the header, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Append a value, keeping previous values of the same name.
    pub fn add(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let name = self.intern(name);
        self.entries.push((name, value.into()));
        self
    }

    /// Replace every value of the header with a single one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.push((Arc::from(name), value.into()));
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    /// Distinct names (first spelling wins) with their values, in first-seen order.
    #[must_use]
    pub fn grouped(&self) -> Vec<(&str, Vec<&str>)> {
        let mut out: Vec<(&str, Vec<&str>)> = Vec::new();
        for (k, v) in &self.entries {
            match out.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(k)) {
                Some((_, values)) => values.push(v.as_str()),
                None => out.push((k.as_ref(), vec![v.as_str()])),
            }
        }
        out
    }

    // Reuse the Arc of an existing spelling so repeated names share storage.
    fn intern(&self, name: &str) -> Arc<str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, _)| Arc::clone(k))
            .unwrap_or_else(|| Arc::from(name))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HttpHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = HttpHeaders::new();
        for (k, v) in iter {
            headers.add(k.as_ref(), v);
        }
        headers
    }
}

impl Serialize for HttpHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let grouped = self.grouped();
        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (name, values) in grouped {
            map.serialize_entry(name, &values)?;
        }
        map.end()
    }
}
