//! Message headers.
//!
//! [`HeaderMap`] is an ordered multi-map with case-insensitive names, kept in
//! a `SmallVec` so the handful of headers a response usually carries never
//! touch the heap. Codecs and custom handlers receive `&mut HeaderMap` and
//! mutate it in place.

use crate::media_type::MediaType;
use smallvec::SmallVec;
use std::fmt;

/// Entries stored before spilling to the heap.
pub const INLINE_HEADERS: usize = 12;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const ACCEPT: &str = "Accept";

#[derive(Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    value: String,
}

impl Entry {
    #[inline]
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered header multi-map.
///
/// ```rust
/// use lintel_core::headers::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("Content-Type", "text/plain");
/// assert!(!headers.set_if_absent("content-type", "application/json"));
/// assert_eq!(headers.get("CONTENT-TYPE"), Some(&"text/plain".to_string()));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: SmallVec<[Entry; INLINE_HEADERS]>,
}

impl HeaderMap {
    #[inline]
    pub const fn new() -> Self {
        Self {
            entries: SmallVec::new_const(),
        }
    }

    /// True while storage has not spilled to the heap.
    #[inline]
    pub fn is_inline(&self) -> bool {
        !self.entries.spilled()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value for `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&String> {
        self.entries.iter().find(|e| e.is(name)).map(|e| &e.value)
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&String> {
        self.entries
            .iter()
            .filter(|e| e.is(name))
            .map(|e| &e.value)
            .collect()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.is(name))
    }

    /// Set `name`, replacing the first existing value and dropping any
    /// duplicates. Returns the replaced value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();

        match self.entries.iter().position(|e| e.is(&name)) {
            Some(pos) => {
                let old = std::mem::replace(&mut self.entries[pos].value, value);
                let mut index = 0;
                self.entries.retain(|e| {
                    let keep = index <= pos || !e.is(&name);
                    index += 1;
                    keep
                });
                Some(old)
            }
            None => {
                self.entries.push(Entry { name, value });
                None
            }
        }
    }

    /// Set `name` only when no value is present. Returns whether it was set.
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push(Entry {
            name,
            value: value.into(),
        });
        true
    }

    /// Add a value without touching existing ones.
    #[inline]
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Entry {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Remove every value for `name`, returning the first.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self
            .entries
            .iter()
            .position(|e| e.is(name))
            .map(|pos| self.entries.remove(pos).value)?;
        self.entries.retain(|e| !e.is(name));
        Some(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // ========================================================================
    // Body headers
    // ========================================================================

    #[inline]
    pub fn content_type(&self) -> Option<&String> {
        self.get(CONTENT_TYPE)
    }

    /// Content-Type parsed as a media type. Unparseable values yield `None`.
    pub fn content_type_media(&self) -> Option<MediaType> {
        self.content_type().and_then(|v| MediaType::parse(v))
    }

    pub fn set_content_type(&mut self, media_type: &MediaType) {
        self.insert(CONTENT_TYPE, media_type.to_header_value());
    }

    #[inline]
    pub fn content_length(&self) -> Option<usize> {
        self.get(CONTENT_LENGTH)?.trim().parse().ok()
    }

    pub fn set_content_length(&mut self, len: usize) {
        self.insert(CONTENT_LENGTH, len.to_string());
    }

    pub fn is_chunked(&self) -> bool {
        self.get(TRANSFER_ENCODING)
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.name, &e.value)))
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.append(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: HeaderMap = HeaderMap::new();

    #[test]
    fn test_const_construction() {
        let mut headers = EMPTY;
        assert!(headers.is_empty());
        assert!(headers.is_inline());
        headers.insert("Accept", "*/*");
        assert_eq!(headers.len(), 1);
        assert_eq!(EMPTY.len(), 0);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json");
        assert_eq!(
            headers.get("content-type"),
            Some(&"application/json".to_string())
        );
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_insert_replaces_all_duplicates() {
        let mut headers = HeaderMap::new();
        headers.append("Vary", "Accept");
        headers.append("X-Other", "1");
        headers.append("vary", "Origin");

        let old = headers.insert("Vary", "*");
        assert_eq!(old, Some("Accept".to_string()));
        assert_eq!(headers.get_all("vary"), vec!["*"]);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_order_preserved() {
        let headers: HeaderMap = [("B", "2"), ("A", "1"), ("C", "3")].into_iter().collect();
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_set_if_absent() {
        let mut headers = HeaderMap::new();
        assert!(headers.set_if_absent(CONTENT_TYPE, "text/plain"));
        assert!(!headers.set_if_absent("content-type", "text/html"));
        assert_eq!(headers.content_type(), Some(&"text/plain".to_string()));
    }

    #[test]
    fn test_remove_drops_every_value() {
        let mut headers = HeaderMap::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        assert_eq!(headers.remove("set-cookie"), Some("a=1".to_string()));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("set-cookie"), None);
    }

    #[test]
    fn test_body_accessors() {
        let mut headers = HeaderMap::new();
        headers.set_content_type(&MediaType::text_plain().with_param("charset", "UTF-8"));
        headers.set_content_length(42);
        headers.insert(TRANSFER_ENCODING, "Chunked");

        assert_eq!(
            headers.content_type(),
            Some(&"text/plain; charset=utf-8".to_string())
        );
        assert_eq!(
            headers.content_type_media().and_then(|m| m.charset().map(str::to_owned)),
            Some("utf-8".to_string())
        );
        assert_eq!(headers.content_length(), Some(42));
        assert!(headers.is_chunked());
    }

    #[test]
    fn test_spills_past_inline_capacity() {
        let mut headers = HeaderMap::new();
        for i in 0..INLINE_HEADERS {
            headers.insert(format!("X-{i}"), "v");
        }
        assert!(headers.is_inline());
        headers.insert("X-Extra", "v");
        assert!(!headers.is_inline());
    }
}
