//! Media types and the media-type matcher.
//!
//! A [`MediaType`] is an immutable `type/subtype` pair with ordered
//! parameters and an optional quality weight. [`negotiate`] picks the first
//! acceptable entry that matches any candidate.
//!
//! # Examples
//!
//! ```
//! use lintel_core::media_type::{negotiate, Accept, MediaType};
//!
//! let accept = Accept::parse("application/json, text/*;q=0.9, */*;q=0.1");
//! let produces = vec![MediaType::text_plain(), MediaType::json()];
//!
//! let matched = negotiate(&produces, accept.media_types()).unwrap();
//! assert_eq!(matched.negotiated(), MediaType::json());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

const WILDCARD: &str = "*";

/// A content type such as `text/plain; charset=utf-8`.
///
/// Type, subtype and parameter names are stored lowercased; the `charset`
/// value is lowercased too since charset names are case-insensitive.
/// The quality weight takes no part in equality.
#[derive(Debug, Clone)]
pub struct MediaType {
    type_: String,
    subtype: String,
    params: Vec<(String, String)>,
    quality: f32,
}

impl MediaType {
    /// Create a new media type.
    pub fn new(type_: impl AsRef<str>, subtype: impl AsRef<str>) -> Self {
        Self {
            type_: type_.as_ref().trim().to_ascii_lowercase(),
            subtype: subtype.as_ref().trim().to_ascii_lowercase(),
            params: Vec::new(),
            quality: 1.0,
        }
    }

    /// Add (or replace) a parameter.
    pub fn with_param(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let key = key.as_ref().trim().to_ascii_lowercase();
        let value = normalize_param(&key, value.as_ref());
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// Set the quality weight, clamped to `0.0..=1.0`.
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality.clamp(0.0, 1.0);
        self
    }

    /// Create `text/plain` media type.
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Create `text/html` media type.
    pub fn html() -> Self {
        Self::new("text", "html")
    }

    /// Create `application/json` media type.
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// Create `application/x-ndjson` media type.
    pub fn ndjson() -> Self {
        Self::new("application", "x-ndjson")
    }

    /// Create `application/octet-stream` media type.
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Create `*/*` wildcard media type.
    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// Parse a single media type, e.g. `text/html; charset=UTF-8; q=0.8`.
    ///
    /// A `q` parameter becomes the quality weight instead of a parameter.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(';');
        let (type_, subtype) = parts.next()?.trim().split_once('/')?;
        if type_.trim().is_empty() || subtype.trim().is_empty() {
            return None;
        }

        let mut media_type = Self::new(type_, subtype);
        for param in parts {
            let Some((key, value)) = param.trim().split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            if key.eq_ignore_ascii_case("q") {
                media_type.quality = value.parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
            } else {
                media_type = media_type.with_param(key, value);
            }
        }
        Some(media_type)
    }

    /// The primary type, e.g. `text`.
    pub fn type_(&self) -> &str {
        &self.type_
    }

    /// The subtype, e.g. `plain`.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Look up a parameter by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All parameters in declaration order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `charset` parameter, if declared.
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    /// The quality weight (1.0 unless declared).
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    /// A copy without parameters or quality.
    pub fn without_params(&self) -> Self {
        Self::new(&self.type_, &self.subtype)
    }

    /// Check if this is `*/*`.
    pub fn is_any(&self) -> bool {
        self.type_ == WILDCARD && self.subtype == WILDCARD
    }

    /// True when either the type or the subtype is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.type_ == WILDCARD || self.subtype == WILDCARD || self.subtype.starts_with("*+")
    }

    /// Whether `self`, used as a pattern, covers the type and subtype of `other`.
    ///
    /// Wildcards are only honoured on `self`: `text/*` includes `text/plain`,
    /// `application/*+json` includes `application/problem+json`, but
    /// `text/plain` does not include `text/*`.
    pub fn includes(&self, other: &MediaType) -> bool {
        let type_matches = self.type_ == WILDCARD || self.type_ == other.type_;
        let subtype_matches = if self.subtype == WILDCARD {
            true
        } else if let Some(suffix) = self.subtype.strip_prefix("*+") {
            other
                .subtype
                .strip_suffix(suffix)
                .is_some_and(|rest| rest.ends_with('+'))
        } else {
            self.subtype == other.subtype
        };
        type_matches && subtype_matches
    }

    /// Full matcher rule: type/subtype inclusion plus every parameter of
    /// `self` present with an equal value on `candidate`.
    pub fn accepts(&self, candidate: &MediaType) -> bool {
        self.includes(candidate)
            && self
                .params
                .iter()
                .all(|(k, v)| candidate.param(k) == Some(v.as_str()))
    }

    /// Ranking used to break quality ties: concrete beats `type/*` beats `*/*`,
    /// and parameters add precision.
    pub fn specificity(&self) -> u8 {
        let mut score = 0u8;
        if self.type_ != WILDCARD {
            score += 2;
        }
        if self.subtype != WILDCARD && !self.subtype.starts_with("*+") {
            score += 1;
        }
        score * 4 + self.params.len().min(3) as u8
    }

    /// Header form including parameters, excluding quality.
    pub fn to_header_value(&self) -> String {
        let mut result = self.essence();
        for (key, value) in &self.params {
            result.push_str("; ");
            result.push_str(key);
            result.push('=');
            result.push_str(value);
        }
        result
    }
}

fn normalize_param(key: &str, value: &str) -> String {
    let value = value.trim().trim_matches('"');
    if key == "charset" {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.type_ == other.type_
            && self.subtype == other.subtype
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .all(|(k, v)| other.param(k) == Some(v.as_str()))
    }
}

impl Eq for MediaType {}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_.hash(state);
        self.subtype.hash(state);
        let mut params: Vec<_> = self.params.iter().collect();
        params.sort();
        params.hash(state);
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid media type: {s:?}"))
    }
}

// ============================================================================
// Accept Header
// ============================================================================

/// A parsed `Accept` header, ordered by preference.
#[derive(Debug, Clone)]
pub struct Accept {
    media_types: Vec<MediaType>,
}

impl Accept {
    /// An Accept list that takes anything.
    pub fn any() -> Self {
        Self {
            media_types: vec![MediaType::any()],
        }
    }

    /// Build from an explicit list, keeping the given order.
    pub fn from_media_types(media_types: Vec<MediaType>) -> Self {
        Self { media_types }
    }

    /// Parse an Accept header value.
    ///
    /// Entries are ordered by quality (highest first), then specificity,
    /// then declaration order. Entries with `q=0` are dropped.
    ///
    /// ```
    /// use lintel_core::media_type::Accept;
    ///
    /// let accept = Accept::parse("text/*;q=0.5, application/json, image/png;q=0");
    /// let order: Vec<String> = accept.media_types().iter().map(|m| m.essence()).collect();
    /// assert_eq!(order, vec!["application/json", "text/*"]);
    /// ```
    pub fn parse(header: &str) -> Self {
        let mut media_types: Vec<MediaType> = header
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .filter_map(MediaType::parse)
            .filter(|mt| mt.quality() > 0.0)
            .collect();

        // sort_by is stable, so declaration order survives full ties
        media_types.sort_by(|a, b| {
            b.quality()
                .partial_cmp(&a.quality())
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.specificity().cmp(&a.specificity()))
        });

        Self { media_types }
    }

    /// Entries in priority order.
    pub fn media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    /// Check if nothing is acceptable.
    pub fn is_empty(&self) -> bool {
        self.media_types.is_empty()
    }

    /// Check if a concrete media type is acceptable.
    pub fn accepts(&self, media_type: &MediaType) -> bool {
        self.media_types.iter().any(|mt| mt.accepts(media_type))
    }
}

impl Default for Accept {
    fn default() -> Self {
        Self::any()
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Result of a successful [`negotiate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMatch {
    /// The acceptable entry that matched.
    pub acceptable: MediaType,
    /// The candidate it matched.
    pub candidate: MediaType,
}

impl MediaMatch {
    /// The media type to use on the wire.
    ///
    /// Wildcards are only honoured on the acceptable side, so the candidate
    /// is always at least as specific as the entry it matched.
    pub fn negotiated(&self) -> MediaType {
        self.candidate.clone()
    }
}

/// Match candidates against acceptable media types.
///
/// Acceptable entries are tried in the given order; the first one that
/// accepts any candidate wins, paired with the first such candidate.
pub fn negotiate(candidates: &[MediaType], acceptable: &[MediaType]) -> Option<MediaMatch> {
    acceptable.iter().find_map(|acc| {
        candidates
            .iter()
            .find(|candidate| acc.accepts(candidate))
            .map(|candidate| MediaMatch {
                acceptable: acc.clone(),
                candidate: candidate.clone(),
            })
    })
}
