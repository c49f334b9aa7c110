//! Ordered, multi-valued string mapping.
//!
//! [`MultiMap`] backs both request headers and query parameters. The two
//! input classes need different key semantics when computing signatures:
//! HTTP header names are case-insensitive while SigV4 canonicalizes query
//! keys case-sensitively. A map is therefore created either case-sensitive or
//! case-insensitive and the choice is fixed for its lifetime.

use indexmap::IndexMap;

/// An immutable, ordered, multi-valued string map.
///
/// Keys keep the order of their first insertion, values keep their insertion
/// order within a key. When the map is case-insensitive every key is
/// lowercased on write and every lookup key is lowercased on read.
///
/// # Examples
///
/// ```
/// use s3proxy_core::MultiMap;
///
/// let headers = MultiMap::case_insensitive_builder()
///     .add("X-Amz-Date", "20130524T000000Z")
///     .build();
/// assert_eq!(headers.get_first("x-amz-date"), Some("20130524T000000Z"));
/// assert_eq!(headers.get("X-AMZ-DATE"), headers.get("x-amz-date"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiMap {
    case_sensitive_keys: bool,
    entries: IndexMap<String, Vec<String>>,
}

impl MultiMap {
    /// Start building a map with the given key semantics.
    #[must_use]
    pub fn builder(case_sensitive_keys: bool) -> MultiMapBuilder {
        MultiMapBuilder {
            case_sensitive_keys,
            entries: IndexMap::new(),
        }
    }

    /// Builder for query parameters (keys compared exactly).
    #[must_use]
    pub fn case_sensitive_builder() -> MultiMapBuilder {
        Self::builder(true)
    }

    /// Builder for HTTP headers (keys normalized to lowercase).
    #[must_use]
    pub fn case_insensitive_builder() -> MultiMapBuilder {
        Self::builder(false)
    }

    /// An empty, case-sensitive map.
    #[must_use]
    pub fn empty() -> Self {
        Self::case_sensitive_builder().build()
    }

    /// Whether keys are compared case-sensitively.
    #[must_use]
    pub fn case_sensitive_keys(&self) -> bool {
        self.case_sensitive_keys
    }

    /// All values stored under `key`, in insertion order. Empty if absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .get(self.normalize(key).as_ref())
            .map_or(&[][..], Vec::as_slice)
    }

    /// The first value stored under `key`.
    #[must_use]
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(self.normalize(key).as_ref())
    }

    /// Keys in first-insertion order (lowercased for case-insensitive maps).
    pub fn key_set(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(key, values)` pairs in first-insertion order.
    pub fn entry_set(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flattened `(key, value)` pairs, one per stored value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A builder pre-populated with this map's contents and key semantics.
    ///
    /// The map itself is left untouched; derived values are built from the copy.
    #[must_use]
    pub fn to_builder(&self) -> MultiMapBuilder {
        MultiMapBuilder {
            case_sensitive_keys: self.case_sensitive_keys,
            entries: self.entries.clone(),
        }
    }

    fn normalize<'a>(&self, key: &'a str) -> std::borrow::Cow<'a, str> {
        normalize_key(self.case_sensitive_keys, key)
    }
}

impl Default for MultiMap {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder for [`MultiMap`].
#[derive(Debug, Clone)]
pub struct MultiMapBuilder {
    case_sensitive_keys: bool,
    entries: IndexMap<String, Vec<String>>,
}

impl MultiMapBuilder {
    /// Append `value` to the values stored under `key`.
    #[must_use]
    pub fn add(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.add_mut(key, value);
        self
    }

    /// Append every value in `values` under `key`.
    #[must_use]
    pub fn add_all<I, V>(mut self, key: impl AsRef<str>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = normalize_key(self.case_sensitive_keys, key.as_ref()).into_owned();
        self.entries
            .entry(key)
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Replace all values under `key` with exactly `value`.
    #[must_use]
    pub fn put_or_replace_single(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.put_or_replace_single_mut(key, value);
        self
    }

    /// Drop every value stored under `key`.
    #[must_use]
    pub fn remove(mut self, key: impl AsRef<str>) -> Self {
        let key = normalize_key(self.case_sensitive_keys, key.as_ref());
        self.entries.shift_remove(key.as_ref());
        self
    }

    /// In-place variant of [`MultiMapBuilder::add`] for loops.
    pub fn add_mut(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = normalize_key(self.case_sensitive_keys, key.as_ref()).into_owned();
        self.entries.entry(key).or_default().push(value.into());
    }

    /// In-place variant of [`MultiMapBuilder::put_or_replace_single`].
    pub fn put_or_replace_single_mut(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = normalize_key(self.case_sensitive_keys, key.as_ref()).into_owned();
        self.entries.insert(key, vec![value.into()]);
    }

    /// Finish the map.
    #[must_use]
    pub fn build(self) -> MultiMap {
        MultiMap {
            case_sensitive_keys: self.case_sensitive_keys,
            entries: self.entries,
        }
    }
}

fn normalize_key(case_sensitive_keys: bool, key: &str) -> std::borrow::Cow<'_, str> {
    if case_sensitive_keys || !key.bytes().any(|b| b.is_ascii_uppercase()) {
        std::borrow::Cow::Borrowed(key)
    } else {
        std::borrow::Cow::Owned(key.to_ascii_lowercase())
    }
}
