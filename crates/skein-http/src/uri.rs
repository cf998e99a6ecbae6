//! URI composition
//!
//! Joins a base URI, an optional relative path and query parameters into one
//! percent-encoded URI. The base is validated with `url` but otherwise kept
//! byte-for-byte; only the appended parts are encoded.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use url::Url;

use crate::error::{redact_uri, ResourceError, Result};

/// Everything but ASCII alphanumerics and the unreserved marks `-._~`.
const ALWAYS_QUOTED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Bytes that would break the query grammar if a raw key carried them.
const QUERY_KEY_DELIMITERS: &AsciiSet = &CONTROLS.add(b' ').add(b'&').add(b'=').add(b'#');

/// Default safe allowlist for paths and parameter values.
pub const DEFAULT_SAFE: &str = "/:";

/// Ordered query parameters.
///
/// Keys keep their first insertion position; a key may carry several values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Vec<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to a single value, replacing any previous values.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => *values = vec![value],
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Add another value for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Builder form of [`Params::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Flattened `(key, value)` pairs in wire order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Overlay `other` on top of `self`; keys in `other` replace existing ones.
    pub fn merge(&mut self, other: Params) {
        for (key, values) in other.entries {
            match self.entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = values,
                None => self.entries.push((key, values)),
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

/// Encoding rules applied to appended path segments and query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriEncoding {
    safe: String,
    encode_keys: bool,
}

impl Default for UriEncoding {
    fn default() -> Self {
        Self {
            safe: DEFAULT_SAFE.to_string(),
            encode_keys: true,
        }
    }
}

impl UriEncoding {
    /// Non-ASCII characters in `safe` are ignored.
    pub fn new(safe: &str, encode_keys: bool) -> Self {
        Self {
            safe: safe.chars().filter(char::is_ascii).collect(),
            encode_keys,
        }
    }

    pub fn safe(&self) -> &str {
        &self.safe
    }

    pub fn encode_keys(&self) -> bool {
        self.encode_keys
    }
}

/// Percent-encode a path, copying existing `%XX` escapes through untouched.
fn quote_path(input: &str, safe: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find('%') {
        let (head, tail) = rest.split_at(idx);
        out.push_str(&quote(head, safe));
        if is_escape(tail.as_bytes()) {
            out.push_str(&tail[..3]);
            rest = &tail[3..];
        } else {
            out.push_str("%25");
            rest = &tail[1..];
        }
    }
    out.push_str(&quote(rest, safe));
    out
}

fn is_escape(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[1].is_ascii_hexdigit() && bytes[2].is_ascii_hexdigit()
}

/// Percent-encode `input`, leaving the ASCII characters of `safe` as they are.
fn quote(input: &str, safe: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for piece in input.split_inclusive(|c: char| safe.contains(c)) {
        match piece.char_indices().last() {
            Some((idx, c)) if safe.contains(c) => {
                out.extend(utf8_percent_encode(&piece[..idx], ALWAYS_QUOTED));
                out.push(c);
            }
            _ => out.extend(utf8_percent_encode(piece, ALWAYS_QUOTED)),
        }
    }
    out
}

/// Reject anything that is not an absolute URI with a host.
pub(crate) fn validate_base(base: &str) -> Result<()> {
    let url = Url::parse(base).map_err(|e| {
        ResourceError::ParserError(format!("invalid base URI '{}': {}", redact_uri(base), e))
    })?;
    if url.cannot_be_a_base() || !url.has_host() {
        return Err(ResourceError::ParserError(format!(
            "base URI '{}' is not an absolute hierarchical URI",
            redact_uri(base)
        )));
    }
    Ok(())
}

/// Compose `base`, an optional relative `path` and `params` into one URI.
pub fn make_uri(
    base: &str,
    path: Option<&str>,
    params: &Params,
    encoding: &UriEncoding,
) -> Result<String> {
    validate_base(base)?;
    let safe = encoding.safe();

    let (before_fragment, fragment) = match base.find('#') {
        Some(idx) => (&base[..idx], Some(&base[idx..])),
        None => (base, None),
    };
    let (prefix, base_query) = match before_fragment.find('?') {
        Some(idx) => (&before_fragment[..idx], Some(&before_fragment[idx + 1..])),
        None => (before_fragment, None),
    };

    let mut uri = String::with_capacity(base.len() + 32);
    match path {
        Some(segment) => {
            uri.push_str(prefix.strip_suffix('/').unwrap_or(prefix));
            uri.push('/');
            uri.push_str(&quote_path(segment.trim_matches('/'), safe));
            if segment.len() > 1 && segment.ends_with('/') {
                uri.push('/');
            }
        }
        None => uri.push_str(prefix),
    }

    let query = encode_query(params, encoding);
    match (base_query.filter(|q| !q.is_empty()), query.is_empty()) {
        (Some(existing), true) => {
            uri.push('?');
            uri.push_str(existing);
        }
        (Some(existing), false) => {
            uri.push('?');
            uri.push_str(existing);
            uri.push('&');
            uri.push_str(&query);
        }
        (None, false) => {
            uri.push('?');
            uri.push_str(&query);
        }
        (None, true) => {}
    }

    if let Some(fragment) = fragment {
        uri.push_str(fragment);
    }
    Ok(uri)
}

fn encode_query(params: &Params, encoding: &UriEncoding) -> String {
    let safe = encoding.safe();
    params
        .pairs()
        .map(|(k, v)| {
            let key = if encoding.encode_keys {
                quote(k, safe)
            } else {
                utf8_percent_encode(k, QUERY_KEY_DELIMITERS).to_string()
            };
            format!("{}={}", key, quote(v, safe))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Fluent form of [`make_uri`].
#[derive(Debug, Clone)]
pub struct UriBuilder {
    base: String,
    path: Option<String>,
    params: Params,
    encoding: UriEncoding,
}

impl UriBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            path: None,
            params: Params::new(),
            encoding: UriEncoding::default(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.append(key, value);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.merge(params);
        self
    }

    pub fn encoding(mut self, encoding: UriEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn build(&self) -> Result<String> {
        make_uri(&self.base, self.path.as_deref(), &self.params, &self.encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(base: &str, path: Option<&str>) -> String {
        make_uri(base, path, &Params::new(), &UriEncoding::default()).unwrap()
    }

    #[test]
    fn test_join_without_double_slash() {
        assert_eq!(compose("http://h/a", Some("b")), "http://h/a/b");
        assert_eq!(compose("http://h/a/", Some("b")), "http://h/a/b");
        assert_eq!(compose("http://h/a/", Some("/b")), "http://h/a/b");
        assert_eq!(compose("http://h", Some("b")), "http://h/b");
    }

    #[test]
    fn test_absent_path_keeps_base() {
        assert_eq!(compose("http://h/a", None), "http://h/a");
        assert_eq!(compose("http://h/a/", None), "http://h/a/");
    }

    #[test]
    fn test_trailing_slash_on_segment_is_kept() {
        assert_eq!(compose("http://h/db", Some("docs/")), "http://h/db/docs/");
        assert_eq!(compose("http://h/db", Some("/")), "http://h/db/");
    }

    #[test]
    fn test_path_encoding_respects_safe_chars() {
        assert_eq!(
            compose("http://h", Some("_design/app:v1/a b")),
            "http://h/_design/app:v1/a%20b"
        );
        assert_eq!(compose("http://h", Some("caf\u{e9}")), "http://h/caf%C3%A9");
    }

    #[test]
    fn test_no_double_encoding_of_escapes() {
        assert_eq!(compose("http://h", Some("a%20b")), "http://h/a%20b");
        assert_eq!(compose("http://h", Some("100%")), "http://h/100%25");
        assert_eq!(compose("http://h", Some("%zz")), "http://h/%25zz");
    }

    #[test]
    fn test_space_in_param_round_trips() {
        let params = Params::new().with("q", "a b");
        let uri = make_uri("http://h/search", None, &params, &UriEncoding::default()).unwrap();
        assert_eq!(uri, "http://h/search?q=a%20b");

        let parsed = Url::parse(&uri).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("q".to_string(), "a b".to_string())]);
    }

    #[test]
    fn test_reserved_query_chars_are_encoded() {
        let params = Params::new().with("k", "a&b=c+d#e");
        let uri = make_uri("http://h", None, &params, &UriEncoding::default()).unwrap();
        let parsed = Url::parse(&uri).unwrap();
        let (_, value) = parsed.query_pairs().next().unwrap();
        assert_eq!(value, "a&b=c+d#e");
        assert_eq!(parsed.fragment(), None);
    }

    #[test]
    fn test_params_keep_insertion_order_and_multi_values() {
        let mut params = Params::new();
        params.insert("startkey", "\"a\"");
        params.append("keys", "1");
        params.append("keys", "2");
        params.insert("limit", "10");
        let uri = make_uri("http://h/v", None, &params, &UriEncoding::default()).unwrap();
        assert_eq!(uri, "http://h/v?startkey=%22a%22&keys=1&keys=2&limit=10");
    }

    #[test]
    fn test_insert_replaces_values() {
        let mut params = Params::new();
        params.append("a", "1");
        params.append("a", "2");
        params.insert("a", "3");
        assert_eq!(params.pairs().collect::<Vec<_>>(), vec![("a", "3")]);
    }

    #[test]
    fn test_merge_with_existing_query_and_fragment() {
        let params = Params::new().with("b", "2");
        let uri = make_uri("http://h/p?a=1#frag", Some("x"), &params, &UriEncoding::default())
            .unwrap();
        assert_eq!(uri, "http://h/p/x?a=1&b=2#frag");
    }

    #[test]
    fn test_encode_keys_switch() {
        let params = Params::new().with("a b", "c");
        let encoded = make_uri("http://h", None, &params, &UriEncoding::default()).unwrap();
        assert_eq!(encoded, "http://h?a%20b=c");

        let raw = make_uri("http://h", None, &params, &UriEncoding::new("/:", false)).unwrap();
        assert_eq!(raw, "http://h?a%20b=c");
    }

    #[test]
    fn test_raw_keys_keep_query_grammar() {
        let raw = UriEncoding::new("/:", false);
        let params = Params::new()
            .with("a[b]", "1")
            .with("x&y=z", "2")
            .with("frag#", "3")
            .with("pre%2Fencoded", "4");
        let uri = make_uri("http://h", None, &params, &raw).unwrap();
        assert_eq!(
            uri,
            "http://h?a[b]=1&x%26y%3Dz=2&frag%23=3&pre%2Fencoded=4"
        );
    }

    #[test]
    fn test_custom_safe_chars() {
        let uri = make_uri(
            "http://h",
            Some("a:b@c"),
            &Params::new(),
            &UriEncoding::new("/", true),
        )
        .unwrap();
        assert_eq!(uri, "http://h/a%3Ab%40c");
    }

    #[test]
    fn test_invalid_base_is_parser_error() {
        let err = make_uri("not a uri", None, &Params::new(), &UriEncoding::default()).unwrap_err();
        assert!(matches!(err, ResourceError::ParserError(_)));

        let err = make_uri("mailto:bob@example.com", None, &Params::new(), &UriEncoding::default())
            .unwrap_err();
        assert!(matches!(err, ResourceError::ParserError(_)));
    }

    #[test]
    fn test_builder_is_deterministic() {
        let builder = UriBuilder::new("https://couch.example.com:5984/db")
            .path("_all_docs")
            .param("include_docs", "true");
        let first = builder.build().unwrap();
        assert_eq!(first, builder.build().unwrap());
        assert_eq!(
            first,
            "https://couch.example.com:5984/db/_all_docs?include_docs=true"
        );
    }
}
