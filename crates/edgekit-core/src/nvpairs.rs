//! Name/value pair lists and per-protocol property sets.
//!
//! Flat configuration snapshots travel through the SDK as ordered lists of
//! (name, value) string pairs. Lists preserve insertion order; equality is
//! order-insensitive but requires identical key sets and values. Typed
//! accessors use strict whole-string parsing: trailing characters or range
//! errors yield `None`.

use serde::{Deserialize, Serialize};

/// A single (name, value) pair. Both strings are non-empty by convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvPair {
    pub name: String,
    pub value: String,
}

/// An ordered list of name/value pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NvPairs(Vec<NvPair>);

impl NvPairs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a pair, preserving insertion order.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(NvPair {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Builder-style append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Look up the value for `name`. Returns the first match.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Signed integer accessor. `None` unless the value parses in full.
    pub fn int_value(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(parse_strict)
    }

    /// Unsigned integer accessor. `None` unless the value parses in full.
    pub fn uint_value(&self, name: &str) -> Option<u64> {
        self.value(name).and_then(parse_strict)
    }

    /// Floating-point accessor. `None` unless the value parses in full.
    pub fn float_value(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(parse_strict)
    }

    /// Boolean accessor; accepts `true`/`false` only.
    pub fn bool_value(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(parse_strict)
    }

    /// Replace the value of an existing pair, or append if absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.0.iter_mut().find(|p| p.name == name) {
            Some(pair) => pair.value = value.into(),
            None => self.push(name, value),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NvPair> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sub-list of pairs whose names start with `prefix`, with the prefix
    /// stripped from each name.
    pub fn strip_prefix(&self, prefix: &str) -> NvPairs {
        let mut out = NvPairs::new();
        for pair in &self.0 {
            if let Some(rest) = pair.name.strip_prefix(prefix) {
                out.push(rest, pair.value.clone());
            }
        }
        out
    }
}

impl FromIterator<(String, String)> for NvPairs {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| NvPair { name, value })
                .collect(),
        )
    }
}

impl PartialEq for NvPairs {
    /// Order-insensitive set equality: same number of pairs, and every pair
    /// on the left has a same-named pair with an equal value on the right.
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|p| {
            other
                .0
                .iter()
                .find(|q| q.name == p.name)
                .is_some_and(|q| q.value == p.value)
        })
    }
}

impl Eq for NvPairs {}

fn parse_strict<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

/// Properties for one named protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub properties: NvPairs,
}

/// An ordered list of (protocol-name, properties) entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Protocols(Vec<Protocol>);

impl Protocols {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, properties: NvPairs) {
        self.0.push(Protocol {
            name: name.into(),
            properties,
        });
    }

    pub fn with(mut self, name: impl Into<String>, properties: NvPairs) -> Self {
        self.push(name, properties);
        self
    }

    /// Properties for the named protocol, if present.
    pub fn properties(&self, name: &str) -> Option<&NvPairs> {
        self.0.iter().find(|p| p.name == name).map(|p| &p.properties)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Protocol> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Protocols {
    /// Order-insensitive: same protocol names, pairwise-equal property sets.
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|p| {
            other
                .0
                .iter()
                .find(|q| q.name == p.name)
                .is_some_and(|q| q.properties == p.properties)
        })
    }
}

impl Eq for Protocols {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NvPairs {
        NvPairs::new()
            .with("Host", "localhost")
            .with("Port", "49990")
            .with("Scale", "1.5")
    }

    #[test]
    fn lookup_and_order() {
        let pairs = sample();
        assert_eq!(pairs.value("Host"), Some("localhost"));
        assert_eq!(pairs.value("Missing"), None);
        let names: Vec<_> = pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Host", "Port", "Scale"]);
    }

    #[test]
    fn duplicate_equals_original() {
        let pairs = sample();
        assert_eq!(pairs.clone(), pairs);
    }

    #[test]
    fn equality_is_order_insensitive() {
        let a = NvPairs::new().with("x", "1").with("y", "2");
        let b = NvPairs::new().with("y", "2").with("x", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn equality_is_sensitive_to_keys_and_values() {
        let a = NvPairs::new().with("x", "1").with("y", "2");
        assert_ne!(a, NvPairs::new().with("x", "1").with("y", "3"));
        assert_ne!(a, NvPairs::new().with("x", "1").with("z", "2"));
        assert_ne!(a, NvPairs::new().with("x", "1"));
    }

    #[test]
    fn typed_accessors_parse_strictly() {
        let pairs = sample()
            .with("Neg", "-12")
            .with("Trailing", "8x")
            .with("Spaced", " 9")
            .with("Empty", "");
        assert_eq!(pairs.uint_value("Port"), Some(49990));
        assert_eq!(pairs.int_value("Neg"), Some(-12));
        assert_eq!(pairs.float_value("Scale"), Some(1.5));
        assert_eq!(pairs.int_value("Trailing"), None);
        assert_eq!(pairs.int_value("Spaced"), None);
        assert_eq!(pairs.int_value("Empty"), None);
        assert_eq!(pairs.uint_value("Neg"), None);
        assert_eq!(pairs.int_value("Host"), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut pairs = sample();
        pairs.set("Port", "50000");
        pairs.set("New", "v");
        assert_eq!(pairs.uint_value("Port"), Some(50000));
        assert_eq!(pairs.value("New"), Some("v"));
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn prefix_stripping() {
        let pairs = NvPairs::new()
            .with("Driver/Init", "5")
            .with("Driver/Name", "counter")
            .with("Service/Port", "49990");
        let driver = pairs.strip_prefix("Driver/");
        assert_eq!(driver.len(), 2);
        assert_eq!(driver.value("Init"), Some("5"));
    }

    #[test]
    fn protocol_properties_lookup_and_equality() {
        let a = Protocols::new()
            .with("HTTP", NvPairs::new().with("Host", "a").with("Port", "1"))
            .with("Other", NvPairs::new().with("Address", "b"));
        let b = Protocols::new()
            .with("Other", NvPairs::new().with("Address", "b"))
            .with("HTTP", NvPairs::new().with("Port", "1").with("Host", "a"));
        assert_eq!(a, b);
        assert_eq!(a.properties("Other").unwrap().value("Address"), Some("b"));
        assert!(a.properties("Modbus").is_none());

        let c = Protocols::new().with("HTTP", NvPairs::new().with("Host", "a"));
        assert_ne!(a, c);
    }
}
