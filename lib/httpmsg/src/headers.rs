//! An ordered header list that preserves duplicate names, grounded on
//! `libhttp`'s `HeaderList` (`std::vector<std::unique_ptr<Header>>` rather
//! than a map) -- HTTP/1.0 allows repeated header names and the proxy must
//! be able to round-trip a cached response byte-for-byte, which a map
//! keyed by name would silently collapse.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

/// Ordered, duplicate-preserving header list. `get` matches case-sensitively
/// (per §6's "headers case-sensitive as written") and returns the first
/// match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<RawHeader>);

impl HeaderList {
    pub fn new() -> HeaderList {
        HeaderList(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(RawHeader {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|h| h.name == name).map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawHeader> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_first_match_case_sensitively() {
        let mut headers = HeaderList::new();
        headers.push("Date", "first");
        headers.push("date", "lowercase");
        headers.push("Date", "second");
        assert_eq!(headers.get("Date"), Some("first"));
        assert_eq!(headers.get("date"), Some("lowercase"));
    }

    #[test]
    fn duplicates_are_preserved_in_order() {
        let mut headers = HeaderList::new();
        headers.push("Set-Cookie", "a=1");
        headers.push("Set-Cookie", "b=2");
        assert_eq!(headers.len(), 2);
    }
}
