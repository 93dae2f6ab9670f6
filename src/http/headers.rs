//! Insertion-ordered header collection.
//!
//! Headers are kept in the order they were received or set. Duplicate
//! fields are legal and all of them are retained; [`Headers::get`] returns
//! the first match, [`Headers::get_all`] every match. Field names keep their
//! original case but compare case-insensitively.

use std::slice;

/// A single `field: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub field: String,
    pub value: String,
}

impl Header {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether this header's field equals `name`, ignoring ASCII case.
    pub fn is(&self, name: &str) -> bool {
        self.field.eq_ignore_ascii_case(name)
    }
}

/// Ordered sequence of headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    items: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair. Existing entries with the same field are kept.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.items.push(Header::new(field, value));
    }

    /// Value of the first header named `field`, ignoring case.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|h| h.is(field))
            .map(|h| h.value.as_str())
    }

    /// Values of every header named `field`, in insertion order.
    pub fn get_all<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.items
            .iter()
            .filter(move |h| h.is(field))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.items.iter().any(|h| h.is(field))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the pairs in insertion order. Each call starts over.
    pub fn iter(&self) -> slice::Iter<'_, Header> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(k, v);
        }
        headers
    }
}
