//! Request parameters
//!
//! A name that occurs once maps to a single value; a name that occurs more
//! than once maps to all of its values in the order they were sent. File
//! uploads keep their content and metadata.

use hyper::body::Bytes;
use std::collections::hash_map;
use std::collections::HashMap;
use std::io::Cursor;

/// An uploaded file from a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FileUpload {
    /// Readable handle over the file content
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Multiple(Vec<String>),
    File(FileUpload),
}

impl ParamValue {
    /// The value if the name occurred exactly once
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            _ => None,
        }
    }

    /// Every value sent under the name; file content is not included
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
            Self::File(_) => Vec::new(),
        }
    }

    pub const fn as_file(&self) -> Option<&FileUpload> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }
}

/// Parameters by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `(name, value)` pairs, keeping the order of repeated values
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in pairs {
            grouped.entry(name).or_default().push(value);
        }
        let params = grouped
            .into_iter()
            .map(|(name, mut values)| {
                let value = if values.len() == 1 {
                    ParamValue::Single(values.remove(0))
                } else {
                    ParamValue::Multiple(values)
                };
                (name, value)
            })
            .collect();
        Self(params)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Shortcut for a value sent exactly once
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, ParamValue> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = hash_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Parse a URL-encoded string (query string or form body)
///
/// Blank values are kept, and a name without `=` gets an empty value.
pub fn parse_urlencoded(input: &[u8]) -> Params {
    Params::from_pairs(
        form_urlencoded::parse(input).map(|(name, value)| (name.into_owned(), value.into_owned())),
    )
}
