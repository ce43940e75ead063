//! Route pattern matching module
//!
//! A route pattern is a regular expression with named capture groups, e.g.
//! `/users/(?P<id>\d+)`. Patterns and request paths are both forced to end
//! with a slash, so `/users/1` and `/users/1/` hit the same route.

use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::ConfigError;

/// Named captures extracted from a matching path
pub type Captures = HashMap<String, String>;

/// Append a trailing slash unless one is present
pub fn add_slash(url: &str) -> Cow<'_, str> {
    if url.ends_with('/') {
        Cow::Borrowed(url)
    } else {
        Cow::Owned(format!("{url}/"))
    }
}

/// Compiled route pattern anchored on the full path
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: String,
    regex: Regex,
}

impl Matcher {
    /// Compile `pattern`; an invalid regex is a configuration error
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let anchored = format!("^{}$", add_slash(pattern));
        let regex = Regex::new(&anchored).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as registered, before slash normalization
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match `path` and return its named captures
    ///
    /// Groups that did not participate in the match are left out.
    pub fn captures(&self, path: &str) -> Option<Captures> {
        let path = add_slash(path);
        let caps = self.regex.captures(&path)?;
        let named = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(named)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(&add_slash(path))
    }
}
