//! Value types for flags that may be given more than once.
//!
//! Each collector owns its container until the resolver moves it into a
//! configuration record with `into_inner`.

use std::fmt;

use crate::headers::HeaderMap;

/// A header argument without a `:` separator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid header ({raw}), must be `Name: Value`")]
pub struct FormatError {
    raw: String,
}

impl FormatError {
    /// Creates a format error for the rejected argument.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The argument as it was given.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// A flag value that accepts one occurrence at a time.
///
/// `Display` renders the accumulated state for help and debug output.
pub trait FlagValue: fmt::Display {
    /// Records one occurrence of the flag.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the occurrence is malformed. The
    /// collector is left untouched in that case.
    fn set(&mut self, raw: &str) -> Result<(), FormatError>;
}

/// Collects every occurrence of a repeated string flag, such as `--tls-domain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiFlag {
    values: Vec<String>,
}

impl MultiFlag {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded so far.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Releases the collected values.
    #[must_use]
    pub fn into_inner(self) -> Vec<String> {
        self.values
    }
}

impl FlagValue for MultiFlag {
    fn set(&mut self, raw: &str) -> Result<(), FormatError> {
        self.values.push(raw.to_string());
        Ok(())
    }
}

impl fmt::Display for MultiFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values.join(", "))
    }
}

/// Collects `--header "Name: Value"` occurrences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFlags {
    headers: HeaderMap,
}

impl HeaderFlags {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers recorded so far.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Releases the collected mapping.
    #[must_use]
    pub fn into_inner(self) -> HeaderMap {
        self.headers
    }
}

impl FlagValue for HeaderFlags {
    fn set(&mut self, raw: &str) -> Result<(), FormatError> {
        let Some((name, value)) = raw.split_once(':') else {
            return Err(FormatError::new(raw));
        };
        self.headers.append(name, value.trim());
        Ok(())
    }
}

impl fmt::Display for HeaderFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, values) in self.headers.iter() {
            writeln!(f, "{name}: {}", values.join(", "))?;
        }
        Ok(())
    }
}
