use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Failed to read parameter file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Malformed parameter line: '{0}'")]
    ParseError(String),
    #[error("Missing required parameter '{0}'")]
    Missing(String),
    #[error("Parameter '{key}' has invalid value '{value}': expected {expected}")]
    BadValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// A dotted parameter path such as `breed.pipe.source.0`.
///
/// Parameters are built up by pushing path components onto a base, which is
/// how every component derives the keys for its own sub-tree of the
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    path: String,
}

impl Parameter {
    pub fn new(base: &str) -> Self {
        Self {
            path: base.to_string(),
        }
    }

    /// Returns a new parameter with `sub` appended as a path component.
    pub fn push(&self, sub: &str) -> Self {
        Self {
            path: format!("{}.{}", self.path, sub),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// A flat key/value parameter store parsed from a `key = value` file.
///
/// Every typed getter takes a primary key and an optional fallback key; the
/// primary is consulted first, then the fallback. Getters without a
/// `_with_default` suffix treat a missing key as an error, which callers
/// surface as a fatal configuration problem.
#[derive(Debug, Clone, Default)]
pub struct ParameterDatabase {
    params: HashMap<String, String>,
}

impl ParameterDatabase {
    /// Loads a parameter database from a file.
    ///
    /// The format is one `key = value` pair per line. Everything after a `#`
    /// is a comment; blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self, ParamError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses a parameter database from in-memory text.
    pub fn parse(content: &str) -> Result<Self, ParamError> {
        let mut params = HashMap::new();

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ParamError::ParseError(line.to_string()));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ParamError::ParseError(line.to_string()));
            }
            params.insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self { params })
    }

    /// Inserts or overwrites a single parameter. Mostly useful for tests and
    /// for programmatic overrides before setup.
    pub fn set(&mut self, param: &Parameter, value: &str) {
        self.params
            .insert(param.as_str().to_string(), value.to_string());
    }

    /// Looks up the raw value under the primary key, falling back to
    /// `fallback` when the primary is absent. Returns the key that matched
    /// together with the value so error messages can name it.
    fn lookup<'a>(
        &'a self,
        primary: &'a Parameter,
        fallback: Option<&'a Parameter>,
    ) -> Option<(&'a str, &'a str)> {
        if let Some(v) = self.params.get(primary.as_str()) {
            return Some((primary.as_str(), v.as_str()));
        }
        let fb = fallback?;
        self.params
            .get(fb.as_str())
            .map(|v| (fb.as_str(), v.as_str()))
    }

    pub fn exists(&self, primary: &Parameter, fallback: Option<&Parameter>) -> bool {
        self.lookup(primary, fallback).is_some()
    }

    pub fn get_string(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
    ) -> Option<String> {
        self.lookup(primary, fallback).map(|(_, v)| v.to_string())
    }

    /// Like `get_string`, but a missing key is an error naming the primary.
    pub fn get_required_string(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
    ) -> Result<String, ParamError> {
        self.get_string(primary, fallback)
            .ok_or_else(|| ParamError::Missing(primary.as_str().to_string()))
    }

    pub fn get_int(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
    ) -> Result<i64, ParamError> {
        let (key, value) = self
            .lookup(primary, fallback)
            .ok_or_else(|| ParamError::Missing(primary.as_str().to_string()))?;
        value.parse().map_err(|_| ParamError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "an integer",
        })
    }

    pub fn get_int_with_default(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
        default: i64,
    ) -> Result<i64, ParamError> {
        match self.lookup(primary, fallback) {
            Some(_) => self.get_int(primary, fallback),
            None => Ok(default),
        }
    }

    pub fn get_double(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
    ) -> Result<f64, ParamError> {
        let (key, value) = self
            .lookup(primary, fallback)
            .ok_or_else(|| ParamError::Missing(primary.as_str().to_string()))?;
        value.parse().map_err(|_| ParamError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a real number",
        })
    }

    pub fn get_double_with_default(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
        default: f64,
    ) -> Result<f64, ParamError> {
        match self.lookup(primary, fallback) {
            Some(_) => self.get_double(primary, fallback),
            None => Ok(default),
        }
    }

    pub fn get_bool(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
    ) -> Result<bool, ParamError> {
        let (key, value) = self
            .lookup(primary, fallback)
            .ok_or_else(|| ParamError::Missing(primary.as_str().to_string()))?;
        match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ParamError::BadValue {
                key: key.to_string(),
                value: value.to_string(),
                expected: "'true' or 'false'",
            }),
        }
    }

    pub fn get_bool_with_default(
        &self,
        primary: &Parameter,
        fallback: Option<&Parameter>,
        default: bool,
    ) -> Result<bool, ParamError> {
        match self.lookup(primary, fallback) {
            Some(_) => self.get_bool(primary, fallback),
            None => Ok(default),
        }
    }
}
