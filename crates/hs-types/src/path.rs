//! Paths rooted at a key: `/<root-key>/a/b` or relative `a/b`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::key::Key;

/// A path of entry names, optionally anchored at a root key.
///
/// Absolute paths start at `root`; relative paths have no root and are
/// resolved against some other path with [`make_absolute`](Self::make_absolute).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    root: Option<Key>,
    path: Vec<String>,
}

impl KeyPath {
    /// Path naming the root itself.
    pub fn root(key: Key) -> Self {
        Self {
            root: Some(key),
            path: Vec::new(),
        }
    }

    pub fn relative<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: None,
            path: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root_key(&self) -> Option<&Key> {
        self.root.as_ref()
    }

    pub fn segments(&self) -> &[String] {
        &self.path
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self {
            root: self.root.clone(),
            path,
        }
    }

    /// Parent of an absolute path. The root and relative paths have none.
    pub fn parent(&self) -> Option<Self> {
        if self.is_relative() || self.path.is_empty() {
            return None;
        }
        Some(Self {
            root: self.root.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    pub fn is_relative(&self) -> bool {
        self.root.is_none()
    }

    pub fn is_root(&self) -> bool {
        !self.is_relative() && self.path.is_empty()
    }

    /// Resolve a relative path against `current`. Absolute paths are returned unchanged.
    pub fn make_absolute(&self, current: &KeyPath) -> Self {
        if !self.is_relative() {
            return self.clone();
        }
        let mut path = current.path.clone();
        path.extend(self.path.iter().cloned());
        Self {
            root: current.root.clone(),
            path,
        }
    }

    /// Segments joined with `/`, without the root.
    pub fn path_join(&self) -> String {
        self.path.join("/")
    }

    /// Last segment, if there is one and it is non-empty.
    pub fn filename(&self) -> Option<&str> {
        self.path
            .last()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Split a relative path into its first segment and the remainder.
    pub fn next_in_relative_path(&self) -> Result<(Option<&str>, Option<KeyPath>), TypeError> {
        if !self.is_relative() {
            return Err(TypeError::InvalidPath(format!(
                "{self} is not a relative path"
            )));
        }
        let Some((first, rest)) = self.path.split_first() else {
            return Ok((None, None));
        };
        let remainder = (!rest.is_empty()).then(|| KeyPath::relative(rest.iter().cloned()));
        Ok((Some(first.as_str()), remainder))
    }
}

impl FromStr for KeyPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, rest) = match s.strip_prefix('/') {
            Some(absolute) => {
                let (root, rest) = absolute.split_once('/').unwrap_or((absolute, ""));
                if root.is_empty() {
                    return Err(TypeError::InvalidPath(format!("{s:?} has no root key")));
                }
                (Some(root.parse::<Key>()?), rest)
            }
            None => (None, s),
        };
        let mut path: Vec<String> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').map(str::to_owned).collect()
        };
        if path.last().is_some_and(String::is_empty) {
            path.pop();
        }
        Ok(Self { root, path })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            None => f.write_str(&self.path_join()),
            Some(root) => write!(f, "/{root}/{}", self.path_join()),
        }
    }
}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPath({:?})", self.to_string())
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A bare key or a path, as accepted from user input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyOrPath {
    Key(Key),
    Path(KeyPath),
}

impl KeyOrPath {
    /// Classify `s`: a leading `/` makes a path. With `relative_to_root`, any
    /// string containing `/` is read as an absolute path missing its slash.
    pub fn parse(s: &str, relative_to_root: bool) -> Result<Self, TypeError> {
        if s.starts_with('/') {
            Ok(Self::Path(s.parse()?))
        } else if relative_to_root && s.contains('/') {
            Ok(Self::Path(format!("/{s}").parse()?))
        } else {
            Ok(Self::Key(s.parse()?))
        }
    }

    /// A bare key becomes the path of that root.
    pub fn into_path(self) -> KeyPath {
        match self {
            Self::Key(key) => KeyPath::root(key),
            Self::Path(path) => path,
        }
    }
}

impl From<Key> for KeyOrPath {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<KeyPath> for KeyOrPath {
    fn from(path: KeyPath) -> Self {
        Self::Path(path)
    }
}

impl fmt::Display for KeyOrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => key.fmt(f),
            Self::Path(path) => path.fmt(f),
        }
    }
}
