// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::Arc;

/// Kind of mutation a patch applies
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Action {
    /// Overwrites the values of a key (`+`)
    Set,

    /// Removes a key (`-`)
    Delete,

    /// Discards everything replayed so far (`*`)
    ClearAll,
}

impl Action {
    /// Tag stored in the first column of a shard row
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Set => "+",
            Self::Delete => "-",
            Self::ClearAll => "*",
        }
    }

    /// Parses a row tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "+" => Some(Self::Set),
            "-" => Some(Self::Delete),
            "*" => Some(Self::ClearAll),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A single mutation against a logical key
///
/// Patches are immutable. The effect of a patch is undone by a later
/// patch, never by removing it from the log.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Patch {
    action: Action,
    key: Arc<str>,
    values: Arc<[String]>,
}

impl Patch {
    /// Key used by [`Patch::clear_all`].
    pub const CLEAR_ALL_KEY: &'static str = "*";

    /// Creates a new patch.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty. Use [`Patch::try_new`] for untrusted keys.
    pub fn new<K, I, S>(action: Action, key: K, values: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        assert!(!key.is_empty(), "patch key must not be empty");

        Self::from_parts(action, key, values)
    }

    /// Creates a new patch, refusing an empty key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty.
    pub fn try_new<K, I, S>(action: Action, key: K, values: I) -> crate::Result<Self>
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();

        if key.is_empty() {
            return Err(crate::Error::InvalidPatch(format!(
                "{action} patch has an empty key"
            )));
        }

        Ok(Self::from_parts(action, key, values))
    }

    fn from_parts<I, S>(action: Action, key: Arc<str>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action,
            key,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a patch that sets `key` to `values`.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty. See [`Patch::try_new`].
    pub fn set<K, I, S>(key: K, values: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Action::Set, key, values)
    }

    /// Creates a patch that removes `key`.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty. See [`Patch::try_new`].
    pub fn delete<K: Into<Arc<str>>>(key: K) -> Self {
        Self::new(Action::Delete, key, Vec::<String>::new())
    }

    /// Creates a patch that discards the whole replayed mapping.
    #[must_use]
    pub fn clear_all() -> Self {
        Self::new(Action::ClearAll, Self::CLEAR_ALL_KEY, Vec::<String>::new())
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the values, in order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Encodes the patch as a shard row: action, key, values...
    pub(crate) fn to_row(&self) -> Vec<&str> {
        let mut row = Vec::with_capacity(2 + self.values.len());
        row.push(self.action.tag());
        row.push(&*self.key);
        row.extend(self.values.iter().map(String::as_str));
        row
    }

    /// Decodes a shard row.
    ///
    /// The first column is the action, the second the key, all
    /// remaining columns are values.
    pub(crate) fn from_row(row: &[String]) -> Result<Self, String> {
        let [action, key, values @ ..] = row else {
            return Err(format!("row has {} columns, expected at least 2", row.len()));
        };

        let Some(action) = Action::from_tag(action) else {
            return Err(format!("unknown action {action:?}"));
        };

        if key.is_empty() {
            return Err("row has an empty key".into());
        }

        Ok(Self {
            action,
            key: key.as_str().into(),
            values: values.into(),
        })
    }
}

/// Append-only, ordered list of patches
///
/// Iteration order is append order. Replay depends on it, so there is
/// no way to insert, remove or reorder entries.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchLog(Vec<Patch>);

impl PatchLog {
    /// Appends a patch to the end of the log.
    pub fn push(&mut self, patch: Patch) {
        self.0.push(patch);
    }

    /// Iterates the log in append order.
    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.0.iter()
    }

    /// Returns the amount of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the log has no patches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a PatchLog {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Patch> for PatchLog {
    fn from_iter<T: IntoIterator<Item = Patch>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
