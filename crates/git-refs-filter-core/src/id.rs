use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, num::ParseIntError, str::FromStr};
use thiserror::Error;

use crate::refs::REFS_CHANGES;

/// Errors raised while parsing a [`ChangeId`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeIdParseError {
    /// The text is not a decimal number.
    #[error("invalid change number '{input}': {source}")]
    NotANumber {
        /// Offending input.
        input: String,
        /// Underlying integer parse failure.
        #[source]
        source: ParseIntError,
    },
    /// Change numbers start at 1.
    #[error("change number must be positive")]
    Zero,
}

/// Numeric identifier of a change, as used in `refs/changes/NN/CC/...`.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ChangeId(pub u32);

impl ChangeId {
    /// Ref prefix shared by every ref of this change, e.g. `refs/changes/45/12345/`.
    #[must_use]
    pub fn to_ref_prefix(self) -> String {
        format!("{REFS_CHANGES}{:02}/{}/", self.0 % 100, self.0)
    }

    /// Name of the ref holding the change's review metadata.
    #[must_use]
    pub fn meta_ref(self) -> String {
        format!("{}meta", self.to_ref_prefix())
    }

    /// Parse the change out of a ref under `refs/changes/`, returning the id and
    /// the remainder after the change prefix.
    ///
    /// The name must start with the change's canonical prefix (no sign, no
    /// leading zeros, matching shard) followed by a single non-empty component.
    #[must_use]
    pub fn from_ref(name: &str) -> Option<(Self, &str)> {
        let rest = name.strip_prefix(REFS_CHANGES)?;
        let (_, rest) = rest.split_once('/')?;
        let (number, leaf) = rest.split_once('/')?;
        let id: Self = number.parse().ok()?;
        let leaf = name.strip_prefix(id.to_ref_prefix().as_str())?;
        if leaf.is_empty() || leaf.contains('/') {
            return None;
        }
        Some((id, leaf))
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChangeId {
    type Err = ChangeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s.parse().map_err(|source| ChangeIdParseError::NotANumber {
            input: s.to_owned(),
            source,
        })?;
        if value == 0 {
            return Err(ChangeIdParseError::Zero);
        }
        Ok(Self(value))
    }
}

impl Serialize for ChangeId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for ChangeId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u32::deserialize(d)?;
        if value == 0 {
            return Err(serde::de::Error::custom(ChangeIdParseError::Zero));
        }
        Ok(Self(value))
    }
}

/// Name of a hosted project (repository).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    /// Wrap a project name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProjectName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_prefix_is_sharded_by_last_two_digits() {
        assert_eq!(ChangeId(12345).to_ref_prefix(), "refs/changes/45/12345/");
        assert_eq!(ChangeId(7).to_ref_prefix(), "refs/changes/07/7/");
        assert_eq!(ChangeId(100).meta_ref(), "refs/changes/00/100/meta");
    }

    #[test]
    fn from_ref_returns_change_and_leaf() {
        assert_eq!(
            ChangeId::from_ref("refs/changes/45/12345/3"),
            Some((ChangeId(12345), "3"))
        );
        assert_eq!(
            ChangeId::from_ref("refs/changes/07/7/meta"),
            Some((ChangeId(7), "meta"))
        );
    }

    #[test]
    fn from_ref_rejects_bad_shards_and_missing_leaf() {
        assert_eq!(ChangeId::from_ref("refs/changes/44/12345/1"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/7/7/1"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/07/7/"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/07/7"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/00/0/1"), None);
        assert_eq!(ChangeId::from_ref("refs/heads/main"), None);
    }

    #[test]
    fn from_ref_rejects_non_canonical_names() {
        assert_eq!(ChangeId::from_ref("refs/changes/07/007/1"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/07/+7/1"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/07/7/1/extra"), None);
        assert_eq!(ChangeId::from_ref("refs/changes/07/7/meta/"), None);
    }

    #[test]
    fn parse_rejects_zero_and_garbage() {
        assert_eq!("0".parse::<ChangeId>(), Err(ChangeIdParseError::Zero));
        assert!(matches!(
            "abc".parse::<ChangeId>(),
            Err(ChangeIdParseError::NotANumber { .. })
        ));
    }

    #[test]
    fn change_id_serializes_as_number() -> anyhow::Result<()> {
        let json = serde_json::to_string(&ChangeId(42))?;
        assert_eq!(json, "42");
        let parsed: ChangeId = serde_json::from_str(&json)?;
        assert_eq!(parsed, ChangeId(42));
        assert!(serde_json::from_str::<ChangeId>("0").is_err());
        Ok(())
    }
}
