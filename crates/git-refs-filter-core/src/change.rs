use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use time::OffsetDateTime;

use crate::id::ChangeId;

/// Review status of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Change is under review.
    New,
    /// Draft change from older metadata; still open for review.
    Draft,
    /// Change was submitted.
    Merged,
    /// Change was abandoned by its owner or an administrator.
    Abandoned,
}

impl ChangeStatus {
    /// Value written in the `Status:` footer of change metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Draft => "draft",
            Self::Merged => "merged",
            Self::Abandoned => "abandoned",
        }
    }

    /// Whether the change is still open for review.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Draft)
    }

    /// Whether the change reached a terminal state.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown `Status:` footer value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown change status '{0}'")]
pub struct ChangeStatusParseError(pub String);

impl FromStr for ChangeStatus {
    type Err = ChangeStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "draft" => Ok(Self::Draft),
            "merged" => Ok(Self::Merged),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(ChangeStatusParseError(s.to_owned())),
        }
    }
}

/// Change metadata decoded at one revision of its meta ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Change number.
    pub id: ChangeId,
    /// Status at this revision.
    pub status: ChangeStatus,
    /// Time of the most recent metadata update.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl ChangeRecord {
    /// Whether the change was updated strictly after `threshold`.
    #[must_use]
    pub fn updated_after(&self, threshold: OffsetDateTime) -> bool {
        self.last_updated > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn new_and_draft_changes_are_open() {
        assert!(ChangeStatus::New.is_open());
        assert!(ChangeStatus::Draft.is_open());
        assert!(ChangeStatus::Merged.is_closed());
        assert!(ChangeStatus::Abandoned.is_closed());
    }

    #[test]
    fn parses_footer_values_case_insensitively() {
        assert_eq!("new".parse::<ChangeStatus>(), Ok(ChangeStatus::New));
        assert_eq!(" MERGED ".parse::<ChangeStatus>(), Ok(ChangeStatus::Merged));
        assert_eq!("Abandoned".parse::<ChangeStatus>(), Ok(ChangeStatus::Abandoned));
        assert_eq!("DRAFT".parse::<ChangeStatus>(), Ok(ChangeStatus::Draft));
        assert_eq!(
            "submitted".parse::<ChangeStatus>(),
            Err(ChangeStatusParseError("submitted".into()))
        );
    }

    #[test]
    fn updated_after_is_strict() {
        let record = ChangeRecord {
            id: ChangeId(1),
            status: ChangeStatus::Abandoned,
            last_updated: datetime!(2024-05-01 12:00:00 UTC),
        };
        assert!(record.updated_after(datetime!(2024-05-01 11:59:59 UTC)));
        assert!(!record.updated_after(datetime!(2024-05-01 12:00:00 UTC)));
    }
}
