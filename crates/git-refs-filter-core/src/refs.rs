use crate::id::ChangeId;

/// Namespace of change refs.
pub const REFS_CHANGES: &str = "refs/changes/";
/// Namespace of per-account refs (user edits live here).
pub const REFS_USERS: &str = "refs/users/";
/// Leaf name of a change's metadata ref.
pub const META_LEAF: &str = "meta";

const EDIT_PREFIX: &str = "edit-";

/// What a ref name points at, as far as change visibility is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind<'a> {
    /// `refs/changes/NN/CC/P`.
    Patchset {
        /// Owning change.
        change: ChangeId,
        /// Patch set number.
        patchset: u32,
    },
    /// `refs/changes/NN/CC/meta`.
    ChangeMeta(ChangeId),
    /// Any other ref below a change prefix, e.g. `refs/changes/NN/CC/robot-comments`.
    ChangeOther {
        /// Owning change.
        change: ChangeId,
        /// Remainder after the change prefix.
        leaf: &'a str,
    },
    /// A ref under `refs/changes/` whose layout cannot be parsed.
    MalformedChange,
    /// `refs/users/NN/ACCOUNT/edit-CC/P`.
    UserEdit {
        /// Account owning the edit.
        account: u32,
        /// Edited change.
        change: ChangeId,
    },
    /// Everything else (branches, tags, config refs...).
    Other,
}

impl RefKind<'_> {
    /// Change owning the ref, when the ref lives under a change prefix.
    #[must_use]
    pub const fn change(&self) -> Option<ChangeId> {
        match *self {
            Self::Patchset { change, .. }
            | Self::ChangeMeta(change)
            | Self::ChangeOther { change, .. } => Some(change),
            _ => None,
        }
    }

    /// True for every ref in the `refs/changes/` namespace, malformed ones included.
    #[must_use]
    pub const fn is_change_ref(&self) -> bool {
        matches!(
            self,
            Self::Patchset { .. }
                | Self::ChangeMeta(_)
                | Self::ChangeOther { .. }
                | Self::MalformedChange
        )
    }
}

/// Classify a ref name.
#[must_use]
pub fn classify(name: &str) -> RefKind<'_> {
    if name.starts_with(REFS_CHANGES) {
        return match ChangeId::from_ref(name) {
            Some((change, META_LEAF)) => RefKind::ChangeMeta(change),
            Some((change, leaf)) => leaf.parse().map_or(
                RefKind::ChangeOther { change, leaf },
                |patchset| RefKind::Patchset { change, patchset },
            ),
            None => RefKind::MalformedChange,
        };
    }
    if let Some(rest) = name.strip_prefix(REFS_USERS)
        && let Some((account, change)) = parse_user_edit(rest)
    {
        return RefKind::UserEdit { account, change };
    }
    RefKind::Other
}

// NN/ACCOUNT/edit-CC/P
fn parse_user_edit(rest: &str) -> Option<(u32, ChangeId)> {
    let mut parts = rest.split('/');
    let shard = parts.next()?;
    let account: u32 = parts.next()?.parse().ok()?;
    let change: ChangeId = parts.next()?.strip_prefix(EDIT_PREFIX)?.parse().ok()?;
    let _patchset: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || shard != format!("{:02}", account % 100) {
        return None;
    }
    Some((account, change))
}
