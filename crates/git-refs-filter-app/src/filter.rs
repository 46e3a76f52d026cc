//! Ref filtering by change state.
//!
//! [`ForProjectFilter`] wraps the host permission backend. After the backend has
//! reduced the refs to what the viewer may see, refs of changes that are closed
//! and older than the grace period are removed, change meta refs are always
//! removed, and the configured hide-ref rules are applied. Every ambiguous case
//! hides.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use git_refs_filter_core::{ChangeId, ProjectName, RefKind, classify};
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::cache_key::ChangeCacheKey;
use crate::change_cache::ChangeCaches;
use crate::change_store::RepoHandle;
use crate::clock::{Clock, SystemClock};
use crate::config::{ProjectFilterConfig, RefsFilterConfig};
use crate::permissions::{ProjectPermission, ProjectPermissions, RefFilterOptions, RefMap};
use crate::scanner::ChangeScanner;

/// Who the refs are advertised to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    name: String,
    filter_out_closed_changes: bool,
}

impl Viewer {
    /// Viewer subject to closed-change filtering.
    #[must_use]
    pub fn filtered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_out_closed_changes: true,
        }
    }

    /// Viewer that sees whatever the permission backend allows.
    #[must_use]
    pub fn unfiltered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_out_closed_changes: false,
        }
    }

    /// Viewer name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the viewer holds the "filter out closed changes" capability.
    #[must_use]
    pub const fn filters_closed_changes(&self) -> bool {
        self.filter_out_closed_changes
    }
}

/// Change ref prefixes (`refs/changes/NN/CC/`) visible during one filter call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateOpenSet {
    prefixes: HashSet<String>,
}

impl CandidateOpenSet {
    fn insert(&mut self, change: ChangeId) {
        self.prefixes.insert(change.to_ref_prefix());
    }

    /// Whether refs of `change` are visible.
    #[must_use]
    pub fn contains(&self, change: ChangeId) -> bool {
        self.prefixes.contains(&change.to_ref_prefix())
    }

    /// Visible prefixes, sorted.
    #[must_use]
    pub fn prefixes(&self) -> BTreeSet<&str> {
        self.prefixes.iter().map(String::as_str).collect()
    }

    /// Number of visible changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether no change is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Process-wide entry point holding configuration, caches and the clock.
#[derive(Clone)]
pub struct RefsFilter {
    config: Arc<RefsFilterConfig>,
    caches: Arc<ChangeCaches>,
    clock: Arc<dyn Clock>,
}

impl RefsFilter {
    /// Filter using the wall clock.
    #[must_use]
    pub fn new(config: RefsFilterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Filter using `clock` for grace-period decisions.
    #[must_use]
    pub fn with_clock(config: RefsFilterConfig, clock: Arc<dyn Clock>) -> Self {
        let caches = Arc::new(ChangeCaches::new(config.cache()));
        Self {
            config: Arc::new(config),
            caches,
            clock,
        }
    }

    /// Shared change-state caches.
    #[must_use]
    pub const fn caches(&self) -> &Arc<ChangeCaches> {
        &self.caches
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &RefsFilterConfig {
        &self.config
    }

    /// Wrap `inner` for `project` as seen by `viewer`.
    #[must_use]
    pub fn for_project<P>(
        &self,
        inner: P,
        project: ProjectName,
        viewer: &Viewer,
    ) -> ForProjectFilter<P>
    where
        P: ProjectPermissions,
    {
        ForProjectFilter {
            inner,
            project,
            config: Arc::clone(&self.config),
            caches: Arc::clone(&self.caches),
            clock: Arc::clone(&self.clock),
            enabled: viewer.filters_closed_changes(),
        }
    }
}

/// Permission backend wrapper that hides refs of closed changes.
pub struct ForProjectFilter<P> {
    inner: P,
    project: ProjectName,
    config: Arc<RefsFilterConfig>,
    caches: Arc<ChangeCaches>,
    clock: Arc<dyn Clock>,
    enabled: bool,
}

impl<P> ForProjectFilter<P> {
    /// Project being filtered.
    #[must_use]
    pub const fn project(&self) -> &ProjectName {
        &self.project
    }

    fn project_config(&self) -> &ProjectFilterConfig {
        self.config.for_project(&self.project)
    }

    fn threshold(&self) -> OffsetDateTime {
        self.project_config()
            .closed_changes_threshold(self.clock.now())
    }

    /// Scan the project once and collect the changes whose refs stay visible:
    /// open ones, and closed ones updated after the grace threshold.
    ///
    /// Fails closed: a scan failure or an expired deadline gives an empty set.
    pub fn candidate_open_set(
        &self,
        repo: &RepoHandle,
        opts: &RefFilterOptions,
    ) -> CandidateOpenSet {
        let scan = match ChangeScanner::new(self.project.clone()).scan(repo.as_ref()) {
            Ok(scan) => scan,
            Err(e) => {
                error!(
                    project = %self.project,
                    error = %e,
                    "Cannot load changes, assuming no changes are visible"
                );
                return CandidateOpenSet::default();
            }
        };

        let threshold = self.threshold();
        let mut open = CandidateOpenSet::default();
        for item in scan {
            if opts.is_expired() {
                warn!(
                    project = %self.project,
                    "Change scan exceeded its deadline, assuming no changes are visible"
                );
                return CandidateOpenSet::default();
            }
            match item {
                Ok(scanned) => {
                    let key = ChangeCacheKey::create(
                        repo,
                        scanned.change,
                        scanned.revision,
                        self.project.clone(),
                    );
                    if self.is_change_visible(&key, threshold) {
                        open.insert(scanned.change);
                    } else {
                        debug!(
                            project = %self.project,
                            change = %scanned.change,
                            "Skipping change"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        project = %self.project,
                        change = %e.change(),
                        error = %e,
                        "Failed to load change"
                    );
                }
            }
        }
        open
    }

    /// Per-change lookup for a single ref, without scanning the project.
    ///
    /// Applies the change-state and hide-ref rules only; permission checks are
    /// the wrapped backend's business.
    pub fn is_ref_visible(&self, repo: &RepoHandle, name: &str) -> bool {
        if !self.enabled {
            return true;
        }
        if self.project_config().hides(name) {
            return false;
        }
        match classify(name) {
            RefKind::Patchset { change, .. } | RefKind::ChangeOther { change, .. } => {
                self.is_current_change_visible(repo, change)
            }
            RefKind::ChangeMeta(_) | RefKind::MalformedChange => false,
            RefKind::UserEdit { .. } | RefKind::Other => true,
        }
    }

    fn is_current_change_visible(&self, repo: &RepoHandle, change: ChangeId) -> bool {
        let revision = match repo.resolve_current_revision(change) {
            Ok(Some(revision)) if !revision.is_zero() => revision,
            Ok(_) => {
                debug!(project = %self.project, %change, "Change has no readable metadata");
                return false;
            }
            Err(e) => {
                warn!(
                    project = %self.project,
                    %change,
                    error = %e,
                    "Failed to resolve change metadata"
                );
                return false;
            }
        };
        let key = ChangeCacheKey::create(repo, change, revision, self.project.clone());
        self.is_change_visible(&key, self.threshold())
    }

    fn is_change_visible(&self, key: &ChangeCacheKey, threshold: OffsetDateTime) -> bool {
        let visible = self.caches.is_open(key).and_then(|open| {
            if open {
                Ok(true)
            } else {
                self.caches
                    .last_updated(key)
                    .map(|last_updated| last_updated > threshold)
            }
        });
        visible.unwrap_or_else(|e| {
            warn!(
                project = %self.project,
                change = %key.change_id(),
                error = %e,
                "Failed to load change"
            );
            false
        })
    }

    fn keeps_change_ref(name: &str, open: &CandidateOpenSet) -> bool {
        match classify(name) {
            RefKind::Patchset { change, .. } | RefKind::ChangeOther { change, .. } => {
                open.contains(change)
            }
            RefKind::ChangeMeta(_) | RefKind::MalformedChange => false,
            RefKind::UserEdit { .. } | RefKind::Other => true,
        }
    }
}

impl<P: ProjectPermissions> ProjectPermissions for ForProjectFilter<P> {
    type Error = P::Error;
    type ForRef = P::ForRef;

    fn filter(
        &self,
        refs: RefMap,
        repo: &RepoHandle,
        opts: &RefFilterOptions,
    ) -> Result<RefMap, Self::Error> {
        let permitted = self.inner.filter(refs, repo, opts)?;
        if !self.enabled {
            return Ok(permitted);
        }

        let config = self.project_config();
        let open = if permitted.keys().any(|name| classify(name).is_change_ref()) {
            self.candidate_open_set(repo, opts)
        } else {
            CandidateOpenSet::default()
        };

        let total = permitted.len();
        let filtered: RefMap = permitted
            .into_iter()
            .filter(|(name, _)| Self::keeps_change_ref(name, &open) && !config.hides(name))
            .collect();
        debug!(
            project = %self.project,
            total,
            visible = filtered.len(),
            open_changes = open.len(),
            "Filtered refs"
        );
        Ok(filtered)
    }

    fn check(&self, perm: ProjectPermission) -> Result<(), Self::Error> {
        self.inner.check(perm)
    }

    fn test(
        &self,
        perms: &[ProjectPermission],
    ) -> Result<BTreeSet<ProjectPermission>, Self::Error> {
        self.inner.test(perms)
    }

    fn test_cond(&self, perm: ProjectPermission) -> bool {
        self.inner.test_cond(perm)
    }

    fn resource_path(&self) -> String {
        self.inner.resource_path()
    }

    fn for_ref(&self, name: &str) -> Self::ForRef {
        self.inner.for_ref(name)
    }
}
