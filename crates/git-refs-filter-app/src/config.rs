//! Filter configuration loaded from `.git-refs-filter/config.toml`.
//!
//! Global `[filter]` settings apply to every project; `[project."name"]`
//! sections override them, with project hide rules evaluated after the global
//! ones.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use git_refs_filter_core::{HideRefParseError, HideRefs, ProjectName, RefKind, classify};
use git2::Repository;
use serde::Deserialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

const CONFIG_DIR: &str = ".git-refs-filter";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Repository discovery failed.
    #[error("failed to discover repository: {0}")]
    Repository(#[from] git2::Error),
    /// Config file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: io::Error,
    },
    /// Config file is not valid TOML for this schema.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// File being parsed (`<inline>` for strings).
        path: PathBuf,
        /// TOML failure.
        #[source]
        source: toml::de::Error,
    },
    /// A hide-ref pattern is invalid.
    #[error("invalid hide_refs in {scope}: {source}")]
    HideRef {
        /// `filter` or `project.<name>`.
        scope: String,
        /// Pattern failure.
        #[source]
        source: HideRefParseError,
    },
    /// A cache bound is zero.
    #[error("cache.{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Cache bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    open_changes_max_entries: u64,
    changes_ts_max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            open_changes_max_entries: DEFAULT_MAX_ENTRIES,
            changes_ts_max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Explicit bounds for the state and timestamp caches.
    #[must_use]
    pub const fn new(open_changes_max_entries: u64, changes_ts_max_entries: u64) -> Self {
        Self {
            open_changes_max_entries,
            changes_ts_max_entries,
        }
    }

    /// Maximum entries of the state cache.
    #[must_use]
    pub const fn open_changes_max_entries(&self) -> u64 {
        self.open_changes_max_entries
    }

    /// Maximum entries of the timestamp cache.
    #[must_use]
    pub const fn changes_ts_max_entries(&self) -> u64 {
        self.changes_ts_max_entries
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.open_changes_max_entries == 0 {
            return Err(ConfigError::ZeroCapacity("open_changes_max_entries"));
        }
        if self.changes_ts_max_entries == 0 {
            return Err(ConfigError::ZeroCapacity("changes_ts_max_entries"));
        }
        Ok(())
    }
}

/// Filter settings in effect for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFilterConfig {
    closed_changes_grace_time: Option<Duration>,
    hide_refs: HideRefs,
    hide_user_edits: bool,
}

impl Default for ProjectFilterConfig {
    fn default() -> Self {
        Self {
            closed_changes_grace_time: None,
            hide_refs: HideRefs::default(),
            hide_user_edits: true,
        }
    }
}

impl ProjectFilterConfig {
    /// How long closed changes stay visible; `None` hides them at once.
    #[must_use]
    pub const fn closed_changes_grace_time(&self) -> Option<Duration> {
        self.closed_changes_grace_time
    }

    /// Always-hidden ref rules.
    #[must_use]
    pub const fn hide_refs(&self) -> &HideRefs {
        &self.hide_refs
    }

    /// Whether user edit refs are hidden.
    #[must_use]
    pub const fn hide_user_edits(&self) -> bool {
        self.hide_user_edits
    }

    /// Closed changes last updated at or before this instant are hidden.
    #[must_use]
    pub fn closed_changes_threshold(&self, now: OffsetDateTime) -> OffsetDateTime {
        // Out-of-range grace times degrade to hiding immediately.
        self.closed_changes_grace_time
            .and_then(|grace| now.checked_sub(grace))
            .unwrap_or(now)
    }

    /// Whether `name` is hidden regardless of change state.
    #[must_use]
    pub fn hides(&self, name: &str) -> bool {
        self.hide_refs.is_hidden(name)
            || (self.hide_user_edits && matches!(classify(name), RefKind::UserEdit { .. }))
    }
}

/// Top-level configuration loaded from `.git-refs-filter/config.toml`.
#[derive(Debug, Clone, Default)]
pub struct RefsFilterConfig {
    filter: ProjectFilterConfig,
    projects: BTreeMap<ProjectName, ProjectFilterConfig>,
    cache: CacheConfig,
}

impl RefsFilterConfig {
    /// Load configuration by discovering the nearest Git repository from `cwd_or_repo`.
    ///
    /// # Errors
    /// Returns an error if no repository is found or the file is invalid.
    pub fn load(cwd_or_repo: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let repo = Repository::discover(cwd_or_repo)?;
        Self::from_workdir(repo_workdir(&repo))
    }

    /// Load configuration from a known working tree directory.
    ///
    /// # Errors
    /// Returns an error if the file exists but is invalid.
    pub fn from_workdir(workdir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = workdir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_path(config_path)
    }

    /// Load configuration from an explicit file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Path::new("<inline>"))
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        raw.resolve()
    }

    /// Replace the global grace time.
    #[must_use]
    pub fn with_closed_changes_grace_time(mut self, grace: Option<Duration>) -> Self {
        self.filter.closed_changes_grace_time = grace;
        self
    }

    /// Replace the global hide-ref rules.
    #[must_use]
    pub fn with_hide_refs(mut self, hide_refs: HideRefs) -> Self {
        self.filter.hide_refs = hide_refs;
        self
    }

    /// Settings for `project`: its overrides when configured, the global ones otherwise.
    #[must_use]
    pub fn for_project(&self, project: &ProjectName) -> &ProjectFilterConfig {
        self.projects.get(project).unwrap_or(&self.filter)
    }

    /// Cache bounds.
    #[must_use]
    pub const fn cache(&self) -> &CacheConfig {
        &self.cache
    }
}

fn repo_workdir(repo: &Repository) -> PathBuf {
    if let Some(workdir) = repo.workdir() {
        return workdir.to_path_buf();
    }
    // Bare repositories don't have a working tree. Fallback to the repository path itself.
    repo.path()
        .parent()
        .map_or_else(|| repo.path().to_path_buf(), Path::to_path_buf)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    filter: RawFilter,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    project: BTreeMap<String, RawProject>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFilter {
    closed_changes_grace_time_sec: Option<u64>,
    #[serde(default)]
    hide_refs: Vec<String>,
    #[serde(default = "default_true")]
    hide_user_edits: bool,
}

impl Default for RawFilter {
    fn default() -> Self {
        Self {
            closed_changes_grace_time_sec: None,
            hide_refs: Vec::new(),
            hide_user_edits: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    closed_changes_grace_time_sec: Option<u64>,
    #[serde(default)]
    hide_refs: Vec<String>,
    hide_user_edits: Option<bool>,
}

const fn default_true() -> bool {
    true
}

impl RawConfig {
    fn resolve(self) -> Result<RefsFilterConfig, ConfigError> {
        self.cache.validate()?;
        let filter = ProjectFilterConfig {
            closed_changes_grace_time: self.filter.closed_changes_grace_time_sec.map(grace),
            hide_refs: hide_refs(&self.filter.hide_refs, "filter")?,
            hide_user_edits: self.filter.hide_user_edits,
        };

        let mut projects = BTreeMap::new();
        for (name, raw) in self.project {
            let scope = format!("project.{name}");
            // Project patterns come last so they take precedence over global ones.
            let mut rules = filter.hide_refs.clone();
            rules.extend(&hide_refs(&raw.hide_refs, &scope)?);
            let resolved = ProjectFilterConfig {
                closed_changes_grace_time: raw
                    .closed_changes_grace_time_sec
                    .map(grace)
                    .or(filter.closed_changes_grace_time),
                hide_refs: rules,
                hide_user_edits: raw.hide_user_edits.unwrap_or(filter.hide_user_edits),
            };
            projects.insert(ProjectName::from(name), resolved);
        }

        Ok(RefsFilterConfig {
            filter,
            projects,
            cache: self.cache,
        })
    }
}

fn grace(seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
}

fn hide_refs(patterns: &[String], scope: &str) -> Result<HideRefs, ConfigError> {
    HideRefs::parse(patterns).map_err(|source| ConfigError::HideRef {
        scope: scope.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;
    use time::macros::datetime;

    #[test]
    fn missing_config_yields_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config = RefsFilterConfig::from_workdir(dir.path())?;
        let project = config.for_project(&"any".into());
        assert_eq!(project.closed_changes_grace_time(), None);
        assert!(project.hide_refs().is_empty());
        assert!(project.hide_user_edits());
        assert_eq!(*config.cache(), CacheConfig::default());
        Ok(())
    }

    #[test]
    fn parses_filter_cache_and_project_sections() -> Result<()> {
        let config = RefsFilterConfig::from_toml_str(
            r#"
            [filter]
            closed_changes_grace_time_sec = 300
            hide_refs = ["refs/heads/sandbox/", "!refs/heads/sandbox/mine"]

            [cache]
            open_changes_max_entries = 10
            changes_ts_max_entries = 20

            [project."team/app"]
            closed_changes_grace_time_sec = 5
            hide_refs = ["refs/heads/wip/"]
            hide_user_edits = false
            "#,
        )?;
        assert_eq!(config.cache().open_changes_max_entries(), 10);
        assert_eq!(config.cache().changes_ts_max_entries(), 20);

        let global = config.for_project(&"other".into());
        assert_eq!(global.closed_changes_grace_time(), Some(Duration::seconds(300)));
        assert!(global.hides("refs/heads/sandbox/foo"));
        assert!(!global.hides("refs/heads/sandbox/mine"));
        assert!(global.hides("refs/users/05/1000005/edit-42/1"));

        let team = config.for_project(&"team/app".into());
        assert_eq!(team.closed_changes_grace_time(), Some(Duration::seconds(5)));
        assert!(team.hides("refs/heads/sandbox/foo"));
        assert!(team.hides("refs/heads/wip/x"));
        assert!(!team.hides("refs/users/05/1000005/edit-42/1"));
        Ok(())
    }

    #[test]
    fn project_without_grace_inherits_global() -> Result<()> {
        let config = RefsFilterConfig::from_toml_str(
            r#"
            [filter]
            closed_changes_grace_time_sec = 60
            [project.quiet]
            hide_refs = ["refs/heads/secret"]
            "#,
        )?;
        let quiet = config.for_project(&"quiet".into());
        assert_eq!(quiet.closed_changes_grace_time(), Some(Duration::seconds(60)));
        assert!(quiet.hides("refs/heads/secret"));
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            RefsFilterConfig::from_toml_str("[filter]\nhide_refs = [\"heads/main\"]"),
            Err(ConfigError::HideRef { .. })
        ));
        assert!(matches!(
            RefsFilterConfig::from_toml_str("[cache]\nopen_changes_max_entries = 0"),
            Err(ConfigError::ZeroCapacity("open_changes_max_entries"))
        ));
        assert!(matches!(
            RefsFilterConfig::from_toml_str("[filter]\nclosed_changes_grace_time_sec = -5"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            RefsFilterConfig::from_toml_str("[filter]\nunknown = 1"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn threshold_defaults_to_now() {
        let now = datetime!(2024-01-01 0:00:10 UTC);
        let config = ProjectFilterConfig::default();
        assert_eq!(config.closed_changes_threshold(now), now);

        let config = RefsFilterConfig::default()
            .with_closed_changes_grace_time(Some(Duration::seconds(5)));
        assert_eq!(
            config.for_project(&"p".into()).closed_changes_threshold(now),
            datetime!(2024-01-01 0:00:05 UTC)
        );
    }

    #[test]
    fn loads_from_discovered_repository() -> Result<()> {
        let dir = TempDir::new()?;
        Repository::init(dir.path())?;
        fs::create_dir(dir.path().join(CONFIG_DIR))?;
        fs::write(
            dir.path().join(CONFIG_DIR).join(CONFIG_FILE),
            "[filter]\nclosed_changes_grace_time_sec = 5\n",
        )?;
        let config = RefsFilterConfig::load(dir.path())?;
        assert_eq!(
            config.for_project(&"p".into()).closed_changes_grace_time(),
            Some(Duration::seconds(5))
        );
        Ok(())
    }
}
