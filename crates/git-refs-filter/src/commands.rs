use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use git_refs_filter_app::{
    AllRefsVisible, ProjectPermissions, RefFilterOptions, RefPermission, RefPermissions, RefsFilter,
    RefsFilterConfig, RepoHandle, Viewer, ref_map,
};
use git_refs_filter_core::ProjectName;
use git_refs_filter_store_git::GitChangeStore;
use serde::Serialize;
use tracing::info;

/// Repository and filter shared by all commands of one invocation.
pub struct Context {
    store: Arc<GitChangeStore>,
    filter: RefsFilter,
}

impl Context {
    pub fn open(repo_path: &str, config_path: Option<&Path>) -> Result<Self> {
        let store = GitChangeStore::open(repo_path)
            .with_context(|| format!("failed to open repository at {repo_path}"))?;
        let config = match config_path {
            Some(path) => RefsFilterConfig::from_path(path)?,
            None => RefsFilterConfig::load(repo_path)?,
        };
        Ok(Self {
            store: Arc::new(store),
            filter: RefsFilter::new(config),
        })
    }

    fn repo(&self) -> RepoHandle {
        self.store.clone()
    }
}

#[derive(Serialize)]
struct AdvertisedRef {
    name: String,
    target: String,
}

pub fn ls_refs(
    ctx: &Context,
    project: &ProjectName,
    unfiltered: bool,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let viewer = if unfiltered {
        Viewer::unfiltered("cli")
    } else {
        Viewer::filtered("cli")
    };
    let repo = ctx.repo();
    let refs = ref_map(ctx.store.all_refs()?);
    let total = refs.len();

    let permissions = ctx
        .filter
        .for_project(AllRefsVisible::new(project.clone()), project.clone(), &viewer);
    let Ok(visible) = permissions.filter(refs, &repo, &RefFilterOptions::default());
    info!(%project, total, visible = visible.len(), "Listed refs");

    if json {
        let refs: Vec<AdvertisedRef> = visible
            .into_values()
            .map(|r| AdvertisedRef {
                name: r.name,
                target: r.target.to_string(),
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&refs)?)?;
    } else {
        for r in visible.values() {
            writeln!(out, "{}\t{}", r.target, r.name)?;
        }
    }
    Ok(())
}

pub fn check_ref(
    ctx: &Context,
    project: &ProjectName,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    let repo = ctx.repo();
    let permissions = ctx.filter.for_project(
        AllRefsVisible::new(project.clone()),
        project.clone(),
        &Viewer::filtered("cli"),
    );
    let readable = permissions.for_ref(name).test_cond(RefPermission::Read);
    let verdict = if readable && permissions.is_ref_visible(&repo, name) {
        "visible"
    } else {
        "hidden"
    };
    writeln!(out, "{name}\t{verdict}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Oid, Repository, Signature, Time};
    use std::fs;
    use tempfile::TempDir;

    fn commit(repo: &Repository, refname: &str, message: &str, seconds: i64) -> Result<Oid> {
        let sig = Signature::new("Reviewer", "reviewer@example.invalid", &Time::new(seconds, 0))?;
        let tree = repo.find_tree(repo.treebuilder(None)?.write()?)?;
        let parent = repo
            .find_reference(refname)
            .ok()
            .and_then(|r| r.target())
            .map(|oid| repo.find_commit(oid))
            .transpose()?;
        let parents: Vec<_> = parent.iter().collect();
        Ok(repo.commit(Some(refname), &sig, &sig, message, &tree, &parents)?)
    }

    fn fixture() -> Result<(TempDir, Context)> {
        let dir = TempDir::new()?;
        let repo = Repository::init(dir.path())?;
        commit(&repo, "refs/heads/main", "Initial commit", 1_000)?;
        commit(&repo, "refs/changes/01/1/1", "Open work", 1_000)?;
        commit(&repo, "refs/changes/01/1/meta", "Create change\n\nStatus: new\n", 1_000)?;
        commit(&repo, "refs/changes/02/2/1", "Dropped work", 1_000)?;
        commit(&repo, "refs/changes/02/2/meta", "Create change\n\nStatus: new\n", 1_000)?;
        commit(&repo, "refs/changes/02/2/meta", "Abandon\n\nStatus: abandoned\n", 2_000)?;

        let config = dir.path().join("filter.toml");
        fs::write(&config, "[filter]\nclosed_changes_grace_time_sec = 60\n")?;
        let ctx = Context::open(&dir.path().display().to_string(), Some(&config))?;
        Ok((dir, ctx))
    }

    #[test]
    fn ls_refs_hides_closed_changes_and_meta() -> Result<()> {
        let (_dir, ctx) = fixture()?;
        let mut out = Vec::new();
        ls_refs(&ctx, &"app".into(), false, false, &mut out)?;

        let text = String::from_utf8(out)?;
        let names: Vec<&str> = text
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .collect();
        assert_eq!(names, vec!["refs/changes/01/1/1", "refs/heads/main"]);
        Ok(())
    }

    #[test]
    fn ls_refs_unfiltered_lists_everything_as_json() -> Result<()> {
        let (_dir, ctx) = fixture()?;
        let mut out = Vec::new();
        ls_refs(&ctx, &"app".into(), true, true, &mut out)?;

        let refs: Vec<serde_json::Value> = serde_json::from_slice(&out)?;
        assert_eq!(refs.len(), 5);
        assert!(refs.iter().any(|r| r["name"] == "refs/changes/02/2/meta"));
        Ok(())
    }

    #[test]
    fn check_ref_reports_verdict() -> Result<()> {
        let (_dir, ctx) = fixture()?;
        let mut out = Vec::new();
        check_ref(&ctx, &"app".into(), "refs/changes/01/1/1", &mut out)?;
        check_ref(&ctx, &"app".into(), "refs/changes/02/2/1", &mut out)?;
        assert_eq!(
            String::from_utf8(out)?,
            "refs/changes/01/1/1\tvisible\nrefs/changes/02/2/1\thidden\n"
        );
        Ok(())
    }
}
