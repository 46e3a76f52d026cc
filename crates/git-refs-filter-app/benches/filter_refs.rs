#![allow(missing_docs, clippy::expect_used)]

use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use git_refs_filter_app::{
    AllRefsVisible, ManualClock, MemoryChangeStore, ProjectPermissions, RefFilterOptions, RefMap,
    RefsFilter, RefsFilterConfig, RepoHandle, Viewer, ref_map,
};
use git_refs_filter_core::{ChangeId, ChangeStatus};
use git2::Oid;
use time::{Duration, OffsetDateTime};

fn build_repo(changes: u32) -> (RepoHandle, RefMap) {
    let store = MemoryChangeStore::new();
    let now = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
    let mut names = vec!["refs/heads/main".to_owned()];
    for id in 1..=changes {
        let change = ChangeId(id);
        let status = match id % 3 {
            0 => ChangeStatus::New,
            1 => ChangeStatus::Merged,
            _ => ChangeStatus::Abandoned,
        };
        store
            .update(change, status, now - Duration::seconds(i64::from(id)))
            .expect("update change");
        names.push(format!("{}1", change.to_ref_prefix()));
        names.push(change.meta_ref());
    }
    let refs = ref_map(names.into_iter().map(|name| (name, Oid::zero())));
    let repo: RepoHandle = Arc::new(store);
    (repo, refs)
}

fn warm_cache_filter_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_refs_warm_cache");
    for &changes in &[100u32, 1_000, 10_000] {
        let (repo, refs) = build_repo(changes);
        let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)));
        let config = RefsFilterConfig::default()
            .with_closed_changes_grace_time(Some(Duration::seconds(500)));
        let filter = RefsFilter::with_clock(config, clock);
        let permissions = filter.for_project(
            AllRefsVisible::new("bench".into()),
            "bench".into(),
            &Viewer::filtered("bench"),
        );
        // Populate the caches once.
        let Ok(_) = permissions.filter(refs.clone(), &repo, &RefFilterOptions::default());

        group.bench_with_input(BenchmarkId::from_parameter(changes), &refs, |b, refs| {
            b.iter_batched(
                || refs.clone(),
                |refs| {
                    let Ok(visible) = permissions.filter(refs, &repo, &RefFilterOptions::default());
                    black_box(visible);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, warm_cache_filter_benchmark);
criterion_main!(benches);
