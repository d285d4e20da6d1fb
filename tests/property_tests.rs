use proptest::prelude::*;
use relocase::actions::NativeExecutor;
use relocase::cache::HashCache;
use relocase::scanner::path_utils::key_to_path;
use relocase::scanner::{HashAlgorithm, Hasher, ReservedPaths, Walker, WalkerConfig};
use relocase::sync::{
    ContentIndex, IndexOptions, PendingAction, ReconcileOptions, Reconciler, Step,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DB_NAME: &str = ".relocase.db";

fn walker_config(target: &Path) -> WalkerConfig {
    WalkerConfig::default().with_reserved(ReservedPaths::for_database(&target.join(DB_NAME)))
}

fn write_tree(root: &Path, files: &BTreeMap<String, String>) {
    for (key, content) in files {
        let path = key_to_path(root, key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn read_tree(root: &Path) -> BTreeMap<String, String> {
    Walker::new(root, walker_config(root))
        .walk()
        .map(|entry| {
            let entry = entry.unwrap();
            (entry.relative, fs::read_to_string(&entry.path).unwrap())
        })
        .collect()
}

fn sync(source: &Path, target: &Path) -> Vec<Step> {
    let mut cache = HashCache::open(&target.join(DB_NAME), HashAlgorithm::Blake3).unwrap();
    let options = IndexOptions::default().with_walker(walker_config(target));
    let (index, _) = ContentIndex::build(target, &mut cache, &Hasher::default(), &options).unwrap();
    let mut reconciler = Reconciler::new(
        target,
        index,
        cache,
        Box::new(NativeExecutor::new()),
        Hasher::default(),
        ReconcileOptions::default().with_walker(walker_config(target)),
    );
    let steps = reconciler
        .reconcile(source)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    reconciler.finish().close().unwrap();
    steps
}

/// Trees keyed `<prefix><dir>/<n>.txt`, with contents drawn from a small
/// alphabet so that digests are shared.
fn tree(prefix: &'static str) -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        (0u8..3, 0u8..20).prop_map(move |(dir, n)| format!("{prefix}{dir}/{n}.txt")),
        prop::sample::select(vec!["", "a", "b", "c", "abc"]).prop_map(String::from),
        0..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_sync_reproduces_source(source in tree("s"), target in tree("t")) {
        let dir = TempDir::new().unwrap();
        let (s, t) = (dir.path().join("s"), dir.path().join("t"));
        fs::create_dir_all(&s).unwrap();
        fs::create_dir_all(&t).unwrap();
        write_tree(&s, &source);
        write_tree(&t, &target);

        let steps = sync(&s, &t);
        prop_assert_eq!(steps.len(), source.len());
        prop_assert!(steps.iter().all(|step| !step.is_failed()));

        // Every source file is present with its content.
        let after = read_tree(&t);
        for (key, content) in &source {
            prop_assert_eq!(after.get(key), Some(content));
        }

        // Moves only consume target files; nothing is ever duplicated away.
        let moved = steps
            .iter()
            .filter(|step| matches!(step.action, PendingAction::Move { .. }))
            .count();
        prop_assert_eq!(after.len(), source.len() + target.len() - moved);

        // The cache agrees with the tree.
        let cache = HashCache::open(&t.join(DB_NAME), HashAlgorithm::Blake3).unwrap();
        prop_assert_eq!(cache.len(), after.len());
        for (key, content) in &after {
            prop_assert_eq!(
                &cache.lookup(key).unwrap().digest,
                &Hasher::default().hash_bytes(content.as_bytes())
            );
        }
        drop(cache);

        // A second run has nothing left to do.
        let again = sync(&s, &t);
        let all_skipped = again
            .iter()
            .all(|step| matches!(step.action, PendingAction::Skip { .. }));
        prop_assert!(all_skipped, "second run was not all skips: {:?}", again);
        prop_assert_eq!(read_tree(&t), after);
    }

    #[test]
    fn test_renamed_tree_is_relocated_without_transfers(
        files in prop::collection::btree_map("[a-z]{1,8}", "[a-z]{1,16}", 1..10)
    ) {
        let dir = TempDir::new().unwrap();
        let (s, t) = (dir.path().join("s"), dir.path().join("t"));
        let source: BTreeMap<String, String> = files
            .iter()
            .map(|(name, content)| (format!("new/{name}"), content.clone()))
            .collect();
        let target: BTreeMap<String, String> = files
            .iter()
            .map(|(name, content)| (format!("old/{name}"), content.clone()))
            .collect();
        fs::create_dir_all(&s).unwrap();
        fs::create_dir_all(&t).unwrap();
        write_tree(&s, &source);
        write_tree(&t, &target);

        let steps = sync(&s, &t);

        let all_moved = steps
            .iter()
            .all(|step| matches!(step.action, PendingAction::Move { .. }));
        prop_assert!(all_moved, "rename needed a transfer: {:?}", steps);
        prop_assert_eq!(read_tree(&t), source);
    }
}
