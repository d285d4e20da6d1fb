use crate::integration::helpers::Fixture;
use relocase::error::ExitCode;
use relocase::sync::{Outcome, PendingAction, ReconcileOptions, SkipReason};

#[test]
fn test_relocation_then_idempotent_rerun() {
    let f = Fixture::with_files(&[("a.txt", "X")], &[("old/a.txt", "X")]);

    let steps = f.reconcile(ReconcileOptions::default());
    assert_eq!(steps.len(), 1);
    assert_eq!(
        steps[0].action,
        PendingAction::Move {
            from: f.target.join("old").join("a.txt"),
            to: f.target.join("a.txt"),
        }
    );
    assert_eq!(f.read_target("a.txt").as_deref(), Some("X"));
    assert_eq!(f.read_target("old/a.txt"), None);
    f.assert_cache_coherent();

    let again = f.reconcile(ReconcileOptions::default());
    assert_eq!(again.len(), 1);
    assert!(matches!(
        again[0].action,
        PendingAction::Skip {
            reason: SkipReason::AlreadyPlaced,
            ..
        }
    ));
}

#[test]
fn test_changed_content_is_transferred_over_old() {
    let f = Fixture::with_files(&[("f.txt", "new")], &[("f.txt", "old")]);

    let steps = f.reconcile(ReconcileOptions::default());
    assert!(matches!(
        steps[0].action,
        PendingAction::Copy { backup: None, .. }
    ));
    assert_eq!(steps[0].outcome, Outcome::Applied);
    assert_eq!(f.read_target("f.txt").as_deref(), Some("new"));
    f.assert_cache_coherent();
}

#[test]
fn test_placed_file_leaves_twin_untouched() {
    let f = Fixture::with_files(&[("f.txt", "X")], &[("f.txt", "X"), ("g.txt", "X")]);

    let steps = f.reconcile(ReconcileOptions::default());
    assert_eq!(steps.len(), 1);
    assert!(matches!(steps[0].action, PendingAction::Skip { .. }));
    assert_eq!(f.read_target("g.txt").as_deref(), Some("X"));
    assert_eq!(f.target_files().len(), 2);
}

#[test]
fn test_shared_content_consumes_candidates_in_order() {
    let f = Fixture::with_files(
        &[("one.txt", "X"), ("two.txt", "X"), ("three.txt", "X")],
        &[("old/p.txt", "X"), ("old/q.txt", "X")],
    );

    let steps = f.reconcile(ReconcileOptions::default());
    let kinds: Vec<_> = steps
        .iter()
        .map(|s| match s.action {
            PendingAction::Move { .. } => "move",
            PendingAction::Copy { .. } => "copy",
            _ => "other",
        })
        .collect();
    // Walk order is sorted: one, three, two.
    assert_eq!(kinds, ["move", "move", "copy"]);
    assert_eq!(
        steps[0].action,
        PendingAction::Move {
            from: f.target.join("old").join("p.txt"),
            to: f.target.join("one.txt"),
        }
    );

    let files = f.target_files();
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        ["one.txt", "three.txt", "two.txt"]
    );
    f.assert_cache_coherent();
}

#[test]
fn test_no_source_file_is_lost() {
    let source = [
        ("docs/readme.md", "readme"),
        ("docs/notes.md", "notes"),
        ("img/a.png", "png-a"),
        ("empty.txt", ""),
    ];
    let f = Fixture::with_files(
        &source,
        &[("archive/readme.md", "readme"), ("img/a.png", "stale")],
    );

    assert_eq!(f.run(&[]), ExitCode::Success);

    let files = f.target_files();
    for (key, content) in source {
        assert_eq!(files.get(key).map(String::as_str), Some(content), "{key}");
    }
    assert!(!files.contains_key("archive/readme.md"));
    f.assert_cache_coherent();
}

#[test]
fn test_second_run_has_no_transfers() {
    let f = Fixture::with_files(
        &[("a/1.txt", "1"), ("b/2.txt", "2"), ("c.txt", "3")],
        &[("moved/1.txt", "1"), ("c.txt", "old")],
    );
    assert_eq!(f.run(&[]), ExitCode::Success);

    let steps = f.reconcile(ReconcileOptions::default());
    assert_eq!(steps.len(), 3);
    assert!(steps
        .iter()
        .all(|s| matches!(s.action, PendingAction::Skip { .. })));
}

#[test]
fn test_occupied_destination_is_never_overwritten_by_move() {
    // m.txt wants the file at z.txt, but z.txt itself is still expected.
    let f = Fixture::with_files(
        &[("m.txt", "X"), ("z.txt", "Y")],
        &[("z.txt", "X"), ("m.txt", "Z")],
    );

    let steps = f.reconcile(ReconcileOptions::default());
    assert!(matches!(steps[0].action, PendingAction::Conflict { .. }));
    assert_eq!(f.read_target("m.txt").as_deref(), Some("Z"));
    assert_eq!(f.read_target("z.txt").as_deref(), Some("Y"));
    f.assert_cache_coherent();
}

#[test]
fn test_ignored_paths_are_left_alone() {
    let f = Fixture::with_files(&[("keep.txt", "k"), ("skip.tmp", "s")], &[]);

    assert_eq!(f.run(&["--ignore", "*.tmp"]), ExitCode::Success);

    let files = f.target_files();
    assert!(files.contains_key("keep.txt"));
    assert!(!files.contains_key("skip.tmp"));
}
