use crate::integration::helpers::Fixture;
use relocase::error::ExitCode;
use relocase::sync::{Operation, OverwritePolicy, PendingAction, ReconcileOptions};

#[test]
fn test_keep_policy_preserves_destination() {
    let f = Fixture::with_files(&[("f.txt", "new")], &[("f.txt", "old")]);

    let steps = f.reconcile(ReconcileOptions::default().with_overwrite(OverwritePolicy::Keep));

    assert_eq!(
        steps[0].action,
        PendingAction::Conflict {
            to: f.target.join("f.txt"),
            operation: Operation::Copy,
        }
    );
    assert_eq!(f.read_target("f.txt").as_deref(), Some("old"));
    f.assert_cache_coherent();
}

#[test]
fn test_backup_policy_keeps_previous_version() {
    let f = Fixture::with_files(&[("f.txt", "new")], &[("f.txt", "old")]);

    assert_eq!(f.run(&["--overwrite", "backup"]), ExitCode::Success);

    assert_eq!(f.read_target("f.txt").as_deref(), Some("new"));
    assert_eq!(f.read_target("f.txt.bak").as_deref(), Some("old"));
    f.assert_cache_coherent();
}

#[test]
fn test_backup_names_do_not_collide() {
    let f = Fixture::with_files(&[("f.txt", "v3")], &[("f.txt", "v2"), ("f.txt.bak", "v1")]);

    f.run(&["--overwrite", "backup"]);

    assert_eq!(f.read_target("f.txt").as_deref(), Some("v3"));
    assert_eq!(f.read_target("f.txt.bak").as_deref(), Some("v1"));
    assert_eq!(f.read_target("f.txt.bak.1").as_deref(), Some("v2"));
}

#[test]
fn test_backed_up_content_can_be_relocated() {
    // g.txt arrives later in the walk with the content that f.txt replaced.
    let f = Fixture::with_files(&[("f.txt", "new"), ("g.txt", "old")], &[("f.txt", "old")]);

    let steps = f.reconcile(ReconcileOptions::default().with_overwrite(OverwritePolicy::Backup));

    assert!(matches!(
        steps[0].action,
        PendingAction::Copy {
            backup: Some(_),
            ..
        }
    ));
    assert_eq!(
        steps[1].action,
        PendingAction::Move {
            from: f.target.join("f.txt.bak"),
            to: f.target.join("g.txt"),
        }
    );
    assert_eq!(f.read_target("g.txt").as_deref(), Some("old"));
    assert_eq!(f.read_target("f.txt.bak"), None);
    f.assert_cache_coherent();
}

#[test]
fn test_overwrite_policy_from_config_file() {
    let f = Fixture::with_files(&[("f.txt", "new")], &[("f.txt", "old")]);
    std::fs::write(&f.config, "overwrite = \"keep\"\n").unwrap();

    f.run(&[]);

    assert_eq!(f.read_target("f.txt").as_deref(), Some("old"));
}
