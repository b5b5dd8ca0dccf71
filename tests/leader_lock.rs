// tests/leader_lock.rs

use crawl_console::leader::LeaderLock;

#[test]
fn second_acquire_fails_while_held_and_succeeds_after_release() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run/scheduler.pid");

    let lock = LeaderLock::acquire(&path).unwrap();
    let pid = std::fs::read_to_string(&path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());

    let err = LeaderLock::acquire(&path).unwrap_err();
    assert!(err.to_string().contains("already running"), "{err}");

    drop(lock);
    assert!(!path.exists());
    let _again = LeaderLock::acquire(&path).unwrap();
}

#[cfg(unix)]
#[test]
fn stale_pid_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.pid");
    // Above the default pid_max, so no such process.
    std::fs::write(&path, "2147483000\n").unwrap();

    let lock = LeaderLock::acquire(&path).unwrap();
    assert_eq!(lock.path(), path.as_path());
    let pid = std::fs::read_to_string(&path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
}

#[test]
fn garbage_pid_file_is_treated_as_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.pid");
    std::fs::write(&path, "not a pid").unwrap();
    assert!(LeaderLock::acquire(&path).is_ok());
}
