//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Admits only one compile job under concurrent requests
//! - Returns to idle when a job ends abnormally

use camino::Utf8PathBuf;
use pawn_compiler::models::{FileListEntry, JobStatus, SortKey};
use pawn_compiler::services::CompileError;
use pawn_compiler::{CompileGuard, StateChange, StateManager};
use std::fs;
use std::sync::{Arc, Barrier};
use tempfile::TempDir;
use tokio::time::{Duration, timeout};

fn scripts_dir(names: &[&str]) -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    for name in names {
        fs::write(dir.join(name), "// script").unwrap();
    }
    (temp_dir, dir)
}

#[tokio::test]
async fn test_directory_change_then_refresh_events() {
    let (_temp_dir, dir) = scripts_dir(&["admin.sp", "votes.sp", "readme.md"]);
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.set_working_directory(dir.clone());
    let count = state.refresh_files().unwrap();
    assert_eq!(count, 2);

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert_eq!(
        event,
        StateChange::DirectoryChanged {
            directory: Some(dir)
        }
    );

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert!(
        matches!(
            event,
            StateChange::FileListChanged {
                visible: 2,
                total: 2,
                sort_key: SortKey::Date
            }
        ),
        "Expected FileListChanged event, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();

    let guard = state.try_begin_compile("admin.sp").unwrap();

    for rx in [&mut rx1, &mut rx2] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout")
            .expect("Channel closed");
        assert_eq!(
            event,
            StateChange::CompileStarted {
                source: "admin.sp".to_string()
            }
        );
    }

    guard.finish(JobStatus::Succeeded);

    let event = timeout(Duration::from_millis(100), rx1.recv())
        .await
        .expect("Timeout")
        .expect("Channel closed");
    assert!(matches!(
        event,
        StateChange::CompileFinished {
            status: JobStatus::Succeeded,
            ..
        }
    ));
}

#[tokio::test]
async fn test_search_with_no_matches_shows_sentinel() {
    let (_temp_dir, dir) = scripts_dir(&["admin.sp"]);
    let state = StateManager::new();
    state.set_working_directory(dir);
    state.refresh_files().unwrap();

    state.set_search_term("nothing-matches");

    let visible = state.read(|s| s.visible.clone());
    assert_eq!(visible, vec![FileListEntry::NoResults]);
    // The sentinel row resolves the same as no selection
    assert!(state.selected_file(0, "No results found").is_none());

    state.set_search_term("");
    assert_eq!(state.selected_file(0, "admin.sp").unwrap().name, "admin.sp");
}

#[tokio::test]
async fn test_stale_selection_after_search_is_rejected() {
    let (_temp_dir, dir) = scripts_dir(&["admin.sp", "votes.sp"]);
    let state = StateManager::new();
    state.set_working_directory(dir);
    state.refresh_files().unwrap();
    state.set_sort_key(SortKey::Name);

    // Row 1 is votes.sp when clicked, then the list is narrowed
    state.set_search_term("votes");

    assert!(state.selected_file(1, "votes.sp").is_none());
    assert!(state.selected_file(0, "admin.sp").is_none());
    assert_eq!(state.selected_file(0, "votes.sp").unwrap().name, "votes.sp");
}

#[tokio::test]
async fn test_refresh_missing_directory_is_an_error() {
    let (temp_dir, dir) = scripts_dir(&[]);
    let state = StateManager::new();
    state.set_working_directory(dir.join("gone"));

    assert!(state.refresh_files().is_err());
    drop(temp_dir);
}

#[test]
fn test_concurrent_compile_requests_admit_one() {
    let state = Arc::new(StateManager::new());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let state = Arc::clone(&state);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                state.try_begin_compile(&format!("job{}.sp", i))
            })
        })
        .collect();

    let results: Vec<Result<CompileGuard, CompileError>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(CompileError::Busy(_))))
        .count();

    assert_eq!(admitted, 1);
    assert_eq!(busy, 7);

    for result in results {
        if let Ok(guard) = result {
            guard.finish(JobStatus::Succeeded);
        }
    }
    assert!(!state.is_compiling());
}

#[tokio::test]
async fn test_panicking_job_returns_to_idle() {
    let state = Arc::new(StateManager::new());
    let guard = state.try_begin_compile("admin.sp").unwrap();

    let handle = tokio::spawn(async move {
        let _guard = guard;
        panic!("compile task failed");
    });

    assert!(handle.await.is_err());
    assert!(!state.is_compiling());
    assert!(matches!(
        state.read(|s| s.last_status.clone()),
        Some(JobStatus::Errored { .. })
    ));
}

#[test]
fn test_concurrent_reads_during_updates() {
    let state = Arc::new(StateManager::new());
    let mut handles = Vec::new();

    for i in 0..4 {
        let state = Arc::clone(&state);
        handles.push(std::thread::spawn(move || {
            for j in 0..50 {
                state.set_search_term(format!("term-{}-{}", i, j));
                let _ = state.read(|s| s.visible.len());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(state.read(|s| s.search_term.starts_with("term-")));
}
