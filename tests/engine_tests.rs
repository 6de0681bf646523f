//! Integration tests for ReconciliationEngine
//!
//! These tests verify:
//! - Auto-discovery applies the default marking and records what succeeded
//! - Manual add, edit, remove, remove-all and set-default keep the registry,
//!   its file and the store in step
//! - Invalid input is rejected before anything changes
//! - Concurrent operations on one name never leave a mixed record

mod common;

use common::{FakeDrive, FakeQosStore, TestEnv};
use qosmgr::StateChange;
use qosmgr::models::{Launcher, ValidationError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Two Epic games and one Steam game on a single drive.
fn three_game_drive() -> FakeDrive {
    let drive = FakeDrive::new();
    drive.install_epic_launcher();
    drive.add_epic_game("Fortnite", "FortniteGame/Binaries/Win64/FortniteClient-Win64-Shipping.exe");
    drive.add_epic_game("rocketleague", "Binaries/Win64/RocketLeague.exe");

    let steam_library = drive.root.join("Program Files (x86)").join("Steam");
    drive.install_steam(&[&steam_library]);
    FakeDrive::add_steam_game(&steam_library, "Counter-Strike Global Offensive", "cs2.exe");
    drive
}

#[tokio::test]
async fn test_auto_discovery_scenario() {
    let env = TestEnv::new(three_game_drive(), FakeQosStore::new());

    let report = env.engine.auto_discover_and_add().await;

    assert_eq!(report.found, 3);
    assert!(report.failed.is_empty());
    // Epic before Steam
    assert_eq!(
        report.added,
        vec!["FortniteClient-Win64-Shipping", "RocketLeague", "cs2"]
    );

    let persisted = env.persisted();
    assert_eq!(persisted.default_value().get(), 46);
    assert_eq!(persisted.len(), 3);
    assert!(persisted.entries().all(|(_, value)| value.get() == 46));
    assert!(env.registry_file().starts_with("DEFAULT=46\n"));

    let mut store_names = env.store.names();
    store_names.sort();
    assert_eq!(store_names, vec!["FortniteClient-Win64-Shipping", "RocketLeague", "cs2"]);
    assert_eq!(env.metrics.policies_applied.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn test_discovery_uses_loaded_default() {
    let env = TestEnv::with_registry(three_game_drive(), FakeQosStore::new(), Some("DEFAULT=26\n"));

    env.engine.auto_discover_and_add().await;

    assert_eq!(env.store.policy("cs2").unwrap().dscp, 26);
    assert_eq!(env.persisted().get("cs2").get(), 26);
}

#[tokio::test]
async fn test_discovery_failures_are_not_recorded() {
    let store = FakeQosStore::new();
    store.refuse("RocketLeague");
    let env = TestEnv::new(three_game_drive(), store);

    let report = env.engine.auto_discover_and_add().await;

    assert_eq!(report.failed, vec!["RocketLeague"]);
    assert_eq!(report.added.len(), 2);
    assert!(!env.persisted().contains("RocketLeague"));
    assert!(env.error_log().contains("RocketLeague"));
}

#[tokio::test]
async fn test_discovery_without_launchers_touches_nothing() {
    let env = TestEnv::new(FakeDrive::new(), FakeQosStore::new());

    let report = env.engine.auto_discover_and_add().await;

    assert_eq!(report.found, 0);
    assert!(env.store.scripts().is_empty());
    assert!(!env.registry_path.exists());
    assert_eq!(env.engine.state().snapshot().progress, 100);
}

#[tokio::test]
async fn test_discovery_progress_is_monotonic() {
    let env = TestEnv::new(three_game_drive(), FakeQosStore::new());
    let mut events = env.engine.state().subscribe();

    env.engine.auto_discover_and_add().await;

    let mut progress = Vec::new();
    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        match event {
            StateChange::ProgressUpdated { progress: value } => progress.push(value),
            StateChange::DiscoveryFinished { added, failed } => finished = Some((added, failed)),
            _ => {}
        }
    }

    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", progress);
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.contains(&60));
    assert_eq!(finished, Some((3, 0)));
}

#[tokio::test]
async fn test_scan_does_not_apply() {
    let env = TestEnv::new(three_game_drive(), FakeQosStore::new());

    let scanned = env.engine.scan();

    assert_eq!(scanned.len(), 2);
    assert_eq!(scanned[0].0, Launcher::Epic);
    assert_eq!(scanned[0].1.len(), 2);
    assert_eq!(scanned[1].0, Launcher::Steam);
    assert_eq!(scanned[1].1.len(), 1);
    assert!(env.store.scripts().is_empty());
}

#[tokio::test]
async fn test_marking_boundaries() {
    let env = TestEnv::new(FakeDrive::new(), FakeQosStore::new());

    assert!(matches!(
        env.engine.add_game("Game", "C:\\Game.exe", 64).await,
        Err(ValidationError::OutOfRange(64))
    ));
    assert!(matches!(
        env.engine.add_game("Game", "C:\\Game.exe", -1).await,
        Err(ValidationError::OutOfRange(-1))
    ));
    assert!(env.store.scripts().is_empty());

    assert_eq!(env.engine.add_game("Low", "C:\\Low.exe", 0).await, Ok(true));
    assert_eq!(env.engine.add_game("High", "C:\\High.exe", 63).await, Ok(true));
    assert_eq!(env.persisted().get("Low").get(), 0);
    assert_eq!(env.persisted().get("High").get(), 63);
}

#[tokio::test]
async fn test_add_game_validation() {
    let env = TestEnv::new(FakeDrive::new(), FakeQosStore::new());

    assert_eq!(
        env.engine.add_game("", "C:\\Game.exe", 46).await,
        Err(ValidationError::EmptyName)
    );
    assert!(matches!(
        env.engine.add_game("Game", "C:\\Game.lnk", 46).await,
        Err(ValidationError::NotAnExecutable(_))
    ));
    assert!(matches!(
        env.engine.add_game(" Game ", "C:\\Game.exe", 46).await,
        Err(ValidationError::PaddedName(_))
    ));
    assert!(env.store.scripts().is_empty());
    assert!(!env.registry_path.exists());

    assert_eq!(env.engine.add_game("Game", "C:\\GAME.EXE", 46).await, Ok(true));
}

#[tokio::test]
async fn test_add_game_leaves_no_active_worker() {
    let store = FakeQosStore::new();
    store.refuse("Refused");
    let env = TestEnv::new(FakeDrive::new(), store);

    assert_eq!(env.engine.add_game("Game", "C:\\Game.exe", 46).await, Ok(true));
    assert_eq!(env.engine.add_game("Refused", "C:\\Refused.exe", 46).await, Ok(false));

    assert_eq!(env.engine.state().read(|s| s.active_workers), 0);
}

#[tokio::test]
async fn test_discovery_skips_names_the_registry_cannot_hold() {
    let drive = FakeDrive::new();
    drive.install_epic_launcher();
    drive.add_epic_game("Padded", " Padded.exe");
    drive.add_epic_game("rocketleague", "RocketLeague.exe");
    let env = TestEnv::new(drive, FakeQosStore::new());

    let report = env.engine.auto_discover_and_add().await;

    assert_eq!(report.added, vec!["RocketLeague"]);
    assert_eq!(report.failed, vec![" Padded"]);
    assert_eq!(env.store.names(), vec!["RocketLeague"]);
    assert_eq!(env.persisted().len(), 1);
}

#[tokio::test]
async fn test_edit_updates_registry_and_store() {
    let env = TestEnv::with_registry(FakeDrive::new(), FakeQosStore::new(), Some("DEFAULT=46\ncs2=46\n"));
    env.store.insert("cs2", "D:\\cs2.exe", 46);

    assert_eq!(env.engine.edit("cs2", 10).await, Ok(true));

    assert_eq!(env.store.policy("cs2").unwrap().dscp, 10);
    assert_eq!(env.store.policy("cs2").unwrap().app_path, "D:\\cs2.exe");
    assert_eq!(env.persisted().get("cs2").get(), 10);
}

#[tokio::test]
async fn test_edit_rejects_before_mutating() {
    let env = TestEnv::with_registry(FakeDrive::new(), FakeQosStore::new(), Some("DEFAULT=46\ncs2=40\n"));
    env.store.insert("cs2", "D:\\cs2.exe", 40);

    assert!(env.engine.edit("cs2", 64).await.is_err());

    assert_eq!(env.store.policy("cs2").unwrap().dscp, 40);
    assert_eq!(env.persisted().get("cs2").get(), 40);
    assert!(env.store.scripts().is_empty());
}

#[tokio::test]
async fn test_edit_unknown_policy() {
    let env = TestEnv::new(FakeDrive::new(), FakeQosStore::new());

    assert_eq!(env.engine.edit("Ghost", 10).await, Ok(false));

    assert!(!env.persisted().contains("Ghost"));
    assert!(env.error_log().contains("Cannot edit Ghost"));
}

#[tokio::test]
async fn test_edit_commits_registry_even_when_store_fails() {
    let store = FakeQosStore::new();
    store.insert("cs2", "D:\\cs2.exe", 46);
    store.refuse("cs2");
    let env = TestEnv::with_registry(FakeDrive::new(), store, Some("DEFAULT=46\ncs2=46\n"));

    assert_eq!(env.engine.edit("cs2", 12).await, Ok(false));

    assert_eq!(env.persisted().get("cs2").get(), 12);
    assert!(env.store.policy("cs2").is_none());
}

#[tokio::test]
async fn test_concurrent_edits_leave_last_commit() {
    let store = FakeQosStore::with_latency(Duration::from_millis(5));
    store.insert("cs2", "D:\\cs2.exe", 46);
    let env = TestEnv::with_registry(FakeDrive::new(), store, Some("DEFAULT=46\ncs2=46\n"));

    let mut tasks = Vec::new();
    for marking in [10, 20, 30, 40] {
        let engine = Arc::clone(&env.engine);
        tasks.push(tokio::spawn(async move { engine.edit("cs2", marking).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(true));
    }

    let recorded = env.engine.marking_for("cs2").get();
    assert!([10, 20, 30, 40].contains(&recorded));
    assert_eq!(env.persisted().get("cs2").get(), recorded);
    assert_eq!(env.store.policy("cs2").unwrap().dscp, recorded);
}

#[tokio::test]
async fn test_remove_forgets_entry() {
    let env = TestEnv::with_registry(FakeDrive::new(), FakeQosStore::new(), Some("DEFAULT=46\ncs2=40\nHades=30\n"));
    env.store.insert("cs2", "D:\\cs2.exe", 40);
    env.store.insert("Hades", "D:\\Hades.exe", 30);

    assert!(env.engine.remove("cs2").await);

    assert_eq!(env.store.names(), vec!["Hades"]);
    let persisted = env.persisted();
    assert!(!persisted.contains("cs2"));
    assert!(persisted.contains("Hades"));
}

#[tokio::test]
async fn test_remove_all_resets_registry() {
    let env = TestEnv::with_registry(FakeDrive::new(), FakeQosStore::new(), Some("DEFAULT=20\ncs2=40\nHades=30\n"));
    env.store.insert("cs2", "D:\\cs2.exe", 40);
    env.store.insert("Hades", "D:\\Hades.exe", 30);
    env.store.insert("Unrecorded", "D:\\Other.exe", 8);

    assert_eq!(env.engine.remove_all().await, 3);

    assert!(env.store.names().is_empty());
    assert_eq!(env.registry_file(), "DEFAULT=20\n");
    assert!(env.engine.games().await.is_empty());
}

#[tokio::test]
async fn test_set_default() {
    let env = TestEnv::with_registry(FakeDrive::new(), FakeQosStore::new(), Some("DEFAULT=46\ncs2=40\n"));

    env.engine.set_default(8).unwrap();
    assert!(env.engine.set_default(64).is_err());

    let persisted = env.persisted();
    assert_eq!(persisted.default_value().get(), 8);
    assert_eq!(persisted.get("cs2").get(), 40);
    assert_eq!(env.engine.state().snapshot().default_marking, 8);
}

#[tokio::test]
async fn test_games_joins_registry_values() {
    let env = TestEnv::with_registry(FakeDrive::new(), FakeQosStore::new(), Some("DEFAULT=46\ncs2=40\n"));
    env.store.insert("cs2", "D:\\cs2.exe", 40);
    env.store.insert("Manual", "D:\\Manual.exe", 12);

    let games = env.engine.games().await;

    assert_eq!(games.len(), 2);
    assert_eq!(games[0].name, "cs2");
    assert_eq!(games[0].marking.get(), 40);
    assert_eq!(games[1].name, "Manual");
    assert_eq!(games[1].marking.get(), 46);
}
