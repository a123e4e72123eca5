// SPDX-License-Identifier: GPL-3.0-only

mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use common::*;
use storage_contracts::{CryptoState, KillAction, StorageErrorKind};
use storage_service::{UnmountOrchestrator, UnmountPolicy, VolumeSpec};
use storage_types::{PartitionIndex, VolumeEvent, VolumeFlag, VolumeState};

fn sdcard() -> VolumeSpec {
    VolumeSpec::new("sdcard", MOUNT_POINT).with_partition(PartitionIndex::Index(1))
}

fn secure_sdcard() -> VolumeSpec {
    sdcard().with_flags(VolumeFlag::ProvidesSecureContainer)
}

#[tokio::test]
async fn mount_then_unmount_returns_to_idle() {
    let harness = Harness::new();
    harness
        .tool
        .answer(r#"/dev/block/vold/179:1: LABEL="CARD" UUID="ABCD-1234""#);
    let mut volume = harness.idle_volume(sdcard());
    volume.mount().await.unwrap();
    let mut rx = volume.subscribe();

    volume.unmount(false, false).await.unwrap();

    assert_eq!(volume.state(), VolumeState::Idle);
    assert_eq!(volume.uuid(), None);
    assert_eq!(volume.user_label(), None);
    assert_eq!(volume.mounted_device(), None);
    assert!(!harness.mounts.is_live(MOUNT_POINT));
    assert_eq!(*harness.services.stopped.lock().unwrap(), vec!["fuse_sdcard"]);
    assert!(harness.killer.calls.lock().unwrap().is_empty());

    let events = drain(&mut rx);
    assert_eq!(transitions(&events), vec![(4, 5), (5, 1)]);
    assert!(events
        .iter()
        .any(|e| matches!(e, VolumeEvent::UuidChanged { uuid: None, .. })));
}

#[tokio::test]
async fn unmount_requires_a_mounted_volume() {
    let harness = Harness::new();
    let mut volume = harness.idle_volume(sdcard());

    let err = volume.unmount(true, false).await.unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::StateConflict);
    assert_eq!(volume.state(), VolumeState::Idle);
}

#[tokio::test]
async fn unmounting_an_absent_path_never_calls_the_killer() {
    let harness = Harness::new();
    let orchestrator = UnmountOrchestrator::new(
        harness.mounts.clone(),
        harness.killer.clone(),
        harness.settings.unmount,
    );

    orchestrator
        .unmount(Path::new("/mnt/not-mounted"), true)
        .await
        .unwrap();

    assert!(harness.killer.calls.lock().unwrap().is_empty());
    assert_eq!(harness.mounts.unmount_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn busy_mount_escalates_then_times_out() {
    let harness = Harness::new();
    let mut volume = harness.idle_volume(sdcard());
    volume.mount().await.unwrap();
    harness.mounts.set_busy(MOUNT_POINT);

    let err = volume.unmount(true, false).await.unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::UnmountTimeout);
    assert_eq!(err.kind.errno(), libc::EBUSY);
    assert_eq!(volume.state(), VolumeState::Mounted);

    let actions = harness.killer.actions();
    assert_eq!(actions.len(), 150);
    assert!(actions[..19].iter().all(|a| *a == KillAction::Report));
    assert!(actions[19..29].iter().all(|a| *a == KillAction::Hangup));
    assert!(actions[29..].iter().all(|a| *a == KillAction::Kill));
    assert!(actions.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn busy_mount_without_force_only_reports() {
    let mut harness = Harness::new();
    harness.settings.unmount = UnmountPolicy {
        attempts: 5,
        ..harness.settings.unmount
    };
    let mut volume = harness.idle_volume(sdcard());
    volume.mount().await.unwrap();
    harness.mounts.set_busy(MOUNT_POINT);

    let err = volume.unmount(false, false).await.unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::UnmountTimeout);
    assert_eq!(harness.killer.actions(), vec![KillAction::Report; 5]);
}

#[tokio::test]
async fn busy_secure_container_aborts_before_the_real_unmount() {
    let mut harness = Harness::new();
    harness.settings.unmount.attempts = 3;
    let mut volume = harness.idle_volume(secure_sdcard());
    volume.mount().await.unwrap();
    harness.mounts.set_busy(SECURE_TARGET);

    let err = volume.unmount(true, false).await.unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::UnmountTimeout);
    assert_eq!(volume.state(), VolumeState::Mounted);
    assert!(harness.mounts.is_live(MOUNT_POINT));
    assert!(!harness
        .mounts
        .unmount_calls
        .lock()
        .unwrap()
        .contains(&PathBuf::from(MOUNT_POINT)));
}

#[tokio::test]
async fn failed_real_unmount_restores_secure_container() {
    let mut harness = Harness::new();
    harness.settings.unmount.attempts = 3;
    let mut volume = harness.idle_volume(secure_sdcard());
    volume.mount().await.unwrap();
    harness.mounts.set_busy(MOUNT_POINT);

    let err = volume.unmount(true, false).await.unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::UnmountTimeout);
    assert_eq!(volume.state(), VolumeState::Mounted);
    assert_eq!(harness.mounts.binds.lock().unwrap().len(), 2);
    assert!(harness.mounts.is_live(SECURE_TARGET));
}

#[tokio::test]
async fn unrestorable_secure_container_ends_in_no_media() {
    let mut harness = Harness::new();
    harness.settings.unmount.attempts = 3;
    let mut volume = harness.idle_volume(secure_sdcard());
    volume.mount().await.unwrap();
    harness.mounts.set_busy(MOUNT_POINT);
    harness.mounts.fail_bind.store(true, Ordering::SeqCst);
    let mut rx = volume.subscribe();

    let err = volume.unmount(true, false).await.unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::UnmountTimeout);
    assert_eq!(volume.state(), VolumeState::NoMedia);
    assert_eq!(transitions(&drain(&mut rx)), vec![(4, 5), (5, 0)]);
}

#[tokio::test]
async fn revert_tears_down_the_decrypted_mapping() {
    let harness = Harness::new();
    harness.properties.status.lock().unwrap().state = CryptoState::Encrypted;
    let spec = sdcard().with_flags(
        VolumeFlag::ProvidesSecureContainer | VolumeFlag::NonRemovable | VolumeFlag::Encryptable,
    );
    let mut volume = harness.idle_volume(spec);
    volume.mount().await.unwrap();

    volume.unmount(false, true).await.unwrap();

    assert_eq!(*harness.mapper.reverts.lock().unwrap(), vec!["sdcard"]);
    assert_eq!(volume.state(), VolumeState::Idle);

    // The original device is used again, so the next mount decrypts anew.
    volume.mount().await.unwrap();
    assert_eq!(harness.mapper.setups.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn revert_is_ignored_for_whole_device_volumes() {
    let harness = Harness::new();
    harness.properties.status.lock().unwrap().state = CryptoState::Encrypted;
    let spec = VolumeSpec::new("sdcard", MOUNT_POINT).with_flags(
        VolumeFlag::ProvidesSecureContainer | VolumeFlag::NonRemovable | VolumeFlag::Encryptable,
    );
    let mut volume = harness.idle_volume(spec);
    volume.mount().await.unwrap();

    volume.unmount(false, true).await.unwrap();

    assert!(harness.mapper.reverts.lock().unwrap().is_empty());
    assert_eq!(volume.state(), VolumeState::Idle);
}

#[tokio::test]
async fn bridge_mount_path_is_released_and_reported() {
    let harness = Harness::new();
    let spec = sdcard().with_bridge_mount_point("/storage/sdcard");
    harness.mounts.mount("/storage/sdcard");
    let mut volume = harness.idle_volume(spec);
    let mut rx = volume.subscribe();

    volume.mount().await.unwrap();
    volume.unmount(false, false).await.unwrap();

    assert!(!harness.mounts.is_live("/storage/sdcard"));
    assert!(drain(&mut rx).iter().all(|e| match e {
        VolumeEvent::StateChanged { mount_path, .. } => mount_path == Path::new("/storage/sdcard"),
        _ => true,
    }));
}
