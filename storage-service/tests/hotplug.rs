// SPDX-License-Identifier: GPL-3.0-only

mod common;

use std::sync::Arc;

use common::*;
use storage_contracts::StorageErrorKind;
use storage_service::{BlockEventOutcome, DirectDevice, VolumeManager, VolumeSpec};
use storage_types::{
    BlockAction, BlockDeviceKind, BlockEvent, DeviceNumber, PartitionIndex, VolumeState,
};

fn sdcard() -> VolumeSpec {
    VolumeSpec::new("sdcard", MOUNT_POINT).with_partition(PartitionIndex::Index(1))
}

fn disk_event(action: BlockAction, device: DeviceNumber, partitions: Option<u32>) -> BlockEvent {
    BlockEvent {
        action,
        kind: BlockDeviceKind::Disk,
        device,
        dev_path: "/devices/platform/mmc/block/mmcblk1".to_string(),
        partition_count: partitions,
        partition_number: None,
    }
}

fn partition_event(action: BlockAction, device: DeviceNumber, number: u32) -> BlockEvent {
    BlockEvent {
        action,
        kind: BlockDeviceKind::Partition,
        device,
        dev_path: format!("/devices/platform/mmc/block/mmcblk1/mmcblk1p{number}"),
        partition_count: None,
        partition_number: Some(number),
    }
}

#[tokio::test]
async fn deferred_mount_runs_once_partitions_arrive() {
    let harness = Harness::new();
    let mut volume = harness.volume(sdcard());

    let outcome = volume
        .handle_block_event(&disk_event(BlockAction::Add, DISK, Some(1)))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        BlockEventOutcome::MediaInserted {
            pending_partitions: 1
        }
    );
    assert_eq!(volume.state(), VolumeState::Pending);

    let err = volume.mount().await.unwrap_err();
    assert_eq!(err.kind, StorageErrorKind::StateConflict);
    assert!(volume.retry_mount_requested());

    volume
        .handle_block_event(&partition_event(BlockAction::Add, DISK.offset(1).unwrap(), 1))
        .await
        .unwrap();

    assert_eq!(volume.state(), VolumeState::Mounted);
    assert!(!volume.retry_mount_requested());
    assert_eq!(volume.mounted_device(), Some(DISK.offset(1).unwrap()));
}

#[tokio::test]
async fn media_without_partitions_goes_idle() {
    let harness = Harness::new();
    let mut volume = harness.volume(sdcard());
    volume.media_detected(false);

    volume
        .handle_block_event(&disk_event(BlockAction::Add, DISK, Some(0)))
        .await
        .unwrap();

    assert_eq!(volume.state(), VolumeState::Idle);
    assert!(harness.primary.mount_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn removal_while_mounted_forces_unmount() {
    let harness = Harness::new();
    let mut volume = harness.idle_volume(sdcard());
    volume.mount().await.unwrap();

    volume
        .handle_block_event(&disk_event(BlockAction::Remove, DISK, None))
        .await
        .unwrap();

    assert_eq!(volume.state(), VolumeState::NoMedia);
    assert!(!harness.mounts.is_live(MOUNT_POINT));
    assert_eq!(volume.mounted_device(), None);
}

#[tokio::test]
async fn removal_of_the_mounted_partition_forces_unmount() {
    let harness = Harness::new();
    let mut volume = harness.idle_volume(sdcard());
    volume.mount().await.unwrap();

    volume
        .handle_block_event(&partition_event(BlockAction::Remove, DISK.offset(1).unwrap(), 1))
        .await
        .unwrap();

    assert_eq!(volume.state(), VolumeState::NoMedia);
}

#[tokio::test]
async fn foreign_events_are_ignored() {
    let harness = Harness::new();
    let mut volume = harness.idle_volume(sdcard());

    let outcome = volume
        .handle_block_event(&disk_event(BlockAction::Remove, DeviceNumber::new(8, 0), None))
        .await
        .unwrap();

    assert_eq!(outcome, BlockEventOutcome::Ignored);
    assert_eq!(volume.state(), VolumeState::Idle);
}

fn manager(harness: &Harness) -> VolumeManager {
    let mut manager = VolumeManager::new(harness.events.clone());
    manager.add_volume(harness.idle_volume(sdcard())).unwrap();

    let usb = DeviceNumber::new(8, 0);
    let mut usb_volume = harness.volume_on(
        VolumeSpec::new("usb", "/mnt/usb"),
        DirectDevice::new(usb, PartitionIndex::WholeDevice),
    );
    usb_volume.media_detected(false);
    manager.add_volume(usb_volume).unwrap();
    manager
}

#[tokio::test]
async fn manager_routes_events_to_the_owning_volume() {
    let harness = Harness::new();
    let manager = manager(&harness);

    let handled = manager
        .handle_block_event(&disk_event(BlockAction::Add, DeviceNumber::new(8, 0), None))
        .await;

    assert_eq!(
        handled,
        vec![(
            "usb".to_string(),
            BlockEventOutcome::MediaInserted {
                pending_partitions: 0
            }
        )]
    );
    let states: Vec<_> = manager
        .snapshot()
        .await
        .into_iter()
        .map(|s| (s.label, s.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("sdcard".to_string(), VolumeState::Idle),
            ("usb".to_string(), VolumeState::Idle)
        ]
    );
}

#[tokio::test]
async fn manager_rejects_unknown_and_duplicate_labels() {
    let harness = Harness::new();
    let mut manager = manager(&harness);

    let err = manager.mount("missing").await.unwrap_err();
    assert_eq!(err.kind, StorageErrorKind::InvalidInput);

    let err = manager
        .add_volume(harness.idle_volume(sdcard()))
        .unwrap_err();
    assert_eq!(err.kind, StorageErrorKind::InvalidInput);
}

#[tokio::test]
async fn manager_serializes_commands_per_volume() {
    let harness = Harness::new();
    let manager = Arc::new(manager(&harness));

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.mount("sdcard").await }
    });
    let second = tokio::spawn({
        let manager = manager.clone();
        async move { manager.mount("sdcard").await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.kind == StorageErrorKind::StateConflict));
    assert_eq!(harness.primary.mount_calls.lock().unwrap().len(), 1);

    manager.unmount("sdcard", false, false).await.unwrap();
    manager.set_debug(true).await;
    assert!(manager.volume("sdcard").unwrap().lock().await.is_debug());
}
