//! スナップショットコントローラのシナリオテスト（模擬ターゲット使用）

mod common;

use common::{FakeController, SimClock, SimTarget, FAKE_TID};
use lapse_core::{
    ControlError, ControllerConfig, DiscoveryError, ExporterConfig, MemoryChannel, MemoryFault,
    Phase, SnapshotController, Verdict,
};
use std::time::Duration;

fn started_target() -> std::rc::Rc<std::cell::RefCell<SimTarget>> {
    let target = SimTarget::new(ExporterConfig::default());
    target.borrow_mut().advance(Duration::from_millis(5000));
    target
}

fn channel_for(target: &std::rc::Rc<std::cell::RefCell<SimTarget>>) -> MemoryChannel {
    MemoryChannel::advertised(&target.borrow().exporter.identity())
}

#[test]
fn test_detects_suspension() {
    let target = started_target();
    let channel = channel_for(&target);
    let process = FakeController::new(target.clone());
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let report = controller.run().expect("run should complete");

    assert_eq!(controller.phase(), Phase::Done);
    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.before.suspicion_counter, 0);
    assert_eq!(report.after.suspicion_counter, 1);
    assert_eq!(report.suspicion_delta(), 1);
    assert!(report.iteration_delta() >= 1);
    assert!(report.full_coverage());
    assert_eq!(report.suspend.applied, vec![FAKE_TID]);
    assert!(!target.borrow().suspended);
}

#[test]
fn test_gap_reported_only_once_after_long_dwell() {
    let target = started_target();
    let channel = channel_for(&target);
    let process = FakeController::new(target.clone());
    let clock = SimClock(target.clone());
    let config = ControllerConfig {
        dwell: Duration::from_millis(50_000),
        ..ControllerConfig::default()
    };

    let mut controller = SnapshotController::with_clock(process, channel, config, clock);
    let report = controller.run().expect("run should complete");

    assert_eq!(report.suspicion_delta(), 1);
    assert_eq!(report.after.status(), "Running loop 14");
}

#[test]
fn test_partial_suspend_still_produces_verdict() {
    let target = started_target();
    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.suspend_fails = true;
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let report = controller.run().expect("run should complete despite thread failures");

    assert_eq!(report.verdict, Verdict::Failure);
    assert_eq!(report.suspicion_delta(), 0);
    assert!(!report.full_coverage());
    assert_eq!(report.suspend.failures.len(), 1);
    assert_eq!(report.suspend.failures[0].tid, FAKE_TID);
    // ターゲットは止まらずに動き続けていた
    assert!(report.iteration_delta() >= 10);
}

#[test]
fn test_malformed_discovery_aborts_before_attach() {
    let target = started_target();
    let channel = MemoryChannel::with_payload("1234", "7ffzz0");
    let process = FakeController::new(target.clone());
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let err = controller.run().unwrap_err();

    assert!(matches!(err, ControlError::Discovery(DiscoveryError::Malformed(_))));
    assert_eq!(controller.phase(), Phase::Discovering);
    assert_eq!(controller.process().attach_calls, 0);
}

#[test]
fn test_attach_failure_aborts() {
    let target = started_target();
    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.attach_fails = true;
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let err = controller.run().unwrap_err();

    assert!(matches!(err, ControlError::Attach(_)));
    assert_eq!(controller.phase(), Phase::Attached);
    assert_eq!(controller.process().record_reads, 0);
}

#[test]
fn test_first_read_failure_aborts_before_suspend() {
    let target = started_target();
    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.fail_record_reads_from = Some(0);
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let err = controller.run().unwrap_err();

    assert!(matches!(
        err,
        ControlError::MemoryAccess { phase: Phase::SnapshotBefore, source: MemoryFault::Read(_) }
    ));
    assert!(!target.borrow().suspended);
}

#[test]
fn test_second_read_failure_aborts() {
    let target = started_target();
    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.fail_record_reads_from = Some(1);
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let err = controller.run().unwrap_err();

    assert!(matches!(
        err,
        ControlError::MemoryAccess { phase: Phase::SnapshotAfter, source: MemoryFault::Read(_) }
    ));
    assert_eq!(controller.phase(), Phase::SnapshotAfter);
    // 中断前にターゲットは再開済み
    assert!(!target.borrow().suspended);
}

#[test]
fn test_torn_reads_are_retried() {
    let target = started_target();
    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.torn_reads = 3;
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let report = controller.run().expect("retries should recover");

    assert_eq!(report.verdict, Verdict::Success);
    assert_eq!(report.before.sequence % 2, 0);
    assert_eq!(controller.process().record_reads, 5);
}

#[test]
fn test_persistently_torn_record_is_rejected() {
    let target = started_target();
    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.torn_reads = usize::MAX;
    let clock = SimClock(target.clone());
    let config = ControllerConfig {
        read_attempts: 4,
        ..ControllerConfig::default()
    };

    let mut controller = SnapshotController::with_clock(process, channel, config, clock);
    let err = controller.run().unwrap_err();

    assert!(matches!(
        err,
        ControlError::MemoryAccess {
            phase: Phase::SnapshotBefore,
            source: MemoryFault::Torn { attempts: 4 }
        }
    ));
    assert_eq!(controller.process().record_reads, 4);
}

#[test]
fn test_header_from_an_earlier_write_is_rejected() {
    let target = SimTarget::new(ExporterConfig::default());
    target.borrow_mut().advance(Duration::from_millis(4_000));
    assert_eq!(target.borrow().exporter.record().status(), "Running loop 9");

    let channel = channel_for(&target);
    let mut process = FakeController::new(target.clone());
    process.stale_header_reads = 1;
    let clock = SimClock(target.clone());

    let mut controller =
        SnapshotController::with_clock(process, channel, ControllerConfig::default(), clock);
    let report = controller.run().expect("retry should recover");

    // 古いステータス長のまま採用すると "Running loop 1" になる
    assert_eq!(report.before.iteration_count, 10);
    assert_eq!(report.before.status(), "Running loop 10");
    assert_eq!(controller.process().record_reads, 3);
    assert_eq!(report.verdict, Verdict::Success);
}
