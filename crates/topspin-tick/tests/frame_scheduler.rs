//! Integration tests for the frame scheduler.
//!
//! Uses Tokio's paused clock: `sleep_until` resolves as soon as the
//! runtime is idle, so frames fire instantly but report exact loop time.

use std::time::Duration;

use topspin_tick::{FrameConfig, FrameScheduler, TimerQueue};

fn config_20hz() -> FrameConfig {
    FrameConfig {
        initial_jitter_us: 0,
        ..FrameConfig::with_rate(20)
    }
}

#[test]
fn test_with_rate_sets_duration() {
    let cfg = FrameConfig::with_rate(20);
    assert_eq!(cfg.frame_duration(), Duration::from_millis(50));
}

#[test]
fn test_validated_clamps_zero_rate() {
    let cfg = FrameConfig::with_rate(0).validated();
    assert_eq!(cfg.frame_rate_hz, 1);
}

#[test]
fn test_validated_clamps_excessive_rate() {
    let cfg = FrameConfig::with_rate(10_000).validated();
    assert_eq!(cfg.frame_rate_hz, FrameConfig::MAX_FRAME_RATE_HZ);
}

#[tokio::test(start_paused = true)]
async fn test_frames_report_monotonic_loop_time() {
    let mut s = FrameScheduler::new(config_20hz());

    let first = s.wait_for_frame().await;
    assert_eq!(first.frame, 1);
    assert_eq!(first.now, Duration::from_millis(50));
    assert_eq!(first.dt, Duration::from_millis(50));
    assert!(!first.overrun);

    let second = s.wait_for_frame().await;
    assert_eq!(second.frame, 2);
    assert_eq!(second.now, Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_late_frame_skips_ahead_without_burst() {
    let mut s = FrameScheduler::new(config_20hz());
    s.wait_for_frame().await;

    // Block the loop for four frames.
    tokio::time::advance(Duration::from_millis(200)).await;

    let late = s.wait_for_frame().await;
    assert!(late.overrun);
    assert!(late.dt >= Duration::from_millis(200));

    // The following frame is one nominal period after the late one.
    let next = s.wait_for_frame().await;
    assert!(!next.overrun);
    assert_eq!(next.now - late.now, Duration::from_millis(50));
    assert_eq!(s.metrics().total_overruns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_prevents_frames() {
    let mut s = FrameScheduler::new(config_20hz());
    s.pause();
    let result =
        tokio::time::timeout(Duration::from_secs(1), s.wait_for_frame()).await;
    assert!(result.is_err(), "paused scheduler should pend");
    assert_eq!(s.frame_count(), 0);

    s.resume();
    let info = s.wait_for_frame().await;
    assert_eq!(info.frame, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timers_fire_on_frame_that_passes_deadline() {
    let mut s = FrameScheduler::new(config_20hz());
    let mut timers = TimerQueue::new();
    timers.schedule(Duration::from_millis(120), "retry");

    let mut fired_at = None;
    for _ in 0..5 {
        let frame = s.wait_for_frame().await;
        if !timers.drain_due(frame.now).is_empty() {
            fired_at = Some(frame.now);
            break;
        }
    }
    assert_eq!(fired_at, Some(Duration::from_millis(150)));
}
