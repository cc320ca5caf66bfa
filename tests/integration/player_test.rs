//! Integration tests for Player playback, control and shutdown

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tsplay::player::WorkerExit;
use tsplay::{
    EventSource, IterSource, PlaybackState, Player, PlayerConfig, PlayerError, SourceError,
    SourceStatus, TimestampedEvent, VecSource,
};

use crate::helpers::{millis_between, timeline, wait_for, Deliveries};

const LONG: Duration = Duration::from_secs(5);

/// Seekable source that takes `pull_delay` to produce each event.
struct SlowSource {
    pending: VecDeque<i64>,
    pull_delay: Duration,
}

impl SlowSource {
    fn new(timestamps: &[i64], pull_delay: Duration) -> Self {
        Self {
            pending: timestamps.iter().copied().collect(),
            pull_delay,
        }
    }
}

impl EventSource<i64> for SlowSource {
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<i64>>, SourceError> {
        thread::sleep(self.pull_delay);
        Ok(self.pending.pop_front().map(|ts| TimestampedEvent::new(ts, ts)))
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, target: i64) -> Result<(), SourceError> {
        self.pending.retain(|&ts| ts >= target);
        Ok(())
    }
}

/// Source that notes in `log` when it is dropped.
struct TrackedSource {
    inner: VecSource<i64>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl EventSource<i64> for TrackedSource {
    fn next_event(&mut self) -> Result<Option<TimestampedEvent<i64>>, SourceError> {
        self.inner.next_event()
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.log.lock().push("source released");
    }
}

fn micros_between(earlier: Instant, later: Instant) -> i64 {
    if later >= earlier {
        later.duration_since(earlier).as_micros() as i64
    } else {
        -(earlier.duration_since(later).as_micros() as i64)
    }
}

// ============================================================================
// Delivery order and timing
// ============================================================================

#[test]
fn delivers_every_event_once_in_order() {
    let timestamps: Vec<i64> = (0..60).map(|i| i * 1_000).collect();
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&timestamps), deliveries.handler(), 8).unwrap();

    player.set_speed(10.0);
    player.play().unwrap();

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), timestamps);
    assert_eq!(player.stats().delivered, 60);
    assert_eq!(player.stats().source, SourceStatus::Exhausted);
}

#[test]
fn equal_timestamps_are_all_delivered() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[5, 5, 5, 9]), deliveries.handler(), 2).unwrap();

    player.play().unwrap();

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![5, 5, 5, 9]);
}

#[test]
fn double_speed_halves_the_gap() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 2_000_000]), deliveries.handler(), 16).unwrap();

    player.set_speed(2.0);
    player.play().unwrap();

    assert!(player.wait_until_drained(LONG));
    let gap = millis_between(deliveries.arrival(0), deliveries.arrival(1));
    assert!((900..=1_150).contains(&gap), "gap was {}ms", gap);
}

#[test]
fn first_event_plays_immediately_regardless_of_its_timestamp() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[3_600_000_000]), deliveries.handler(), 4).unwrap();

    let started = Instant::now();
    player.play().unwrap();

    assert!(deliveries.wait_for(1, Duration::from_millis(500)));
    assert!(millis_between(started, deliveries.arrival(0)) < 300);
}

#[test]
fn timestamps_spanning_the_i64_range_do_not_kill_the_scheduler() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[i64::MIN, 0]), deliveries.handler(), 4).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));
    thread::sleep(Duration::from_millis(50));

    // The second event is centuries away; the player must stay responsive.
    let stats = player.stats();
    assert_eq!(stats.state, PlaybackState::Playing);
    assert_eq!(stats.delivered, 1);
    assert!(stats.position_us.unwrap() < 0);

    player.seek(0).unwrap();
    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![i64::MIN, 0]);

    let report = player.close();
    assert_eq!(report.scheduler, WorkerExit::Joined);
}

#[test]
fn a_slow_delivery_is_absorbed_one_step_per_cycle() {
    const STEP: i64 = 50_000;
    const TOLERANCE: i64 = 20_000;

    let timestamps: Vec<i64> = (0..12).map(|i| i * 100_000).collect();
    let samples: Arc<Mutex<Vec<(Instant, i64)>>> = Arc::default();
    let slot: Arc<OnceLock<Weak<Player<i64>>>> = Arc::default();
    let handler = {
        let samples = Arc::clone(&samples);
        let slot = Arc::clone(&slot);
        move |payload: i64| -> anyhow::Result<()> {
            let arrived = Instant::now();
            let drift = slot
                .get()
                .and_then(Weak::upgrade)
                .map(|player| player.stats().drift_us)
                .unwrap_or_default();
            samples.lock().push((arrived, drift));
            if payload == 0 {
                thread::sleep(Duration::from_millis(500));
            }
            Ok(())
        }
    };
    let config = PlayerConfig {
        compensation_step_us: STEP,
        ..PlayerConfig::default()
    };
    let player = Arc::new(Player::with_config(timeline(&timestamps), handler, &config).unwrap());
    slot.set(Arc::downgrade(&player)).unwrap();

    player.play().unwrap();
    assert!(player.wait_until_drained(LONG));
    player.close();

    let samples = samples.lock().clone();
    assert_eq!(samples.len(), timestamps.len());

    // Drift after each delivery is the previous drift plus this cycle's
    // correction plus the measured lateness of the delivery.
    let (first_arrival, first_drift) = samples[0];
    let anchor = first_arrival - Duration::from_micros(first_drift.max(0) as u64);
    let corrections: Vec<i64> = samples
        .windows(2)
        .zip(&timestamps[1..])
        .map(|(pair, &ts)| {
            let (arrived, drift) = pair[1];
            let lag = micros_between(anchor + Duration::from_micros(ts as u64), arrived);
            drift - pair[0].1 - lag
        })
        .collect();

    for (cycle, correction) in corrections.iter().enumerate() {
        assert!(
            correction.abs() <= STEP + TOLERANCE,
            "cycle {} corrected {}us at once: {:?}",
            cycle + 1,
            correction,
            corrections
        );
    }
    // The hiccup was seen and absorbed by a full step, not ignored.
    assert!(corrections[0] <= -(STEP - TOLERANCE), "{:?}", corrections);
}

#[test]
fn speed_change_mid_playback_rescales_remaining_wait() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 1_000_000]), deliveries.handler(), 4).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));
    thread::sleep(Duration::from_millis(200));
    player.set_speed(4.0);

    assert!(player.wait_until_drained(LONG));
    // 200ms at 1x, then the remaining 800ms of timeline at 4x
    let gap = millis_between(deliveries.arrival(0), deliveries.arrival(1));
    assert!((330..=600).contains(&gap), "gap was {}ms", gap);
}

#[test]
fn speed_is_clamped() {
    let player = Player::new(timeline(&[]), Deliveries::new().handler(), 4).unwrap();

    player.set_speed(0.0);
    assert_eq!(player.speed(), 0.1);
    player.set_speed(50.0);
    assert_eq!(player.speed(), 10.0);
    player.set_speed(f64::NAN);
    assert_eq!(player.speed(), 1.0);
}

#[test]
fn initial_speed_comes_from_config() {
    let config = PlayerConfig {
        initial_speed: 3.0,
        ..PlayerConfig::default()
    };
    let player = Player::with_config(timeline(&[]), Deliveries::new().handler(), &config).unwrap();
    assert_eq!(player.speed(), 3.0);
    assert_eq!(player.state(), PlaybackState::Stopped);
}

// ============================================================================
// Pause / resume
// ============================================================================

#[test]
fn pause_is_idempotent_and_holds_delivery() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 300_000, 600_000]), deliveries.handler(), 4).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));

    player.pause();
    player.pause();
    assert_eq!(player.state(), PlaybackState::Paused);
    assert!(!player.wait_until_drained(Duration::from_millis(10)));

    thread::sleep(Duration::from_millis(500));
    assert_eq!(deliveries.count(), 1);

    player.play().unwrap();
    player.play().unwrap();
    assert_eq!(player.state(), PlaybackState::Playing);

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![0, 300_000, 600_000]);
}

#[test]
fn resume_continues_from_paused_position() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 400_000]), deliveries.handler(), 4).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));
    thread::sleep(Duration::from_millis(100));
    player.pause();

    let position = player.stats().position_us.unwrap();
    assert!((80_000..=250_000).contains(&position), "position {}", position);

    thread::sleep(Duration::from_millis(300));
    let resumed = Instant::now();
    player.play().unwrap();

    assert!(player.wait_until_drained(LONG));
    // About 300ms of timeline was left when paused
    let wait = millis_between(resumed, deliveries.arrival(1));
    assert!((150..=450).contains(&wait), "waited {}ms", wait);
}

#[test]
fn pause_before_play_is_a_noop() {
    let player = Player::new(timeline(&[0]), Deliveries::new().handler(), 4).unwrap();
    player.pause();
    assert_eq!(player.state(), PlaybackState::Stopped);
}

// ============================================================================
// Seek
// ============================================================================

#[test]
fn seek_discards_buffered_events_before_target() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 500_000, 800_000]), deliveries.handler(), 16).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));

    let seeked = Instant::now();
    player.seek(600_000).unwrap();
    assert_eq!(player.state(), PlaybackState::Playing);

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![0, 800_000]);
    let wait = millis_between(seeked, deliveries.arrival(1));
    assert!((150..=400).contains(&wait), "waited {}ms", wait);
}

#[test]
fn seek_backwards_replays_events() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 50_000, 100_000]), deliveries.handler(), 4).unwrap();

    player.play().unwrap();
    assert!(player.wait_until_drained(LONG));

    player.seek(50_000).unwrap();
    assert!(player.wait_until_drained(LONG));
    assert_eq!(
        deliveries.timestamps(),
        vec![0, 50_000, 100_000, 50_000, 100_000]
    );
}

#[test]
fn seek_from_stopped_starts_playback_at_target() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 100_000, 200_000]), deliveries.handler(), 4).unwrap();

    player.seek(100_000).unwrap();

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![100_000, 200_000]);
    assert!(player.stats().drift_us.abs() < 1_000_000);
}

#[test]
fn seek_on_unseekable_source_fails_without_side_effects() {
    let events: Vec<Result<TimestampedEvent<i64>, SourceError>> =
        vec![Ok(TimestampedEvent::new(0, 0))];
    let deliveries = Deliveries::new();
    let player = Player::new(IterSource::new(events.into_iter()), deliveries.handler(), 4).unwrap();

    let err = player.seek(0).unwrap_err();
    assert!(matches!(err, PlayerError::SeekUnsupported));
    assert_eq!(player.state(), PlaybackState::Stopped);

    player.play().unwrap();
    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![0]);
}

#[test]
fn seek_that_loses_the_source_leaves_a_finished_empty_player() {
    let deliveries = Deliveries::new();
    let config = PlayerConfig {
        shutdown_timeout_ms: 50,
        ..PlayerConfig::default()
    };
    let source = SlowSource::new(&[0, 1_000_000, 2_000_000], Duration::from_millis(600));
    let player = Player::with_config(source, deliveries.handler(), &config).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));
    assert!(wait_for(LONG, || player.stats().queued == 1));

    // The preloader is inside a 600 ms pull and misses the 50 ms deadline.
    assert!(matches!(player.seek(10_000_000), Err(PlayerError::SourceLost)));
    let stats = player.stats();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.state, PlaybackState::Stopped);
    assert!(matches!(stats.source, SourceStatus::Failed(_)));
    assert!(player.source_error().unwrap().contains("lost"));

    player.play().unwrap();
    assert!(player.wait_until_drained(Duration::from_secs(1)));
    assert_eq!(deliveries.timestamps(), vec![0]);

    // The detached preloader finishing later must not revive the status.
    thread::sleep(Duration::from_millis(800));
    assert!(matches!(player.stats().source, SourceStatus::Failed(_)));
    assert!(matches!(player.seek(0), Err(PlayerError::SourceLost)));
}

// ============================================================================
// Source status and handler faults
// ============================================================================

#[test]
fn read_failure_is_reported_apart_from_exhaustion() {
    let events: Vec<Result<TimestampedEvent<i64>, SourceError>> = vec![
        Ok(TimestampedEvent::new(0, 0)),
        Ok(TimestampedEvent::new(1_000, 1_000)),
        Err(SourceError::read("record 2", "truncated payload")),
    ];
    let deliveries = Deliveries::new();
    let player = Player::new(IterSource::new(events.into_iter()), deliveries.handler(), 4).unwrap();

    player.play().unwrap();

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![0, 1_000]);
    assert!(matches!(player.stats().source, SourceStatus::Failed(_)));
    assert!(player.source_error().unwrap().contains("truncated payload"));
}

#[test]
fn exhausted_source_has_no_error() {
    let player = Player::new(timeline(&[0]), Deliveries::new().handler(), 4).unwrap();
    player.play().unwrap();

    assert!(player.wait_until_drained(LONG));
    assert_eq!(player.stats().source, SourceStatus::Exhausted);
    assert!(player.source_error().is_none());
}

#[test]
fn handler_error_stops_playback_until_acknowledged() {
    let deliveries = Deliveries::new();
    let mut record = deliveries.handler();
    let handler = move |payload: i64| {
        record(payload)?;
        if payload == 10_000 {
            anyhow::bail!("disk full");
        }
        Ok(())
    };
    let player = Player::new(timeline(&[0, 10_000, 20_000]), handler, 4).unwrap();

    player.play().unwrap();
    assert!(!player.wait_until_drained(LONG));
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(deliveries.timestamps(), vec![0, 10_000]);

    for _ in 0..2 {
        match player.play() {
            Err(PlayerError::HandlerFault(message)) => assert!(message.contains("disk full")),
            other => panic!("expected handler fault, got {:?}", other),
        }
    }

    assert!(player.take_fault().unwrap().contains("disk full"));
    assert!(player.take_fault().is_none());

    player.play().unwrap();
    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.timestamps(), vec![0, 10_000, 20_000]);
}

#[test]
fn handler_panic_is_contained() {
    let handler = |payload: i64| -> anyhow::Result<()> {
        if payload > 0 {
            panic!("bad payload {}", payload);
        }
        Ok(())
    };
    let player = Player::new(timeline(&[0, 1_000]), handler, 4).unwrap();

    player.play().unwrap();
    assert!(wait_for(LONG, || player.state() == PlaybackState::Stopped));

    let fault = player.take_fault().unwrap();
    assert!(fault.contains("handler panicked"));
    assert!(fault.contains("bad payload 1000"));
    assert_eq!(player.stats().delivered, 2);
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn close_is_terminal_and_idempotent() {
    let deliveries = Deliveries::new();
    let player = Player::new(timeline(&[0, 200_000]), deliveries.handler(), 4).unwrap();

    player.play().unwrap();
    assert!(deliveries.wait_for(1, LONG));

    let report = player.close();
    assert_eq!(report.preloader, WorkerExit::Joined);
    assert_eq!(report.scheduler, WorkerExit::Joined);
    assert_eq!(player.state(), PlaybackState::Closed);

    let again = player.close();
    assert_eq!(again.preloader, WorkerExit::NotRunning);
    assert_eq!(again.scheduler, WorkerExit::NotRunning);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(deliveries.count(), 1);
    assert!(matches!(player.play(), Err(PlayerError::Closed)));
    assert!(matches!(player.seek(0), Err(PlayerError::Closed)));
    assert!(!player.wait_until_drained(Duration::from_millis(10)));
}

#[test]
fn close_before_play_stops_idle_scheduler() {
    let player = Player::new(timeline(&[0]), Deliveries::new().handler(), 4).unwrap();
    let report = player.close();
    assert_eq!(report.preloader, WorkerExit::NotRunning);
    assert_eq!(report.scheduler, WorkerExit::Joined);
}

#[test]
fn close_stops_the_preloader_before_the_scheduler() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let entered = Arc::new(AtomicBool::new(false));
    let source = TrackedSource {
        inner: timeline(&[0, 100_000, 200_000]),
        log: Arc::clone(&log),
    };
    let handler = {
        let log = Arc::clone(&log);
        let entered = Arc::clone(&entered);
        move |_: i64| -> anyhow::Result<()> {
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(400));
            log.lock().push("handler returned");
            Ok(())
        }
    };
    let player = Player::new(source, handler, 4).unwrap();

    player.play().unwrap();
    assert!(wait_for(LONG, || entered.load(Ordering::SeqCst)));

    let report = player.close();
    assert_eq!(report.preloader, WorkerExit::Joined);
    assert_eq!(report.scheduler, WorkerExit::Joined);
    assert_eq!(*log.lock(), vec!["source released", "handler returned"]);
    assert_eq!(player.stats().delivered, 1);
    assert_eq!(player.stats().queued, 0);
}

#[test]
fn close_detaches_a_stuck_handler() {
    let entered = Arc::new(AtomicBool::new(false));
    let handler = {
        let entered = Arc::clone(&entered);
        move |_: i64| -> anyhow::Result<()> {
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(800));
            Ok(())
        }
    };
    let config = PlayerConfig {
        shutdown_timeout_ms: 100,
        ..PlayerConfig::default()
    };
    let player = Player::with_config(timeline(&[0, 1_000]), handler, &config).unwrap();

    player.play().unwrap();
    assert!(wait_for(LONG, || entered.load(Ordering::SeqCst)));

    let started = Instant::now();
    let report = player.close();
    assert_eq!(report.preloader, WorkerExit::Joined);
    assert_eq!(report.scheduler, WorkerExit::Detached);
    assert!(started.elapsed() < Duration::from_millis(600));
}

#[test]
fn dropping_the_player_releases_the_handler() {
    let token = Arc::new(());
    let handler = {
        let token = Arc::clone(&token);
        move |_: i64| -> anyhow::Result<()> {
            let _token = &token;
            Ok(())
        }
    };
    let player = Player::new(timeline(&[0]), handler, 4).unwrap();
    player.play().unwrap();
    assert!(player.wait_until_drained(LONG));

    drop(player);
    assert_eq!(Arc::strong_count(&token), 1);
}

#[test]
fn player_can_be_shared_across_threads() {
    let deliveries = Deliveries::new();
    let player = Arc::new(Player::new(timeline(&[0, 100_000]), deliveries.handler(), 4).unwrap());

    let controller = {
        let player = Arc::clone(&player);
        thread::spawn(move || player.play())
    };
    controller.join().unwrap().unwrap();

    assert!(player.wait_until_drained(LONG));
    assert_eq!(deliveries.count(), 2);
}
