//! Control-loop scenarios for the resource manager.
//!
//! Each test arms a loop against a [`RecordingPool`] and drives it one tick
//! at a time, so decisions are checked without depending on wall-clock
//! scheduling.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test manager_control -- --nocapture
//! ```

mod common;

use common::*;
use parking_lot::Mutex;
use rightsize::{EventHook, ManagerState, PoolEvent, ResourceManager};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn idle_shortfall_allocates_the_difference() {
    init_test_logging();
    test_phase("idle_shortfall_allocates_the_difference");
    let manager = ResourceManager::new(fast_manager_config(2, 3, 10)).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 2, 1));
    let mut control = manager.control_loop(pool.clone()).expect("arm");

    control.tick(Instant::now());
    assert_eq!(pool.calls(), vec![Call::Prune, Call::Allocate(2)]);
    assert_eq!(manager.snapshot().allocated, 4);
    assert_eq!(manager.snapshot().idle, 3);

    // Idle now meets the threshold; nothing more to do.
    control.tick(Instant::now());
    assert_eq!(pool.commands(), vec![Call::Allocate(2)]);
    test_complete("idle_shortfall_allocates_the_difference");
}

#[test]
fn allocation_is_capped_at_max() {
    init_test_logging();
    test_phase("allocation_is_capped_at_max");
    let manager = ResourceManager::new(fast_manager_config(1, 5, 6)).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 4, 0));
    let mut control = manager.control_loop(pool.clone()).expect("arm");

    control.tick(Instant::now());
    assert_eq!(pool.commands(), vec![Call::Allocate(2)]);

    // At max with idle still short: no allocation.
    pool.set(6, 0);
    control.tick(Instant::now());
    assert_eq!(pool.commands(), vec![Call::Allocate(2)]);
    test_complete("allocation_is_capped_at_max");
}

#[test]
fn sustained_surplus_is_released() {
    init_test_logging();
    test_phase("sustained_surplus_is_released");
    let manager = ResourceManager::new(fast_manager_config(2, 3, 10)).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 8, 5));
    let mut control = manager.control_loop(pool.clone()).expect("arm");

    control.tick(Instant::now());
    assert_eq!(pool.commands(), vec![Call::Release(2)]);
    let snap = manager.snapshot();
    assert_eq!((snap.allocated, snap.idle), (6, 3));
    test_complete("sustained_surplus_is_released");
}

#[test]
fn brief_dip_in_window_blocks_shrink() {
    init_test_logging();
    test_phase("brief_dip_in_window_blocks_shrink");
    let manager = ResourceManager::new(fast_manager_config(1, 2, 10)).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 8, 6));
    let mut control = manager
        .control_loop(pool.clone())
        .expect("arm");

    // Idle dips to the threshold between samples, then recovers.
    pool.set(8, 2);
    pool.set(8, 6);
    control.tick(Instant::now());
    assert_eq!(pool.commands(), Vec::<Call>::new());
    assert_eq!(control.levels().lowest_fresh(), Some(2));
    test_complete("brief_dip_in_window_blocks_shrink");
}

#[test]
fn stale_levels_age_out() {
    init_test_logging();
    test_phase("stale_levels_age_out");
    let config = fast_manager_config(1, 1, 10).with_idle_retention(Duration::from_millis(50));
    let manager = ResourceManager::new(config).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 4, 1));
    let mut control = manager.control_loop(pool.clone()).expect("arm");
    let t0 = Instant::now();

    control.tick(t0);
    assert_eq!(control.levels().fresh_levels(), vec![1]);

    // The window restarts at the idle count seen when it was sampled.
    pool.set(4, 3);
    control.tick(t0 + Duration::from_millis(20));
    assert_eq!(control.levels().fresh_levels(), vec![1]);
    assert_eq!(pool.commands(), Vec::<Call>::new());

    control.tick(t0 + Duration::from_millis(100));
    // Level 1 expired before the new sample; level 3 alone drives the shrink.
    assert_eq!(control.levels().fresh_levels(), vec![3]);
    assert_eq!(pool.commands(), vec![Call::Release(2)]);
    test_complete("stale_levels_age_out");
}

#[test]
fn stop_drains_to_stopped() {
    init_test_logging();
    test_phase("stop_drains_to_stopped");
    let events = Arc::new(Mutex::new(Vec::new()));
    let hook: EventHook = {
        let events = Arc::clone(&events);
        Arc::new(move |event: &PoolEvent| events.lock().push(event.clone()))
    };
    let manager =
        ResourceManager::with_event_hook(fast_manager_config(1, 1, 4), hook).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 3, 1));
    let mut control = manager.control_loop(pool.clone()).expect("arm");

    manager.stop();
    assert_eq!(control.tick(Instant::now()), ManagerState::Draining);
    assert_eq!(pool.commands(), vec![Call::Release(1)]);

    pool.set(2, 2);
    assert_eq!(control.tick(Instant::now()), ManagerState::Stopped);
    assert!(manager.wait_stopped(Duration::ZERO));

    let states: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            PoolEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![ManagerState::Running, ManagerState::Draining, ManagerState::Stopped]
    );
    test_complete("stop_drains_to_stopped");
}

#[test]
fn threaded_loop_exits_after_stop() {
    init_test_logging();
    test_phase("threaded_loop_exits_after_stop");
    let manager = ResourceManager::new(fast_manager_config(1, 1, 4)).expect("manager");
    let pool = Arc::new(RecordingPool::new(&manager, 0, 0));
    let thread = manager.start(pool.clone()).expect("start");

    assert!(wait_until(Duration::from_secs(2), || manager.snapshot().allocated >= 1));
    manager.stop();
    assert!(manager.wait_stopped(Duration::from_secs(2)));
    thread.join().expect("control thread");
    assert_eq!(manager.snapshot().allocated, 0);

    // A stopped manager can be armed again.
    let _control = manager.control_loop(pool).expect("re-arm");
    test_complete("threaded_loop_exits_after_stop");
}
