//! Simulated wall-clock.
//!
//! The [`SimClock`] is the single authority for simulated "now". The main
//! loop advances it once per tick; everything else (scheduler, agents,
//! telemetry stamps) reads it. Tick listeners are invoked after each advance,
//! outside the clock's own lock.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// How simulated time relates to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// One simulated tick per wall-clock tick interval.
    RealTime,
    /// Advance as fast as the main loop schedules ticks.
    Accelerated,
}

type TickListener = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

/// Simulated clock with per-tick listener registration.
pub struct SimClock {
    now: RwLock<DateTime<Utc>>,
    mode: ClockMode,
    listeners: Mutex<Vec<TickListener>>,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>, mode: ClockMode) -> Self {
        SimClock {
            now: RwLock::new(start),
            mode,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// The simulated instant `d` from now. Reserved for timer integration.
    pub fn after(&self, d: Duration) -> DateTime<Utc> {
        self.now() + TimeDelta::from_std(d).unwrap_or_default()
    }

    /// Register a listener invoked after every advance with the new time.
    pub fn on_tick(&self, listener: impl Fn(DateTime<Utc>) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(listener));
    }

    /// Advance simulated time by one tick and notify listeners.
    ///
    /// Listeners run outside both locks, so a listener may re-enter the clock
    /// (read `now`, register another listener).
    pub fn advance(&self, step: Duration) -> DateTime<Utc> {
        let new_now = {
            let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
            *now += TimeDelta::from_std(step).unwrap_or_default();
            *now
        };
        let listeners: Vec<TickListener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(new_now);
        }
        new_now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn advance_moves_now() {
        let clock = SimClock::new(start(), ClockMode::Accelerated);
        assert_eq!(clock.now(), start());
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), start() + TimeDelta::seconds(5));
    }

    #[test]
    fn after_offsets_from_now() {
        let clock = SimClock::new(start(), ClockMode::RealTime);
        clock.advance(Duration::from_secs(10));
        assert_eq!(
            clock.after(Duration::from_secs(3)),
            start() + TimeDelta::seconds(13)
        );
    }

    #[test]
    fn listeners_fire_on_each_advance() {
        let clock = SimClock::new(start(), ClockMode::Accelerated);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        clock.on_tick(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        clock.advance(Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_sees_post_advance_time() {
        let clock = Arc::new(SimClock::new(start(), ClockMode::Accelerated));
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        clock.on_tick(move |now| {
            *seen_clone.lock().unwrap() = Some(now);
        });
        clock.advance(Duration::from_secs(7));
        assert_eq!(
            seen.lock().unwrap().unwrap(),
            start() + TimeDelta::seconds(7)
        );
    }

    #[test]
    fn listener_may_reenter_clock() {
        let clock = Arc::new(SimClock::new(start(), ClockMode::Accelerated));
        let clock_clone = clock.clone();
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();
        clock.on_tick(move |_| {
            *observed_clone.lock().unwrap() = Some(clock_clone.now());
        });
        clock.advance(Duration::from_secs(2));
        assert!(observed.lock().unwrap().is_some());
    }
}
