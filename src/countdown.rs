//! Per-race ticking countdowns.
//!
//! A [`Countdown`] owns a tokio task that recomputes the race's countdown on
//! an adaptive cadence and publishes it on a `watch` channel. Dropping the
//! countdown cancels the task.

use chrono::{DateTime, Local, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::clock::Clock;
use crate::logging::{self, obj, Domain};
use crate::race::RaceSummary;
use crate::time::{
    countdown_class, countdown_seconds, format_countdown, race_status, CountdownClass, RaceStatus,
};

/// Under this magnitude the countdown ticks every second.
pub const FAST_TICK_BELOW_SECS: f64 = 300.0;
pub const FAST_TICK: Duration = Duration::from_secs(1);
pub const SLOW_TICK: Duration = Duration::from_secs(30);

pub fn tick_interval(seconds: f64) -> Duration {
    if seconds.abs() < FAST_TICK_BELOW_SECS {
        FAST_TICK
    } else {
        SLOW_TICK
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountdownView {
    pub seconds: f64,
    pub text: String,
    pub status: RaceStatus,
    pub class: CountdownClass,
    pub finished: bool,
}

impl CountdownView {
    pub fn compute(start_secs: i64, now: &DateTime<Utc>) -> Self {
        let seconds = countdown_seconds(start_secs, now);
        let status = race_status(start_secs, now);
        let finished = status == RaceStatus::Finished;
        let text = if finished {
            "Closed".to_string()
        } else {
            format_countdown(seconds, &now.with_timezone(&Local))
        };
        Self {
            seconds,
            text,
            status,
            class: countdown_class(seconds),
            finished,
        }
    }
}

pub struct Countdown {
    race_id: String,
    start_secs: i64,
    rx: watch::Receiver<CountdownView>,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Compute the first value immediately and start ticking.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(race_id: impl Into<String>, start_secs: i64, clock: Arc<dyn Clock>) -> Self {
        let race_id = race_id.into();
        let initial = CountdownView::compute(start_secs, &clock.now());
        let mut next = tick_interval(initial.seconds);
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                sleep(next).await;
                let view = CountdownView::compute(start_secs, &clock.now());
                next = tick_interval(view.seconds);
                if tx.send(view).is_err() {
                    break;
                }
            }
        });

        logging::debug(
            Domain::Countdown,
            "countdown_started",
            obj(&[("race_id", json!(race_id)), ("start", json!(start_secs))]),
        );

        Self {
            race_id,
            start_secs,
            rx,
            task,
        }
    }

    pub fn race_id(&self) -> &str {
        &self.race_id
    }

    pub fn start_secs(&self) -> i64 {
        self.start_secs
    }

    pub fn current(&self) -> CountdownView {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CountdownView> {
        self.rx.clone()
    }

    /// Cancel the ticking task; the last published view stays readable on
    /// existing receivers.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
        logging::debug(
            Domain::Countdown,
            "countdown_stopped",
            obj(&[("race_id", json!(self.race_id))]),
        );
    }
}

/// Countdowns for whatever set of races is currently displayed.
pub struct CountdownSet {
    clock: Arc<dyn Clock>,
    running: HashMap<String, Countdown>,
}

impl CountdownSet {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            running: HashMap::new(),
        }
    }

    /// Start countdowns for newly displayed races and stop the rest. A race
    /// whose start time moved gets a fresh countdown.
    pub fn sync(&mut self, displayed: &[RaceSummary]) {
        self.running.retain(|id, cd| {
            displayed
                .iter()
                .any(|r| r.race_id == *id && r.start_secs() == cd.start_secs())
        });
        for race in displayed {
            if !self.running.contains_key(&race.race_id) {
                let cd = Countdown::start(race.race_id.clone(), race.start_secs(), self.clock.clone());
                self.running.insert(race.race_id.clone(), cd);
            }
        }
    }

    pub fn get(&self, race_id: &str) -> Option<&Countdown> {
        self.running.get(race_id)
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn clear(&mut self) {
        self.running.clear();
    }
}
