use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::events::{BusEvent, EventBus};
use crate::schedule::{Scheduler, TaskHandle};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StopwatchOptions {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// The stopwatch resets itself once this many seconds have elapsed.
    /// `0` or `false` in a config file disables the limit.
    #[serde(
        deserialize_with = "deserialize_limit",
        serialize_with = "serialize_limit"
    )]
    pub max_seconds: Option<f64>,
}

impl Default for StopwatchOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            max_seconds: Some(60.0),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Seconds(f64),
    Enabled(bool),
}

fn deserialize_limit<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawLimit::deserialize(deserializer)? {
        RawLimit::Seconds(seconds) if seconds > 0.0 => Ok(Some(seconds)),
        RawLimit::Seconds(seconds) if seconds == 0.0 => Ok(None),
        RawLimit::Seconds(seconds) => Err(D::Error::custom(format!(
            "max_seconds must be a positive number of seconds, got {}",
            seconds
        ))),
        RawLimit::Enabled(false) => Ok(None),
        RawLimit::Enabled(true) => Err(D::Error::custom(
            "max_seconds = true needs a number of seconds instead",
        )),
    }
}

fn serialize_limit<S>(limit: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(limit.unwrap_or(0.0))
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopwatchEvent {
    Started,
    Stopped,
    Reset,
    Tick { seconds: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopwatchEventKind {
    Started,
    Stopped,
    Reset,
    Tick,
}

impl BusEvent for StopwatchEvent {
    type Kind = StopwatchEventKind;

    fn kind(&self) -> StopwatchEventKind {
        match self {
            StopwatchEvent::Started => StopwatchEventKind::Started,
            StopwatchEvent::Stopped => StopwatchEventKind::Stopped,
            StopwatchEvent::Reset => StopwatchEventKind::Reset,
            StopwatchEvent::Tick { .. } => StopwatchEventKind::Tick,
        }
    }
}

#[derive(Default)]
struct StopwatchState {
    elapsed: Duration,
    ticks: u64,
    pending: Option<TaskHandle>,
    // Bumped on stop so a tick that was already dispatched does nothing.
    generation: u64,
}

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    options: StopwatchOptions,
    state: Mutex<StopwatchState>,
    events: EventBus<StopwatchEvent>,
}

/// Interval-driven stopwatch. Cloning yields another handle to the same
/// stopwatch.
#[derive(Clone)]
pub struct StopwatchController {
    inner: Arc<Inner>,
}

impl StopwatchController {
    pub fn new(scheduler: Arc<dyn Scheduler>, options: StopwatchOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                options,
                state: Mutex::new(StopwatchState::default()),
                events: EventBus::new(),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<StopwatchEvent> {
        &self.inner.events
    }

    pub fn options(&self) -> &StopwatchOptions {
        &self.inner.options
    }

    pub fn seconds(&self) -> f64 {
        self.inner.state.lock().elapsed.as_secs_f64()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.state.lock().ticks
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Rotation of the dial arm: one degree per tick.
    pub fn arm_rotation_degrees(&self) -> u16 {
        (self.ticks() % 360) as u16
    }

    /// Starts ticking. Returns `false` without side effects when already running.
    pub fn start(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.pending.is_some() {
                return false;
            }
            let handle = schedule_tick(&self.inner, state.generation);
            state.pending = Some(handle);
        }
        debug!("stopwatch started");
        self.inner.events.notify(&StopwatchEvent::Started);
        true
    }

    pub fn stop(&self) {
        stop(&self.inner);
    }

    pub fn reset(&self) {
        reset(&self.inner);
    }
}

fn schedule_tick(inner: &Arc<Inner>, generation: u64) -> TaskHandle {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    inner.scheduler.schedule_after(
        inner.options.tick_interval,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                tick(&inner, generation);
            }
        }),
    )
}

fn tick(inner: &Arc<Inner>, generation: u64) {
    let (seconds, limit_reached) = {
        let mut state = inner.state.lock();
        if state.generation != generation || state.pending.is_none() {
            return;
        }
        state.elapsed += inner.options.tick_interval;
        state.ticks += 1;
        let seconds = state.elapsed.as_secs_f64();
        let limit_reached = inner
            .options
            .max_seconds
            .is_some_and(|max| seconds >= max);
        if !limit_reached {
            state.pending = Some(schedule_tick(inner, generation));
        }
        (seconds, limit_reached)
    };

    inner.events.notify(&StopwatchEvent::Tick { seconds });
    if limit_reached {
        debug!(seconds, "stopwatch reached its limit");
        reset(inner);
    }
}

fn stop(inner: &Inner) {
    {
        let mut state = inner.state.lock();
        if let Some(handle) = state.pending.take() {
            inner.scheduler.cancel(handle);
        }
        state.generation += 1;
    }
    inner.events.notify(&StopwatchEvent::Stopped);
}

fn reset(inner: &Inner) {
    {
        let mut state = inner.state.lock();
        state.elapsed = Duration::ZERO;
        state.ticks = 0;
    }
    stop(inner);
    inner.events.notify(&StopwatchEvent::Reset);
}

/// Renders elapsed seconds with two decimals, or `--.--` past the limit.
pub fn format_seconds(seconds: f64, max_seconds: Option<f64>) -> String {
    match max_seconds {
        Some(max) if seconds >= max => "--.--".to_string(),
        _ => format!("{:05.2}", seconds),
    }
}
