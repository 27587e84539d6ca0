use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

use crate::events::{BusEvent, EventBus, Subscription};
use crate::schedule::{Scheduler, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TypewriterError {
    #[error("no non-empty texts provided")]
    NoTexts,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypewriterOptions {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub type_letter_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub delete_letter_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub pause_duration: Duration,
}

impl Default for TypewriterOptions {
    fn default() -> Self {
        Self {
            type_letter_delay: Duration::from_millis(80),
            delete_letter_delay: Duration::from_millis(40),
            pause_duration: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypewriterEvent {
    TextChanged(String),
    /// The text at `index` was typed and deleted, or skipped because it is empty.
    TextCompleted { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypewriterEventKind {
    TextChanged,
    TextCompleted,
}

impl BusEvent for TypewriterEvent {
    type Kind = TypewriterEventKind;

    fn kind(&self) -> TypewriterEventKind {
        match self {
            TypewriterEvent::TextChanged(_) => TypewriterEventKind::TextChanged,
            TypewriterEvent::TextCompleted { .. } => TypewriterEventKind::TextCompleted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Typing,
    Deleting,
}

struct TypewriterState {
    text_index: usize,
    visible: usize,
    phase: Phase,
    pending: Option<TaskHandle>,
    generation: u64,
    cycles: u64,
}

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    options: TypewriterOptions,
    // Grapheme clusters of every text.
    texts: Vec<Vec<String>>,
    state: Mutex<TypewriterState>,
    events: EventBus<TypewriterEvent>,
}

/// Types each text one grapheme at a time, pauses, deletes it again and
/// moves on to the next text, cycling forever.
#[derive(Clone)]
pub struct Typewriter {
    inner: Arc<Inner>,
}

impl Typewriter {
    pub fn new<I, S>(
        texts: I,
        scheduler: Arc<dyn Scheduler>,
        options: TypewriterOptions,
    ) -> Result<Self, TypewriterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let texts: Vec<Vec<String>> = texts
            .into_iter()
            .map(|text| text.as_ref().graphemes(true).map(str::to_string).collect())
            .collect();
        if texts.iter().all(Vec::is_empty) {
            return Err(TypewriterError::NoTexts);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                options,
                texts,
                state: Mutex::new(TypewriterState {
                    text_index: 0,
                    visible: 0,
                    phase: Phase::Typing,
                    pending: None,
                    generation: 0,
                    cycles: 0,
                }),
                events: EventBus::new(),
            }),
        })
    }

    pub fn events(&self) -> &EventBus<TypewriterEvent> {
        &self.inner.events
    }

    pub fn on_text_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner
            .events
            .subscribe(TypewriterEventKind::TextChanged, move |event| {
                if let TypewriterEvent::TextChanged(text) = event {
                    handler(text);
                }
            })
    }

    pub fn text(&self) -> String {
        let state = self.inner.state.lock();
        self.inner.texts[state.text_index][..state.visible].concat()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Number of texts fully typed and deleted so far.
    pub fn completed_texts(&self) -> u64 {
        self.inner.state.lock().cycles
    }

    /// Starts animating. A second call while running does nothing.
    pub fn start(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.pending.is_some() {
            return false;
        }
        let delay = match state.phase {
            Phase::Typing => self.inner.options.type_letter_delay,
            Phase::Deleting => self.inner.options.delete_letter_delay,
        };
        let handle = schedule_step(&self.inner, delay, state.generation);
        state.pending = Some(handle);
        true
    }

    /// Cancels the pending step; the visible text stays where it is.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let Some(handle) = state.pending.take() {
            self.inner.scheduler.cancel(handle);
        }
        state.generation += 1;
    }
}

fn schedule_step(inner: &Arc<Inner>, delay: Duration, generation: u64) -> TaskHandle {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    inner.scheduler.schedule_after(
        delay,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                step(&inner, generation);
            }
        }),
    )
}

fn step(inner: &Arc<Inner>, generation: u64) {
    let options = &inner.options;
    let (text, completed) = {
        let mut state = inner.state.lock();
        if state.generation != generation || state.pending.is_none() {
            return;
        }
        let graphemes = &inner.texts[state.text_index];

        let index = state.text_index;

        let (text, completed, delay) = match state.phase {
            Phase::Typing if graphemes.is_empty() => {
                state.text_index = (index + 1) % inner.texts.len();
                state.cycles += 1;
                (None, Some(index), options.type_letter_delay)
            }
            Phase::Typing => {
                state.visible += 1;
                if state.visible >= graphemes.len() {
                    state.phase = Phase::Deleting;
                    (Some(graphemes.concat()), None, options.pause_duration)
                } else {
                    (
                        Some(graphemes[..state.visible].concat()),
                        None,
                        options.type_letter_delay,
                    )
                }
            }
            Phase::Deleting => {
                state.visible = state.visible.saturating_sub(1);
                let text = graphemes[..state.visible].concat();
                if state.visible == 0 {
                    state.phase = Phase::Typing;
                    state.text_index = (index + 1) % inner.texts.len();
                    state.cycles += 1;
                    (Some(text), Some(index), options.type_letter_delay)
                } else {
                    (Some(text), None, options.delete_letter_delay)
                }
            }
        };

        state.pending = Some(schedule_step(inner, delay, generation));
        (text, completed)
    };

    if let Some(text) = text {
        inner.events.notify(&TypewriterEvent::TextChanged(text));
    }
    if let Some(index) = completed {
        inner.events.notify(&TypewriterEvent::TextCompleted { index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{HeldScheduler, ManualScheduler};

    fn typewriter(texts: &[&str]) -> (Arc<ManualScheduler>, Typewriter, Arc<Mutex<Vec<String>>>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let typewriter =
            Typewriter::new(texts.iter().copied(), scheduler.clone(), TypewriterOptions::default())
                .unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        typewriter
            .on_text_changed(move |text| sink.lock().push(text.to_string()))
            .keep();
        (scheduler, typewriter, frames)
    }

    #[test]
    fn rejects_empty_text_list() {
        let scheduler = Arc::new(ManualScheduler::new());
        let result = Typewriter::new(Vec::<String>::new(), scheduler, TypewriterOptions::default());
        assert_eq!(result.err(), Some(TypewriterError::NoTexts));
    }

    #[test]
    fn types_pauses_deletes_and_cycles() {
        let (scheduler, typewriter, frames) = typewriter(&["ab", "c"]);
        typewriter.start();

        scheduler.advance(Duration::from_millis(160));
        assert_eq!(*frames.lock(), vec!["a", "ab"]);

        // nothing happens during the pause
        scheduler.advance(Duration::from_millis(1999));
        assert_eq!(frames.lock().len(), 2);

        scheduler.advance(Duration::from_millis(41));
        assert_eq!(*frames.lock(), vec!["a", "ab", "a", ""]);
        assert_eq!(typewriter.completed_texts(), 1);

        scheduler.advance(Duration::from_millis(80));
        assert_eq!(frames.lock().last().map(String::as_str), Some("c"));
        assert_eq!(typewriter.text(), "c");

        scheduler.advance(Duration::from_millis(2000 + 80));
        assert_eq!(frames.lock().last().map(String::as_str), Some("a"));
    }

    #[test]
    fn steps_over_grapheme_clusters() {
        let (scheduler, typewriter, frames) = typewriter(&["e\u{301}x"]);
        typewriter.start();
        scheduler.advance(Duration::from_millis(80));
        assert_eq!(*frames.lock(), vec!["e\u{301}"]);
    }

    #[test]
    fn start_is_idempotent_and_stop_freezes() {
        let (scheduler, typewriter, frames) = typewriter(&["hello"]);
        assert!(typewriter.start());
        assert!(!typewriter.start());
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_millis(240));
        assert_eq!(typewriter.text(), "hel");
        typewriter.stop();
        assert!(!typewriter.is_running());
        scheduler.advance(Duration::from_secs(5));
        assert_eq!(frames.lock().len(), 3);

        typewriter.start();
        scheduler.advance(Duration::from_millis(80));
        assert_eq!(typewriter.text(), "hell");
    }

    #[test]
    fn empty_texts_are_skipped() {
        let (scheduler, typewriter, frames) = typewriter(&["", "x"]);
        typewriter.start();
        scheduler.advance(Duration::from_millis(160));
        assert_eq!(*frames.lock(), vec!["x"]);
    }

    #[test]
    fn rejects_only_empty_texts() {
        let scheduler = Arc::new(ManualScheduler::new());
        let result = Typewriter::new(["", ""], scheduler, TypewriterOptions::default());
        assert_eq!(result.err(), Some(TypewriterError::NoTexts));
    }

    #[test]
    fn announces_every_completed_text() {
        let (scheduler, typewriter, _frames) = typewriter(&["", "x"]);
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);
        typewriter
            .events()
            .subscribe(TypewriterEventKind::TextCompleted, move |event| {
                if let TypewriterEvent::TextCompleted { index } = event {
                    sink.lock().push(*index);
                }
            })
            .keep();

        typewriter.start();
        scheduler.advance(Duration::from_millis(2160));
        assert_eq!(*completed.lock(), vec![0, 1]);
        assert_eq!(typewriter.completed_texts(), 2);

        scheduler.advance(Duration::from_secs(10));
        assert_eq!(completed.lock().len() as u64, typewriter.completed_texts());
    }

    #[test]
    fn dispatched_step_after_stop_is_ignored() {
        let scheduler = Arc::new(HeldScheduler::default());
        let typewriter =
            Typewriter::new(["hello"], scheduler.clone(), TypewriterOptions::default()).unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        typewriter
            .on_text_changed(move |text| sink.lock().push(text.to_string()))
            .keep();

        typewriter.start();
        let first = scheduler.take_next().unwrap();
        first();
        assert_eq!(typewriter.text(), "h");

        let dispatched = scheduler.take_next().unwrap();
        typewriter.stop();
        dispatched();
        assert_eq!(typewriter.text(), "h");
        assert_eq!(*frames.lock(), vec!["h"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn step_from_before_a_restart_is_ignored() {
        let scheduler = Arc::new(HeldScheduler::default());
        let typewriter =
            Typewriter::new(["hello"], scheduler.clone(), TypewriterOptions::default()).unwrap();

        typewriter.start();
        typewriter.stop();
        assert!(typewriter.start());
        let stale = scheduler.take_next().unwrap();
        let fresh = scheduler.take_next().unwrap();

        stale();
        assert_eq!(typewriter.text(), "");
        assert_eq!(scheduler.pending(), 0);

        fresh();
        assert_eq!(typewriter.text(), "h");
        assert_eq!(scheduler.pending(), 1);
    }
}
