use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::{BusEvent, EventBus, Subscription};

/// A document heading in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub id: String,
    pub text: String,
    pub depth: u8,
}

impl Heading {
    pub fn new(id: impl Into<String>, text: impl Into<String>, depth: u8) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            depth,
        }
    }

    fn is_outline_depth(&self) -> bool {
        self.depth == SECTION_DEPTH || self.depth == SUBSECTION_DEPTH
    }
}

pub const SECTION_DEPTH: u8 = 2;
pub const SUBSECTION_DEPTH: u8 = 3;

/// A depth-2 heading with the depth-3 headings that follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionNode {
    pub heading: Heading,
    pub subheadings: Vec<Heading>,
}

impl SectionNode {
    pub fn contains(&self, id: &str) -> bool {
        self.heading.id == id || self.subheadings.iter().any(|sub| sub.id == id)
    }
}

/// Groups a flat heading list into sections. Subheadings that appear before
/// the first section are dropped; depths other than 2 and 3 are ignored.
pub fn build_sections(headings: &[Heading]) -> Vec<SectionNode> {
    let mut sections: Vec<SectionNode> = Vec::new();

    for heading in headings.iter().filter(|heading| heading.is_outline_depth()) {
        if heading.depth == SECTION_DEPTH {
            sections.push(SectionNode {
                heading: heading.clone(),
                subheadings: Vec::new(),
            });
        } else if let Some(section) = sections.last_mut() {
            section.subheadings.push(heading.clone());
        } else {
            warn!(id = %heading.id, "dropping subheading without an owning section");
        }
    }

    sections
}

/// Snapshot of the headings intersecting the viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityBatch {
    pub visible_ids: Vec<String>,
    pub scroll_offset: f64,
}

impl VisibilityBatch {
    pub fn new<I, S>(visible_ids: I, scroll_offset: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            visible_ids: visible_ids.into_iter().map(Into::into).collect(),
            scroll_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlineEvent {
    ActiveChanged { heading_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutlineEventKind {
    ActiveChanged,
}

impl BusEvent for OutlineEvent {
    type Kind = OutlineEventKind;

    fn kind(&self) -> OutlineEventKind {
        match self {
            OutlineEvent::ActiveChanged { .. } => OutlineEventKind::ActiveChanged,
        }
    }
}

/// Scroll-spy state machine. Tracks which heading is active given a stream
/// of visibility batches and announces every change on its event bus.
///
/// Visible ids are sorted by document position before a candidate is
/// picked, so callers may report them in any order.
pub struct ActiveSectionTracker {
    order: Vec<String>,
    positions: HashMap<String, usize>,
    current: Option<String>,
    last_scroll_offset: f64,
    events: EventBus<OutlineEvent>,
}

impl ActiveSectionTracker {
    pub fn new(headings: &[Heading]) -> Self {
        let order: Vec<String> = headings
            .iter()
            .filter(|heading| heading.is_outline_depth())
            .map(|heading| heading.id.clone())
            .collect();
        let mut positions = HashMap::with_capacity(order.len());
        for (index, id) in order.iter().enumerate() {
            positions.entry(id.clone()).or_insert(index);
        }
        Self {
            order,
            positions,
            current: None,
            last_scroll_offset: 0.0,
            events: EventBus::new(),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn last_scroll_offset(&self) -> f64 {
        self.last_scroll_offset
    }

    pub fn events(&self) -> &EventBus<OutlineEvent> {
        &self.events
    }

    pub fn on_active_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.events
            .subscribe(OutlineEventKind::ActiveChanged, move |event| match event {
                OutlineEvent::ActiveChanged { heading_id } => handler(heading_id),
            })
    }

    /// Forgets the active heading and scroll position, as on document reload.
    pub fn reset(&mut self) {
        self.current = None;
        self.last_scroll_offset = 0.0;
    }

    /// Processes one batch and returns the new active id if it changed.
    pub fn observe(&mut self, batch: &VisibilityBatch) -> Option<&str> {
        let scrolling_up = batch.scroll_offset - self.last_scroll_offset < 0.0;
        self.last_scroll_offset = batch.scroll_offset;

        let candidate = match self.first_visible(&batch.visible_ids) {
            Some(index) => Some(index),
            None if scrolling_up => self
                .current
                .as_ref()
                .and_then(|id| self.positions.get(id))
                .map(|index| index.saturating_sub(1)),
            None => None,
        };

        let candidate = candidate.map(|index| self.order[index].clone())?;
        if self.current.as_deref() == Some(candidate.as_str()) {
            return None;
        }

        debug!(from = ?self.current, to = %candidate, "active heading changed");
        self.current = Some(candidate.clone());
        self.events.notify(&OutlineEvent::ActiveChanged {
            heading_id: candidate,
        });
        self.current.as_deref()
    }

    fn first_visible(&self, visible_ids: &[String]) -> Option<usize> {
        visible_ids
            .iter()
            .filter_map(|id| {
                let position = self.positions.get(id).copied();
                if position.is_none() {
                    debug!(%id, "ignoring unknown heading id");
                }
                position
            })
            .min()
    }
}
