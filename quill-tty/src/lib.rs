use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::Result;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use quill_core::{PageSlot, PaginationPlan, SectionNode};
use tracing::debug;

const SECTION_SIGN: &str = "§";

pub struct Painter<W: Write> {
    writer: W,
}

impl<W: Write> Painter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    pub fn move_to(&mut self, col: u16, row: u16) -> Result<()> {
        crossterm::queue!(
            &mut self.writer,
            cursor::MoveTo(col, row),
            Clear(ClearType::UntilNewLine)
        )?;
        Ok(())
    }

    /// Draws previous/next controls around the slots; the active page is
    /// reverse-video and disabled controls are dimmed.
    pub fn draw_pagination_bar(&mut self, plan: &PaginationPlan) -> Result<()> {
        let width = slot_width(plan);
        self.print_control(&control_label(Control::Previous, true), plan.previous.is_some())?;
        crossterm::queue!(&mut self.writer, Print(" "))?;
        for slot in &plan.slots {
            let cell = format_slot(*slot, width, false);
            let active = slot.page().is_some_and(|page| plan.state.is_active(page));
            if active {
                self.print_styled(&cell, Attribute::Reverse)?;
            } else {
                crossterm::queue!(&mut self.writer, Print(cell))?;
            }
        }
        crossterm::queue!(&mut self.writer, Print(" "))?;
        self.print_control(&control_label(Control::Next, true), plan.next.is_some())?;
        Ok(())
    }

    /// Draws the visible rows of an outline panel starting at `(col, row)`.
    pub fn draw_outline(
        &mut self,
        panel: &OutlinePanel,
        col: u16,
        row: u16,
        height: usize,
        width: usize,
    ) -> Result<()> {
        let lines = panel.lines();
        for (offset, (index, line)) in lines
            .iter()
            .enumerate()
            .skip(panel.scroll_offset())
            .take(height)
            .enumerate()
        {
            self.move_to(col, row + offset as u16)?;
            let text = truncate_with_ellipsis(format_outline_line(line), width);
            let selected = panel.is_focused() && index == panel.selected();
            match (selected, line.active) {
                (true, _) => self.print_styled(&text, Attribute::Reverse)?,
                (false, true) => self.print_styled(&text, Attribute::Bold)?,
                (false, false) => crossterm::queue!(&mut self.writer, Print(text))?,
            }
        }
        Ok(())
    }

    pub fn draw_stopwatch(&mut self, seconds: f64, max_seconds: Option<f64>, arm_degrees: u16) -> Result<()> {
        let face = format_stopwatch(seconds, max_seconds, arm_degrees);
        self.print_styled(&face, Attribute::Bold)?;
        Ok(())
    }

    fn print_control(&mut self, label: &str, enabled: bool) -> Result<()> {
        if enabled {
            crossterm::queue!(&mut self.writer, Print(label))?;
        } else {
            self.print_styled(label, Attribute::Dim)?;
        }
        Ok(())
    }

    fn print_styled(&mut self, text: &str, attribute: Attribute) -> Result<()> {
        crossterm::queue!(
            &mut self.writer,
            SetAttribute(attribute),
            Print(text),
            SetAttribute(Attribute::Reset)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Previous,
    Next,
}

fn control_label(control: Control, enabled: bool) -> String {
    let arrow = match (control, enabled) {
        (Control::Previous, true) => "‹",
        (Control::Next, true) => "›",
        (_, false) => " ",
    };
    match control {
        Control::Previous => format!("{} Prev", arrow),
        Control::Next => format!("Next {}", arrow),
    }
}

fn slot_width(plan: &PaginationPlan) -> usize {
    plan.state.num_pages().to_string().len()
}

fn format_slot(slot: PageSlot, width: usize, active: bool) -> String {
    match slot {
        PageSlot::Numbered(page) if active => format!("[{:>width$}]", page),
        PageSlot::Numbered(page) => format!(" {:>width$} ", page),
        PageSlot::Ellipsis => format!(" {:^width$} ", "…"),
        PageSlot::Placeholder => " ".repeat(width + 2),
    }
}

/// Plain-text pagination bar. Its width only depends on the page count's
/// digit count, never on the active page.
pub fn format_pagination_bar(plan: &PaginationPlan) -> String {
    let width = slot_width(plan);
    let slots: String = plan
        .slots
        .iter()
        .map(|slot| {
            let active = slot.page().is_some_and(|page| plan.state.is_active(page));
            format_slot(*slot, width, active)
        })
        .collect();
    format!(
        "{} {} {}",
        control_label(Control::Previous, plan.previous.is_some()),
        slots,
        control_label(Control::Next, plan.next.is_some())
    )
}

/// Stopwatch face: the formatted time and an arrow pointing where the arm is.
pub fn format_stopwatch(seconds: f64, max_seconds: Option<f64>, arm_degrees: u16) -> String {
    const ARMS: [char; 8] = ['↑', '↗', '→', '↘', '↓', '↙', '←', '↖'];
    let arm = ARMS[((arm_degrees as usize + 22) / 45) % ARMS.len()];
    format!(
        "( {} {} )",
        arm,
        quill_core::stopwatch::format_seconds(seconds, max_seconds)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineLine {
    pub id: String,
    pub text: String,
    pub depth: u8,
    pub active: bool,
    /// `None` for subsections and for sections without subsections.
    pub expanded: Option<bool>,
}

fn format_outline_line(line: &OutlineLine) -> String {
    if line.depth > quill_core::outline::SECTION_DEPTH {
        return format!("    {} {}", SECTION_SIGN, line.text);
    }
    let marker = match line.expanded {
        Some(true) => '▾',
        Some(false) => '▸',
        None => ' ',
    };
    format!("{} {} {}", marker, SECTION_SIGN, line.text)
}

/// Plain-text outline with every section expanded.
pub fn format_outline(sections: &[SectionNode]) -> String {
    let mut panel = OutlinePanel::new(sections.to_vec());
    panel.expand_all();
    panel
        .lines()
        .iter()
        .map(format_outline_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_with_ellipsis(text: String, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if text.chars().count() <= width {
        return text;
    }
    let mut truncated: String = text.chars().take(width.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Navigable section tree with scroll-spy highlighting. Sections are
/// collapsed unless expanded by hand or holding the active heading.
#[derive(Debug, Clone)]
pub struct OutlinePanel {
    sections: Vec<SectionNode>,
    expanded: HashSet<String>,
    active: Option<String>,
    selected: usize,
    scroll_offset: usize,
    focused: bool,
}

impl OutlinePanel {
    pub fn new(sections: Vec<SectionNode>) -> Self {
        Self {
            sections,
            expanded: HashSet::new(),
            active: None,
            selected: 0,
            scroll_offset: 0,
            focused: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn set_active(&mut self, id: Option<&str>) {
        self.active = id.map(str::to_string);
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn expand_all(&mut self) {
        self.expanded = self
            .sections
            .iter()
            .map(|section| section.heading.id.clone())
            .collect();
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Focusing selects the active entry, as the reader expects.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        if focused {
            let lines = self.lines();
            self.selected = lines.iter().position(|line| line.active).unwrap_or(0);
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn lines(&self) -> Vec<OutlineLine> {
        let active = self.active.as_deref();
        let mut lines = Vec::new();
        for section in &self.sections {
            let has_subs = !section.subheadings.is_empty();
            let expanded = self.expanded.contains(&section.heading.id)
                || active.is_some_and(|id| section.contains(id));
            lines.push(OutlineLine {
                id: section.heading.id.clone(),
                text: section.heading.text.clone(),
                depth: section.heading.depth,
                active: active == Some(section.heading.id.as_str()),
                expanded: has_subs.then_some(expanded),
            });
            if has_subs && expanded {
                lines.extend(section.subheadings.iter().map(|sub| OutlineLine {
                    id: sub.id.clone(),
                    text: sub.text.clone(),
                    depth: sub.depth,
                    active: active == Some(sub.id.as_str()),
                    expanded: None,
                }));
            }
        }
        lines
    }

    pub fn selected_line(&self) -> Option<OutlineLine> {
        self.lines().into_iter().nth(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        let len = self.lines().len();
        if len == 0 {
            return false;
        }
        let next = (self.selected as isize + delta).clamp(0, len as isize - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    /// Expands or collapses the selected section. The section holding the
    /// active heading always stays open, so toggling it does nothing.
    pub fn toggle_selected(&mut self) -> bool {
        let Some(line) = self.selected_line() else {
            return false;
        };
        if line.expanded.is_none() || self.holds_active(&line.id) {
            return false;
        }
        let expanded = !self.expanded.remove(&line.id);
        debug!(section = %line.id, expanded, "toggled outline section");
        if expanded {
            self.expanded.insert(line.id);
        }
        let len = self.lines().len();
        self.selected = self.selected.min(len.saturating_sub(1));
        true
    }

    fn holds_active(&self, section_id: &str) -> bool {
        let Some(active) = self.active.as_deref() else {
            return false;
        };
        self.sections
            .iter()
            .any(|section| section.heading.id == section_id && section.contains(active))
    }

    pub fn ensure_visible(&mut self, viewport_height: usize) {
        let len = self.lines().len();
        if viewport_height == 0 || len == 0 {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = len.saturating_sub(viewport_height);
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        let target = if self.focused {
            Some(self.selected)
        } else {
            self.lines().iter().position(|line| line.active)
        };
        let Some(target) = target else {
            return;
        };
        if target < self.scroll_offset {
            self.scroll_offset = target;
            return;
        }
        let bottom = self.scroll_offset + viewport_height;
        if target >= bottom {
            self.scroll_offset = target.saturating_sub(viewport_height.saturating_sub(1));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Scroll { lines: isize },
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ToggleOutline,
    OutlineMoveSelection { delta: isize },
    OutlineToggleSection,
    OutlineActivateSelection,
    CloseOverlay,
    ToggleTimer,
    ResetTimer,
    BeginSearch,
    SearchQueryChanged { query: String },
    SearchSubmit { query: String },
    SearchCancel,
    SearchNext { count: usize },
    SearchPrev { count: usize },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Toc,
    Search,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
}

impl EventMapper {
    const HALF_PAGE: isize = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.search_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Toc => self.map_event_outline(event),
            InputMode::Search => self.map_event_search(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::Scroll {
                        lines: count as isize,
                    }
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::Scroll {
                        lines: -(count as isize),
                    }
                }
                (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    let count = self.take_count() as isize;
                    UiEvent::Scroll {
                        lines: count * Self::HALF_PAGE,
                    }
                }
                (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    let count = self.take_count() as isize;
                    UiEvent::Scroll {
                        lines: -count * Self::HALF_PAGE,
                    }
                }
                (KeyCode::Char('l'), KeyModifiers::NONE)
                | (KeyCode::Right, KeyModifiers::NONE)
                | (KeyCode::PageDown, _) => {
                    let count = self.take_count();
                    UiEvent::NextPage { count }
                }
                (KeyCode::Char('h'), KeyModifiers::NONE)
                | (KeyCode::Left, KeyModifiers::NONE)
                | (KeyCode::PageUp, _) => {
                    let count = self.take_count();
                    UiEvent::PrevPage { count }
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) => {
                    let page = self.take_count();
                    UiEvent::GotoPage { page }
                }
                (KeyCode::Char('G'), KeyModifiers::SHIFT) | (KeyCode::End, _) => {
                    self.reset_count();
                    UiEvent::GotoPage { page: usize::MAX }
                }
                (KeyCode::Char('/'), KeyModifiers::NONE) => {
                    self.set_mode(InputMode::Search);
                    UiEvent::BeginSearch
                }
                (KeyCode::Char('n'), KeyModifiers::NONE) => {
                    let count = self.take_count();
                    UiEvent::SearchNext { count }
                }
                (KeyCode::Char('N'), modifiers)
                    if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
                {
                    let count = self.take_count();
                    UiEvent::SearchPrev { count }
                }
                (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                    self.reset_count();
                    UiEvent::ToggleOutline
                }
                (KeyCode::Char(' '), _) => {
                    self.reset_count();
                    UiEvent::ToggleTimer
                }
                (KeyCode::Char('r'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::ResetTimer
                }
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_outline(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => UiEvent::CloseOverlay,
                (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => UiEvent::CloseOverlay,
                (KeyCode::Enter, _) => UiEvent::OutlineActivateSelection,
                (KeyCode::Char(' '), _) | (KeyCode::Tab, _) => UiEvent::OutlineToggleSection,
                (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                    UiEvent::OutlineMoveSelection { delta: 1 }
                }
                (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                    UiEvent::OutlineMoveSelection { delta: -1 }
                }
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    UiEvent::Quit
                }
                (KeyCode::Char('q'), _) => UiEvent::Quit,
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_search(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::SearchCancel
                }
                (KeyCode::Enter, _) => {
                    let query = std::mem::take(&mut self.search_buffer);
                    self.set_mode(InputMode::Normal);
                    UiEvent::SearchSubmit { query }
                }
                (KeyCode::Backspace, _) => {
                    self.search_buffer.pop();
                    UiEvent::SearchQueryChanged {
                        query: self.search_buffer.clone(),
                    }
                }
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::SearchCancel
                }
                (KeyCode::Char(c), modifiers)
                    if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
                {
                    self.search_buffer.push(c);
                    UiEvent::SearchQueryChanged {
                        query: self.search_buffer.clone(),
                    }
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.mode == InputMode::Search {
            return Some(format!("/{}", self.search_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
