use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use quill_core::content::{blog_page_href, locate_headings, parse_post};
use quill_core::{
    build_sections, matching_lines, ActiveSectionTracker, BlogPostMetadata, DirectoryPostSource,
    LocatedHeading, PaginationError, PaginationPlan, PaginationState, Post, PostCollection,
    Scheduler, SearchField, SiteConfig,
    StopwatchController, StopwatchEventKind, Subscription, TokioScheduler, Typewriter,
    TypewriterEvent, TypewriterEventKind, VisibilityBatch,
};
use quill_tty::{
    format_outline, format_pagination_bar, write_status_line, EventMapper, InputMode,
    OutlinePanel, Painter, UiEvent,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "quill",
    version,
    about = "Blog index, outlines and small widgets for the terminal"
)]
struct Args {
    /// Site configuration file (defaults to quill.toml in the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List one page of the blog index
    Index {
        /// Directory holding the Markdown posts
        dir: PathBuf,
        /// Page to list (1-based)
        #[arg(short = 'p', long = "page", default_value_t = 1)]
        page: usize,
        #[arg(long)]
        json: bool,
    },
    /// Find posts whose title, description, tags or body mention every term
    Search {
        /// Directory holding the Markdown posts
        dir: PathBuf,
        #[arg(required = true)]
        query: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the section tree of a post
    Outline {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Read a post with a scroll-spy outline
    Read { file: PathBuf },
    /// Interactive stopwatch
    Stopwatch,
    /// Type and delete texts in a loop
    Typewriter {
        #[arg(required = true)]
        texts: Vec<String>,
        /// Stop after this many texts were typed and deleted
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        cycles: Option<u64>,
    },
}

impl Commands {
    fn is_interactive(&self) -> bool {
        matches!(
            self,
            Commands::Read { .. } | Commands::Stopwatch | Commands::Typewriter { .. }
        )
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "quill", "quill");
    let _log_guard = init_logging(project_dirs.as_ref(), !args.command.is_interactive())?;
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Index { dir, page, json } => run_index(&config, &dir, page, json).await,
        Commands::Search { dir, query, json } => {
            run_search(&config, &dir, &query.join(" "), json).await
        }
        Commands::Outline { file, json } => run_outline(&file, json).await,
        Commands::Read { file } => run_read(&file).await,
        Commands::Stopwatch => run_stopwatch(&config),
        Commands::Typewriter { texts, cycles } => run_typewriter(&config, texts, cycles).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<SiteConfig> {
    match path {
        Some(path) => SiteConfig::load(path),
        None => match SiteConfig::default_path() {
            Some(path) => SiteConfig::load_or_default(&path),
            None => Ok(SiteConfig::default()),
        },
    }
}

async fn load_post(file: &Path) -> Result<Post> {
    let source = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {:?}", file))?;
    let slug = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("cannot derive a slug from {:?}", file))?;
    parse_post(slug, &source).with_context(|| format!("failed to parse {:?}", file))
}

#[derive(Serialize)]
struct IndexEntry<'a> {
    #[serde(flatten)]
    metadata: &'a BlogPostMetadata,
    href: String,
}

#[derive(Serialize)]
struct IndexReport<'a> {
    posts: Vec<IndexEntry<'a>>,
    pagination: PaginationPlan,
    previous_href: Option<String>,
    next_href: Option<String>,
}

async fn run_index(config: &SiteConfig, dir: &Path, page: usize, json: bool) -> Result<()> {
    let source = DirectoryPostSource::new(dir);
    let collection = PostCollection::load(&source, config.posts_per_page).await?;
    let index_page = collection
        .page(page)
        .with_context(|| format!("blog index has {} page(s)", collection.num_pages()))?;
    let plan = PaginationPlan::from(index_page.pagination);
    info!(
        posts = collection.len(),
        page,
        num_pages = collection.num_pages(),
        "listing blog index"
    );

    let report = IndexReport {
        posts: index_page
            .posts
            .iter()
            .map(|post| IndexEntry {
                metadata: &post.metadata,
                href: post.metadata.href(),
            })
            .collect(),
        previous_href: plan.previous.map(blog_page_href),
        next_href: plan.next.map(blog_page_href),
        pagination: plan,
    };

    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
        return Ok(());
    }

    if report.posts.is_empty() {
        writeln!(stdout, "No posts yet.")?;
    }
    for entry in &report.posts {
        let data = &entry.metadata.data;
        writeln!(stdout, "{}  {}", data.created_at, data.title)?;
        writeln!(stdout, "    {}  {}", entry.href, data.description)?;
        if !data.tags.is_empty() {
            writeln!(stdout, "    #{}", data.tags.join(" #"))?;
        }
    }
    writeln!(stdout)?;
    writeln!(stdout, "{}", format_pagination_bar(&report.pagination))?;
    if let Some(href) = &report.previous_href {
        writeln!(stdout, "prev: {}", href)?;
    }
    if let Some(href) = &report.next_href {
        writeln!(stdout, "next: {}", href)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct SearchEntry<'a> {
    #[serde(flatten)]
    metadata: &'a BlogPostMetadata,
    href: String,
    matched: Vec<SearchField>,
}

#[derive(Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    posts: Vec<SearchEntry<'a>>,
}

async fn run_search(config: &SiteConfig, dir: &Path, query: &str, json: bool) -> Result<()> {
    let source = DirectoryPostSource::new(dir);
    let collection = PostCollection::load(&source, config.posts_per_page).await?;
    let report = SearchReport {
        query,
        posts: collection
            .search(query)
            .into_iter()
            .map(|hit| SearchEntry {
                metadata: &hit.post.metadata,
                href: hit.post.metadata.href(),
                matched: hit.fields,
            })
            .collect(),
    };
    info!(query, hits = report.posts.len(), "searched blog");

    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
        return Ok(());
    }

    if report.posts.is_empty() {
        writeln!(stdout, "No posts match {:?}.", query)?;
    }
    for entry in &report.posts {
        let data = &entry.metadata.data;
        let matched: Vec<_> = entry.matched.iter().map(field_label).collect();
        writeln!(stdout, "{}  {}", data.created_at, data.title)?;
        writeln!(stdout, "    {}  matched in {}", entry.href, matched.join(", "))?;
    }
    Ok(())
}

fn field_label(field: &SearchField) -> &'static str {
    match field {
        SearchField::Title => "title",
        SearchField::Description => "description",
        SearchField::Tags => "tags",
        SearchField::Body => "body",
    }
}

async fn run_outline(file: &Path, json: bool) -> Result<()> {
    let post = load_post(file).await?;
    let sections = build_sections(&post.headings);
    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &sections)?;
        writeln!(stdout)?;
        return Ok(());
    }
    writeln!(stdout, "{}", post.metadata.data.title)?;
    writeln!(stdout)?;
    if sections.is_empty() {
        writeln!(stdout, "(no sections)")?;
    } else {
        writeln!(stdout, "{}", format_outline(&sections))?;
    }
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Incremental search over the reader's lines.
#[derive(Debug, Default)]
struct ReaderSearch {
    query: String,
    matches: Vec<usize>,
    current: Option<usize>,
}

impl ReaderSearch {
    fn current_line(&self) -> Option<usize> {
        self.current.and_then(|index| self.matches.get(index).copied())
    }

    fn is_match(&self, line: usize) -> bool {
        self.matches.binary_search(&line).is_ok()
    }

    /// `(i/n)` counter for the footer, `None` without a query.
    fn counter(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        Some(match self.current {
            _ if self.matches.is_empty() => "(no matches)".to_string(),
            Some(index) => format!("({}/{})", index + 1, self.matches.len()),
            None => format!("(0/{})", self.matches.len()),
        })
    }
}

/// Reader state: a viewport over the post body whose visible headings feed
/// the scroll-spy tracker.
struct Reader {
    title: String,
    lines: Vec<String>,
    headings: Vec<LocatedHeading>,
    tracker: ActiveSectionTracker,
    outline: OutlinePanel,
    scroll: usize,
    viewport_height: usize,
    search: ReaderSearch,
    _active_log: Subscription,
}

impl Reader {
    fn new(post: Post) -> Self {
        let headings = locate_headings(&post.body);
        let tracker = ActiveSectionTracker::new(&post.headings);
        let active_log = tracker.on_active_changed(|id| debug!(heading = id, "reading section"));
        Self {
            title: post.metadata.data.title.clone(),
            lines: post.body.lines().map(str::to_string).collect(),
            outline: OutlinePanel::new(build_sections(&post.headings)),
            headings,
            tracker,
            scroll: 0,
            viewport_height: 1,
            search: ReaderSearch::default(),
            _active_log: active_log,
        }
    }

    fn max_scroll(&self) -> usize {
        self.lines.len().saturating_sub(self.viewport_height)
    }

    fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height.max(1);
        self.scroll = self.scroll.min(self.max_scroll());
        self.observe();
    }

    fn scroll_to(&mut self, line: usize) -> bool {
        let target = line.min(self.max_scroll());
        if target == self.scroll {
            return false;
        }
        self.scroll = target;
        self.observe();
        true
    }

    fn scroll_by(&mut self, delta: isize) -> bool {
        let target = if delta < 0 {
            self.scroll.saturating_sub(delta.unsigned_abs())
        } else {
            self.scroll.saturating_add(delta as usize)
        };
        self.scroll_to(target)
    }

    fn observe(&mut self) {
        let bottom = self.scroll + self.viewport_height;
        let visible = self
            .headings
            .iter()
            .filter(|located| located.line >= self.scroll && located.line < bottom)
            .map(|located| located.heading.id.clone());
        let batch = VisibilityBatch::new(visible, self.scroll as f64);
        self.tracker.observe(&batch);
        self.outline.set_active(self.tracker.current());
    }

    fn num_pages(&self) -> usize {
        self.lines.len().div_ceil(self.viewport_height).max(1)
    }

    /// One page per screenful; the last screen always counts as the last page.
    fn pagination(&self) -> Result<PaginationState, PaginationError> {
        let num_pages = self.num_pages();
        let active = if self.scroll >= self.max_scroll() && self.scroll > 0 {
            num_pages
        } else {
            (self.scroll / self.viewport_height + 1).min(num_pages)
        };
        PaginationState::new(num_pages, active)
    }

    fn goto_page(&mut self, page: usize) -> bool {
        let page = page.clamp(1, self.num_pages());
        self.scroll_to((page - 1) * self.viewport_height)
    }

    /// Scrolls just enough to bring `line` on screen.
    fn reveal(&mut self, line: usize) -> bool {
        if line >= self.scroll && line < self.scroll + self.viewport_height {
            return false;
        }
        self.scroll_to(line)
    }

    /// Matches `query` against every line and jumps to the first match at
    /// or below the top of the viewport, wrapping to the first one.
    fn search(&mut self, query: String) {
        let matches = matching_lines(&self.lines, &query);
        let current = (!matches.is_empty()).then(|| {
            matches
                .iter()
                .position(|&line| line >= self.scroll)
                .unwrap_or(0)
        });
        debug!(query = %query, matches = matches.len(), "searching post");
        self.search = ReaderSearch {
            query,
            matches,
            current,
        };
        if let Some(line) = self.search.current_line() {
            self.reveal(line);
        }
    }

    fn clear_search(&mut self) {
        self.search = ReaderSearch::default();
    }

    fn search_step(&mut self, forward: bool, count: usize) -> bool {
        let len = self.search.matches.len();
        if len == 0 {
            return false;
        }
        let steps = count % len;
        let next = match self.search.current {
            Some(current) if forward => (current + steps) % len,
            Some(current) => (current + len - steps) % len,
            None if forward => 0,
            None => len - 1,
        };
        self.search.current = Some(next);
        let line = self.search.matches[next];
        self.reveal(line);
        true
    }

    fn is_heading_line(&self, line: usize) -> bool {
        self.headings.iter().any(|located| located.line == line)
    }

    fn line_of(&self, id: &str) -> Option<usize> {
        self.headings
            .iter()
            .find(|located| located.heading.id == id)
            .map(|located| located.line)
    }
}

async fn run_read(file: &Path) -> Result<()> {
    let post = load_post(file).await?;
    info!(slug = %post.metadata.slug, headings = post.headings.len(), "opening reader");
    let mut reader = Reader::new(post);

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut painter = Painter::new(stdout);
    let mut event_mapper = EventMapper::new();
    let mut dirty = true;
    let mut needs_clear = true;

    loop {
        if reader.outline.is_focused() {
            event_mapper.set_mode(InputMode::Toc);
        } else if event_mapper.mode() == InputMode::Toc {
            event_mapper.set_mode(InputMode::Normal);
        }

        if dirty {
            if needs_clear {
                painter.clear_all()?;
                needs_clear = false;
            }
            let pending = event_mapper.pending_input();
            draw_reader(&mut painter, &mut reader, pending.as_deref())?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            if matches!(ev, Event::Resize(..)) {
                needs_clear = true;
                dirty = true;
                continue;
            }
            let had_pending = event_mapper.pending_input().is_some();
            let ui_event = event_mapper.map_event(ev);
            match handle_reader_event(ui_event, &mut reader) {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {
                    // pending numeric prefix shows up in the footer
                    dirty = had_pending || event_mapper.pending_input().is_some();
                }
                LoopAction::Quit => break,
            }
        }
    }

    painter.clear_all()?;
    Ok(())
}

fn handle_reader_event(event: UiEvent, reader: &mut Reader) -> LoopAction {
    let changed = match event {
        UiEvent::Quit => return LoopAction::Quit,
        UiEvent::Scroll { lines } => reader.scroll_by(lines),
        UiEvent::NextPage { count } => {
            reader.scroll_by((count * reader.viewport_height) as isize)
        }
        UiEvent::PrevPage { count } => {
            reader.scroll_by(-((count * reader.viewport_height) as isize))
        }
        UiEvent::GotoPage { page } => reader.goto_page(page),
        UiEvent::ToggleOutline => {
            if reader.outline.is_empty() {
                return LoopAction::Continue;
            }
            reader.outline.set_focused(true);
            true
        }
        UiEvent::CloseOverlay => {
            reader.outline.set_focused(false);
            true
        }
        UiEvent::OutlineMoveSelection { delta } => reader.outline.move_selection(delta),
        UiEvent::OutlineToggleSection => reader.outline.toggle_selected(),
        UiEvent::OutlineActivateSelection => {
            let target = reader
                .outline
                .selected_line()
                .and_then(|line| reader.line_of(&line.id));
            reader.outline.set_focused(false);
            if let Some(line) = target {
                reader.scroll_to(line);
            }
            true
        }
        UiEvent::BeginSearch | UiEvent::SearchCancel => {
            reader.clear_search();
            true
        }
        UiEvent::SearchQueryChanged { query } | UiEvent::SearchSubmit { query } => {
            reader.search(query);
            true
        }
        UiEvent::SearchNext { count } => reader.search_step(true, count),
        UiEvent::SearchPrev { count } => reader.search_step(false, count),
        UiEvent::ToggleTimer | UiEvent::ResetTimer | UiEvent::None => false,
    };
    if changed {
        LoopAction::ContinueRedraw
    } else {
        LoopAction::Continue
    }
}

fn draw_reader<W: Write>(
    painter: &mut Painter<W>,
    reader: &mut Reader,
    pending: Option<&str>,
) -> Result<()> {
    let (cols, rows) = terminal::size()?;
    let cols = cols as usize;
    reader.set_viewport_height((rows as usize).saturating_sub(2));

    let outline_width = if reader.outline.is_empty() || cols < 60 {
        0
    } else {
        (cols / 3).min(36)
    };
    let text_width = cols.saturating_sub(outline_width + 1).max(1);

    painter.begin_sync_update()?;

    painter.move_to(0, 0)?;
    crossterm::queue!(
        painter.writer(),
        SetAttribute(Attribute::Bold),
        Print(truncate(&reader.title, cols)),
        SetAttribute(Attribute::Reset)
    )?;

    for row in 0..reader.viewport_height {
        let index = reader.scroll + row;
        painter.move_to(0, (row + 1) as u16)?;
        let Some(line) = reader.lines.get(index) else {
            continue;
        };
        let text = truncate(line, text_width);
        let style = if reader.search.current_line() == Some(index) {
            Some(Attribute::Reverse)
        } else if reader.search.is_match(index) {
            Some(Attribute::Underlined)
        } else if reader.is_heading_line(index) {
            Some(Attribute::Bold)
        } else {
            None
        };
        match style {
            Some(attribute) => crossterm::queue!(
                painter.writer(),
                SetAttribute(attribute),
                Print(text),
                SetAttribute(Attribute::Reset)
            )?,
            None => crossterm::queue!(painter.writer(), Print(text))?,
        }
    }

    if outline_width > 0 {
        reader.outline.ensure_visible(reader.viewport_height);
        painter.draw_outline(
            &reader.outline,
            (text_width + 1) as u16,
            1,
            reader.viewport_height,
            outline_width,
        )?;
    }

    let footer_row = rows.saturating_sub(1);
    painter.move_to(0, footer_row)?;
    let plan = PaginationPlan::from(reader.pagination()?);
    painter.draw_pagination_bar(&plan)?;
    let mut status = format!(
        "  line {}/{}",
        (reader.scroll + 1).min(reader.lines.len().max(1)),
        reader.lines.len()
    );
    if let Some(active) = reader.tracker.current() {
        status.push_str(&format!("  § {}", active));
    }
    // while typing a query the pending input already shows it
    match pending {
        Some(pending) => status.push_str(&format!("  {}", pending)),
        None if !reader.search.query.is_empty() => {
            status.push_str(&format!("  /{}", reader.search.query))
        }
        None => {}
    }
    if let Some(counter) = reader.search.counter() {
        status.push_str(&format!(" {}", counter));
    }
    write_status_line(painter.writer(), &status)?;

    painter.end_sync_update()?;
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn run_stopwatch(config: &SiteConfig) -> Result<()> {
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new()?);
    let stopwatch = StopwatchController::new(scheduler, config.stopwatch.clone());

    let (redraw_tx, mut redraw_rx) = mpsc::unbounded_channel::<()>();
    let _subscriptions: Vec<Subscription> = [
        StopwatchEventKind::Started,
        StopwatchEventKind::Stopped,
        StopwatchEventKind::Reset,
        StopwatchEventKind::Tick,
    ]
    .into_iter()
    .map(|kind| {
        let redraw_tx = redraw_tx.clone();
        stopwatch.events().subscribe(kind, move |_| {
            let _ = redraw_tx.send(());
        })
    })
    .collect();

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut painter = Painter::new(stdout);
    painter.clear_all()?;
    let mut event_mapper = EventMapper::new();
    let mut dirty = true;

    loop {
        while redraw_rx.try_recv().is_ok() {
            dirty = true;
        }

        if dirty {
            painter.begin_sync_update()?;
            painter.move_to(0, 0)?;
            painter.draw_stopwatch(
                stopwatch.seconds(),
                stopwatch.options().max_seconds,
                stopwatch.arm_rotation_degrees(),
            )?;
            painter.move_to(0, 2)?;
            let state = if stopwatch.is_running() { "running" } else { "stopped" };
            write_status_line(
                painter.writer(),
                &format!("{}  space start/stop  r reset  q quit", state),
            )?;
            painter.end_sync_update()?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(20))? {
            match event_mapper.map_event(event::read()?) {
                UiEvent::ToggleTimer => {
                    if !stopwatch.start() {
                        stopwatch.stop();
                    }
                }
                UiEvent::ResetTimer => stopwatch.reset(),
                UiEvent::Quit => break,
                _ => {}
            }
        }
    }

    stopwatch.stop();
    painter.clear_all()?;
    Ok(())
}

async fn run_typewriter(config: &SiteConfig, texts: Vec<String>, cycles: Option<u64>) -> Result<()> {
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new()?);
    let typewriter = Typewriter::new(&texts, scheduler, config.typewriter.clone())?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TypewriterEvent>();
    let _subscriptions: Vec<Subscription> = [
        TypewriterEventKind::TextChanged,
        TypewriterEventKind::TextCompleted,
    ]
    .into_iter()
    .map(|kind| {
        let event_tx = event_tx.clone();
        typewriter.events().subscribe(kind, move |event| {
            let _ = event_tx.send(event.clone());
        })
    })
    .collect();
    drop(event_tx);

    let mut stdout = io::stdout();
    let mut finished = 0;
    typewriter.start();
    while let Some(event) = event_rx.recv().await {
        match event {
            TypewriterEvent::TextChanged(frame) => {
                crossterm::queue!(
                    stdout,
                    cursor::MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    Print(&frame)
                )?;
                stdout.flush()?;
            }
            TypewriterEvent::TextCompleted { index } => {
                finished += 1;
                debug!(index, finished, "text completed");
                if cycles.is_some_and(|cycles| finished >= cycles) {
                    break;
                }
            }
        }
    }
    typewriter.stop();
    writeln!(stdout)?;
    Ok(())
}

fn init_logging(project_dirs: Option<&ProjectDirs>, console: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match project_dirs {
        Some(project_dirs) => {
            let log_dir = project_dirs.data_local_dir().join("logs");
            fs::create_dir_all(&log_dir)?;
            let file_appender = tracing_appender::rolling::never(log_dir, "quill.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    // Interactive commands own the terminal; they only log to the file.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
