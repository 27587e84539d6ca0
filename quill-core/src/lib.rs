//! Core models for the quill site tools: the pagination planner, the
//! heading outline with its scroll-spy tracker, timer-driven widgets and
//! the searchable blog post collection.

pub mod config;
pub mod content;
pub mod events;
pub mod outline;
pub mod pagination;
pub mod schedule;
pub mod search;
pub mod stopwatch;
pub mod typewriter;

pub use config::{NavigationLink, SiteConfig};
pub use content::{
    BlogPostData, BlogPostMetadata, ContentError, DirectoryPostSource, LocatedHeading, Post,
    PostCollection, PostPage, PostSource,
};
pub use events::{BusEvent, EventBus, Subscription};
pub use outline::{
    build_sections, ActiveSectionTracker, Heading, OutlineEvent, OutlineEventKind, SectionNode,
    VisibilityBatch,
};
pub use pagination::{PageSlot, PaginationError, PaginationPlan, PaginationState};
pub use schedule::{ManualScheduler, Scheduler, TaskHandle, TokioScheduler};
pub use search::{matching_lines, SearchField, SearchHit, SearchQuery};
pub use stopwatch::{StopwatchController, StopwatchEvent, StopwatchEventKind, StopwatchOptions};
pub use typewriter::{
    Typewriter, TypewriterError, TypewriterEvent, TypewriterEventKind, TypewriterOptions,
};
