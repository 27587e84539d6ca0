use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::outline::Heading;
use crate::pagination::{PaginationError, PaginationState};

const FRONT_MATTER_FENCE: &str = "+++";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("post does not start with a `+++` front matter block")]
    MissingFrontMatter,
    #[error("front matter block is not closed with `+++`")]
    UnterminatedFrontMatter,
    #[error("invalid front matter: {0}")]
    InvalidFrontMatter(#[from] toml::de::Error),
    #[error("posts per page must be at least 1")]
    InvalidPageSize,
}

/// Front matter of a blog post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlogPostData {
    pub title: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub created_at: NaiveDate,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub updated_at: Option<NaiveDate>,
    pub description: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogPostMetadata {
    pub slug: String,
    #[serde(flatten)]
    pub data: BlogPostData,
}

impl BlogPostMetadata {
    pub fn href(&self) -> String {
        post_href(&self.slug)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub metadata: BlogPostMetadata,
    pub body: String,
    pub headings: Vec<Heading>,
}

pub fn post_href(slug: &str) -> String {
    format!("/{}", slug)
}

pub fn blog_page_href(page: usize) -> String {
    format!("/blog/{}", page)
}

/// Parses a Markdown post with a TOML front matter block.
pub fn parse_post(slug: &str, source: &str) -> Result<Post, ContentError> {
    let (front_matter, body) = split_front_matter(source)?;
    let data: BlogPostData = toml::from_str(front_matter)?;
    Ok(Post {
        metadata: BlogPostMetadata {
            slug: slug.to_string(),
            data,
        },
        headings: extract_headings(body),
        body: body.to_string(),
    })
}

fn split_front_matter(source: &str) -> Result<(&str, &str), ContentError> {
    let source = source.trim_start_matches('\u{feff}');
    let mut lines = source.split_inclusive('\n');
    match lines.next() {
        Some(line) if line.trim_end() == FRONT_MATTER_FENCE => {}
        _ => return Err(ContentError::MissingFrontMatter),
    }

    let start = source.find('\n').map(|idx| idx + 1).unwrap_or(source.len());
    let mut offset = start;
    for line in lines {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let body = &source[offset + line.len()..];
            return Ok((&source[start..offset], body));
        }
        offset += line.len();
    }
    Err(ContentError::UnterminatedFrontMatter)
}

/// A heading together with the zero-based body line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedHeading {
    pub heading: Heading,
    pub line: usize,
}

/// Collects every heading of a Markdown document in document order. Ids
/// come from an explicit `{#id}` attribute or are slugged from the text.
pub fn extract_headings(markdown: &str) -> Vec<Heading> {
    locate_headings(markdown)
        .into_iter()
        .map(|located| located.heading)
        .collect()
}

pub fn locate_headings(markdown: &str) -> Vec<LocatedHeading> {
    let parser = Parser::new_ext(markdown, Options::ENABLE_HEADING_ATTRIBUTES);
    let mut slugger = Slugger::default();
    let mut headings = Vec::new();
    let mut current: Option<(u8, Option<String>, String, usize)> = None;

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, id, .. }) => {
                let line = markdown[..range.start].matches('\n').count();
                current = Some((
                    level as u8,
                    id.map(|id| id.to_string()),
                    String::new(),
                    line,
                ));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, buffer, _)) = current.as_mut() {
                    buffer.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, _, buffer, _)) = current.as_mut() {
                    buffer.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((depth, explicit_id, text, line)) = current.take() {
                    let text = text.trim().to_string();
                    let id = match explicit_id {
                        Some(id) => slugger.reserve(id),
                        None => slugger.slug(&text),
                    };
                    headings.push(LocatedHeading {
                        heading: Heading { id, text, depth },
                        line,
                    });
                }
            }
            _ => {}
        }
    }

    headings
}

/// GitHub-style heading slugs, unique within one document.
#[derive(Debug, Default)]
pub struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub fn slug(&mut self, text: &str) -> String {
        let base: String = text
            .trim()
            .to_lowercase()
            .chars()
            .filter_map(|ch| match ch {
                ' ' => Some('-'),
                '-' | '_' => Some(ch),
                ch if ch.is_alphanumeric() => Some(ch),
                _ => None,
            })
            .collect();
        self.reserve(base)
    }

    fn reserve(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        while let Some(count) = self.seen.get_mut(&candidate) {
            *count += 1;
            candidate = format!("{}-{}", base, count);
        }
        self.seen.insert(candidate.clone(), 0);
        candidate
    }
}

/// Somewhere posts can be loaded from.
#[async_trait::async_trait]
pub trait PostSource: Send + Sync {
    async fn load_posts(&self) -> Result<Vec<Post>>;
}

/// Loads every `*.md` file of a directory; the file stem is the slug.
pub struct DirectoryPostSource {
    root: PathBuf,
}

impl DirectoryPostSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl PostSource for DirectoryPostSource {
    #[instrument(skip(self))]
    async fn load_posts(&self) -> Result<Vec<Post>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("failed to read posts directory {:?}", self.root))?;
        let mut posts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let source = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read post {:?}", path))?;
            let post =
                parse_post(slug, &source).with_context(|| format!("failed to parse {:?}", path))?;
            debug!(slug, headings = post.headings.len(), root = ?self.root, "loaded post");
            posts.push(post);
        }
        Ok(posts)
    }
}

/// Posts ordered newest first, served in fixed-size pages.
#[derive(Debug, Clone)]
pub struct PostCollection {
    posts: Vec<Post>,
    per_page: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PostPage<'a> {
    pub posts: &'a [Post],
    pub pagination: PaginationState,
}

impl PostCollection {
    pub fn new(mut posts: Vec<Post>, per_page: usize) -> Result<Self, ContentError> {
        if per_page == 0 {
            return Err(ContentError::InvalidPageSize);
        }
        posts.sort_by(|a, b| {
            b.metadata
                .data
                .created_at
                .cmp(&a.metadata.data.created_at)
                .then_with(|| a.metadata.slug.cmp(&b.metadata.slug))
        });
        Ok(Self { posts, per_page })
    }

    pub async fn load<S: PostSource + ?Sized>(source: &S, per_page: usize) -> Result<Self> {
        let posts = source.load_posts().await?;
        Ok(Self::new(posts, per_page)?)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn get(&self, slug: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.metadata.slug == slug)
    }

    /// At least one page, even for an empty collection.
    pub fn num_pages(&self) -> usize {
        self.posts.len().div_ceil(self.per_page).max(1)
    }

    pub fn page(&self, page: usize) -> Result<PostPage<'_>, PaginationError> {
        let pagination = PaginationState::new(self.num_pages(), page)?;
        let start = ((page - 1) * self.per_page).min(self.posts.len());
        let end = (start + self.per_page).min(self.posts.len());
        Ok(PostPage {
            posts: &self.posts[start..end],
            pagination,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Toml(toml::value::Datetime),
    Text(String),
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawDate::deserialize(deserializer)?;
    let date = match &raw {
        RawDate::Toml(datetime) => datetime
            .date
            .and_then(|date| {
                NaiveDate::from_ymd_opt(date.year.into(), date.month.into(), date.day.into())
            }),
        RawDate::Text(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok(),
    };
    date.ok_or_else(|| {
        let shown = match raw {
            RawDate::Toml(datetime) => datetime.to_string(),
            RawDate::Text(text) => text,
        };
        serde::de::Error::custom(format!("expected a YYYY-MM-DD date, found `{}`", shown))
    })
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_date(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const POST: &str = r#"+++
title = "Scroll spy"
created_at = 2024-03-01
description = "Tracking the active heading"
tags = ["ui"]
+++

# Scroll spy

Intro.

## Observing headings

### Intersection

## Picking a candidate {#candidate}

## Observing headings
"#;

    fn post(slug: &str, created_at: &str) -> Post {
        let source = format!(
            "+++\ntitle = \"{slug}\"\ncreated_at = {created_at}\ndescription = \"d\"\n+++\nbody\n"
        );
        parse_post(slug, &source).unwrap()
    }

    #[test]
    fn parses_front_matter_and_headings() {
        let post = parse_post("scroll-spy", POST).unwrap();
        let data = &post.metadata.data;
        assert_eq!(data.title, "Scroll spy");
        assert_eq!(data.created_at, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(data.updated_at, None);
        assert_eq!(data.tags, vec!["ui".to_string()]);
        assert_eq!(post.metadata.href(), "/scroll-spy");

        let ids: Vec<_> = post.headings.iter().map(|h| (h.depth, h.id.as_str())).collect();
        assert_eq!(
            ids,
            vec![
                (1, "scroll-spy"),
                (2, "observing-headings"),
                (3, "intersection"),
                (2, "candidate"),
                (2, "observing-headings-1"),
            ]
        );
        assert_eq!(post.headings[3].text, "Picking a candidate");
    }

    #[test]
    fn locates_heading_lines() {
        let markdown = "intro\n\n## First\n\ntext\n\nSetext\n------\n\n```\n## not a heading\n```\n";
        let located: Vec<_> = locate_headings(markdown)
            .into_iter()
            .map(|located| (located.heading.id, located.line))
            .collect();
        assert_eq!(
            located,
            vec![("first".to_string(), 2), ("setext".to_string(), 6)]
        );
    }

    #[test]
    fn accepts_quoted_dates() {
        let source = "+++\ntitle = \"t\"\ncreated_at = \"2023-12-24\"\nupdated_at = 2024-01-02\ndescription = \"d\"\n+++\n";
        let post = parse_post("t", source).unwrap();
        assert_eq!(
            post.metadata.data.updated_at,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn rejects_malformed_front_matter() {
        assert!(matches!(
            parse_post("x", "# no front matter"),
            Err(ContentError::MissingFrontMatter)
        ));
        assert!(matches!(
            parse_post("x", "+++\ntitle = \"t\"\n"),
            Err(ContentError::UnterminatedFrontMatter)
        ));
        assert!(matches!(
            parse_post("x", "+++\ntitle = \"t\"\n+++\n"),
            Err(ContentError::InvalidFrontMatter(_))
        ));
        assert!(matches!(
            parse_post(
                "x",
                "+++\ntitle = \"t\"\ncreated_at = \"yesterday\"\ndescription = \"d\"\n+++\n"
            ),
            Err(ContentError::InvalidFrontMatter(_))
        ));
    }

    #[test]
    fn slugger_follows_github_rules() {
        let mut slugger = Slugger::default();
        assert_eq!(slugger.slug("Hello, World!"), "hello-world");
        assert_eq!(slugger.slug("Hello World"), "hello-world-1");
        assert_eq!(slugger.slug("Hello World"), "hello-world-2");
        assert_eq!(slugger.slug("snake_case & `code`"), "snake_case--code");
    }

    #[test]
    fn collection_pages_newest_first() {
        let posts = vec![
            post("old", "2022-01-01"),
            post("new", "2024-01-01"),
            post("mid-b", "2023-01-01"),
            post("mid-a", "2023-01-01"),
            post("newest", "2025-01-01"),
        ];
        let collection = PostCollection::new(posts, 2).unwrap();
        assert_eq!(collection.num_pages(), 3);

        let first = collection.page(1).unwrap();
        let slugs: Vec<_> = first.posts.iter().map(|p| p.metadata.slug.as_str()).collect();
        assert_eq!(slugs, vec!["newest", "new"]);
        assert_eq!(first.pagination.previous_target(), None);

        let second = collection.page(2).unwrap();
        let slugs: Vec<_> = second.posts.iter().map(|p| p.metadata.slug.as_str()).collect();
        assert_eq!(slugs, vec!["mid-a", "mid-b"]);

        let last = collection.page(3).unwrap();
        assert_eq!(last.posts.len(), 1);
        assert_eq!(last.pagination.next_target(), None);

        assert!(collection.page(4).is_err());
        assert!(collection.page(0).is_err());
    }

    #[test]
    fn empty_collection_has_one_page() {
        let collection = PostCollection::new(Vec::new(), 6).unwrap();
        assert_eq!(collection.num_pages(), 1);
        assert!(collection.page(1).unwrap().posts.is_empty());
        assert!(matches!(
            PostCollection::new(Vec::new(), 0),
            Err(ContentError::InvalidPageSize)
        ));
    }

    #[tokio::test]
    async fn directory_source_loads_markdown_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("scroll-spy.md"), POST).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectoryPostSource::new(dir.path());
        let collection = PostCollection::load(&source, 6).await.unwrap();
        assert_eq!(collection.len(), 1);
        assert!(collection.get("scroll-spy").is_some());
    }

    #[tokio::test]
    async fn directory_source_reports_broken_posts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.md"), "no front matter").unwrap();
        let source = DirectoryPostSource::new(dir.path());
        let err = source.load_posts().await.unwrap_err();
        assert!(format!("{:#}", err).contains("front matter"));
    }

    #[test]
    fn page_links() {
        assert_eq!(blog_page_href(3), "/blog/3");
        assert_eq!(post_href("hello"), "/hello");
    }
}
