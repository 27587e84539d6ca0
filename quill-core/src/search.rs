use serde::Serialize;
use tracing::debug;

use crate::content::{Post, PostCollection};

/// Where in a post a search term was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Title,
    Description,
    Tags,
    Body,
}

/// Case-insensitive query split on whitespace. Every term has to appear
/// somewhere in a post for the post to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        Self {
            terms: query.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Fields of `post` holding at least one term, or `None` when some term
    /// is missing from the whole post.
    pub fn match_post(&self, post: &Post) -> Option<Vec<SearchField>> {
        if self.is_empty() {
            return None;
        }
        let data = &post.metadata.data;
        let fields = [
            (SearchField::Title, data.title.to_lowercase()),
            (SearchField::Description, data.description.to_lowercase()),
            (SearchField::Tags, data.tags.join("\n").to_lowercase()),
            (SearchField::Body, post.body.to_lowercase()),
        ];

        let mut matched = Vec::new();
        for term in &self.terms {
            let mut found = false;
            for (field, text) in &fields {
                if text.contains(term.as_str()) {
                    found = true;
                    if !matched.contains(field) {
                        matched.push(*field);
                    }
                }
            }
            if !found {
                return None;
            }
        }
        matched.sort();
        Some(matched)
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub post: &'a Post,
    pub fields: Vec<SearchField>,
}

impl PostCollection {
    /// Posts matching `query`, newest first. A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        let query = SearchQuery::parse(query);
        let hits: Vec<_> = self
            .posts()
            .iter()
            .filter_map(|post| {
                query
                    .match_post(post)
                    .map(|fields| SearchHit { post, fields })
            })
            .collect();
        debug!(terms = ?query.terms(), hits = hits.len(), "searched posts");
        hits
    }
}

/// Indices of the lines containing `query`, ignoring case.
pub fn matching_lines<I, S>(lines: I, query: &str) -> Vec<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    lines
        .into_iter()
        .enumerate()
        .filter(|(_, line)| line.as_ref().to_lowercase().contains(&needle))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::parse_post;

    fn post(slug: &str, created_at: &str, title: &str, tags: &[&str], body: &str) -> Post {
        let tags = tags
            .iter()
            .map(|tag| format!("\"{tag}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let source = format!(
            "+++\ntitle = \"{title}\"\ncreated_at = {created_at}\ndescription = \"Notes on {slug}\"\ntags = [{tags}]\n+++\n{body}"
        );
        parse_post(slug, &source).unwrap()
    }

    fn collection() -> PostCollection {
        PostCollection::new(
            vec![
                post("tokio", "2024-01-01", "Async Rust", &["rust", "async"], "Timers and tasks.\n"),
                post("serde", "2024-02-01", "Serializing", &["rust"], "Derive all the things.\n"),
                post("css", "2024-03-01", "Styling", &["web"], "Grid and flexbox, no Rust.\n"),
            ],
            5,
        )
        .unwrap()
    }

    fn slugs(hits: &[SearchHit<'_>]) -> Vec<String> {
        hits.iter().map(|hit| hit.post.metadata.slug.clone()).collect()
    }

    #[test]
    fn finds_terms_in_every_field() {
        let posts = collection();
        let hits = posts.search("RUST");
        assert_eq!(slugs(&hits), vec!["css", "serde", "tokio"]);
        assert_eq!(hits[0].fields, vec![SearchField::Body]);
        assert_eq!(hits[1].fields, vec![SearchField::Tags]);
        assert_eq!(hits[2].fields, vec![SearchField::Title, SearchField::Tags]);

        let hits = posts.search("notes on serde");
        assert_eq!(slugs(&hits), vec!["serde"]);
        assert_eq!(hits[0].fields, vec![SearchField::Description]);
    }

    #[test]
    fn every_term_has_to_match() {
        let posts = collection();
        assert_eq!(slugs(&posts.search("rust timers")), vec!["tokio"]);
        assert!(posts.search("rust kotlin").is_empty());
    }

    #[test]
    fn blank_query_matches_nothing() {
        assert!(collection().search("  ").is_empty());
        assert!(SearchQuery::parse("\t").is_empty());
    }

    #[test]
    fn finds_matching_lines() {
        let lines = ["## Install", "Run cargo install.", "", "## Usage"];
        assert_eq!(matching_lines(lines, "INSTALL"), vec![0, 1]);
        assert_eq!(matching_lines(lines, "cargo install"), vec![1]);
        assert!(matching_lines(lines, " ").is_empty());
    }
}
