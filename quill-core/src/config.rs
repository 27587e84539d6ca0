use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::stopwatch::StopwatchOptions;
use crate::typewriter::TypewriterOptions;

pub const CONFIG_FILE_NAME: &str = "quill.toml";

static DEFAULT_NAVIGATION: Lazy<Vec<NavigationLink>> = Lazy::new(|| {
    vec![
        NavigationLink::new("Home", "/"),
        NavigationLink::new("About", "/about"),
        NavigationLink {
            active_prefixes: vec!["/blog".to_string(), "/posts".to_string()],
            ..NavigationLink::new("Blog", "/blog/1")
        },
    ]
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub header_height: String,
    pub posts_per_page: usize,
    pub navigation: Vec<NavigationLink>,
    pub typewriter: TypewriterOptions,
    pub stopwatch: StopwatchOptions,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            header_height: "4rem".to_string(),
            posts_per_page: 6,
            navigation: DEFAULT_NAVIGATION.clone(),
            typewriter: TypewriterOptions::default(),
            stopwatch: StopwatchOptions::default(),
        }
    }
}

impl SiteConfig {
    /// `<platform config dir>/quill.toml`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "quill", "quill")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: SiteConfig =
            toml::from_str(&raw).with_context(|| format!("failed to decode config {:?}", path))?;
        config.validate()?;
        debug!(?path, "loaded site config");
        Ok(config)
    }

    /// Like [`SiteConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.posts_per_page == 0 {
            bail!("posts_per_page must be at least 1");
        }
        if self.stopwatch.tick_interval.is_zero() {
            bail!("stopwatch.tick_interval must be positive");
        }
        Ok(())
    }

    pub fn active_navigation(&self, pathname: &str) -> Option<&NavigationLink> {
        self.navigation.iter().find(|link| link.is_active(pathname))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavigationLink {
    pub title: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub always_active: bool,
    /// When set, the link is active for any path under `href` or one of these.
    #[serde(default)]
    pub active_prefixes: Vec<String>,
}

impl NavigationLink {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: Some(href.into()),
            always_active: false,
            active_prefixes: Vec::new(),
        }
    }

    pub fn is_active(&self, pathname: &str) -> bool {
        if self.always_active {
            return true;
        }
        let Some(href) = self.href.as_deref() else {
            return false;
        };
        if !self.active_prefixes.is_empty() {
            return pathname.starts_with(href)
                || self
                    .active_prefixes
                    .iter()
                    .any(|prefix| pathname.starts_with(prefix.as_str()));
        }
        trim_trailing_slash(href) == trim_trailing_slash(pathname)
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}
