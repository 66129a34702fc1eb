//! Request classification.
//!
//! The rule table is evaluated top to bottom and the first match wins:
//!
//! | Order | Category | Strategy |
//! |---|---|---|
//! | 1 | non-HTTP scheme | pass through |
//! | 2 | never-cache pattern | network only |
//! | 3 | static asset pattern | cache-first |
//! | 4 | boxing image pattern | stale-while-revalidate |
//! | 5 | API pattern | network-first, cache fallback |
//! | 6 | navigation | network-first, offline shell fallback |
//! | 7 | anything else | pass through |
//!
//! Never-cache is checked before anything that could read or write a
//! partition. Non-GET requests that survive it pass through, since only GET
//! responses are ever stored.

use regex::RegexSet;
use ringside_core::{AppConfig, Error, Request};

use crate::partitions::PartitionKind;

/// What kind of request this is, for routing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    NonHttp,
    NeverCache,
    StaticAsset,
    BoxingImage,
    Api,
    Navigation,
    Default,
}

/// How a category is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Straight to the network; the cache is neither read nor written.
    NetworkOnly,
    CacheFirst,
    StaleWhileRevalidate,
    /// Network with a bounded wait, then the category's partition.
    NetworkFirst,
    /// Network with a bounded wait, then any cached copy, then the offline shell.
    NetworkFirstWithShell,
}

impl Category {
    pub fn strategy(self) -> Strategy {
        match self {
            Category::NonHttp | Category::NeverCache | Category::Default => Strategy::NetworkOnly,
            Category::StaticAsset => Strategy::CacheFirst,
            Category::BoxingImage => Strategy::StaleWhileRevalidate,
            Category::Api => Strategy::NetworkFirst,
            Category::Navigation => Strategy::NetworkFirstWithShell,
        }
    }

    /// Partition this category reads from and writes to, if any.
    pub fn partition(self) -> Option<PartitionKind> {
        match self {
            Category::StaticAsset => Some(PartitionKind::Static),
            Category::BoxingImage => Some(PartitionKind::Images),
            Category::Api => Some(PartitionKind::Dynamic),
            Category::NonHttp | Category::NeverCache | Category::Navigation | Category::Default => None,
        }
    }
}

/// Compiled classification patterns.
#[derive(Debug, Clone)]
pub struct RuleSet {
    never_cache: RegexSet,
    static_assets: RegexSet,
    images: RegexSet,
    api: RegexSet,
}

fn compile(field: &str, patterns: &[String]) -> Result<RegexSet, Error> {
    RegexSet::new(patterns).map_err(|e| Error::InvalidInput(format!("{field}: {e}")))
}

impl RuleSet {
    pub fn new(
        never_cache: &[String], static_assets: &[String], images: &[String], api: &[String],
    ) -> Result<Self, Error> {
        Ok(Self {
            never_cache: compile("never_cache_patterns", never_cache)?,
            static_assets: compile("static_patterns", static_assets)?,
            images: compile("image_patterns", images)?,
            api: compile("api_patterns", api)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.never_cache_patterns, &config.static_patterns, &config.image_patterns, &config.api_patterns)
    }

    pub fn classify(&self, request: &Request) -> Category {
        if !request.is_http() {
            return Category::NonHttp;
        }

        let url = request.url.as_str();
        if self.never_cache.is_match(url) {
            return Category::NeverCache;
        }
        if !request.is_get() {
            return Category::Default;
        }
        if self.static_assets.is_match(url) {
            Category::StaticAsset
        } else if self.images.is_match(url) {
            Category::BoxingImage
        } else if self.api.is_match(url) {
            Category::Api
        } else if request.is_navigation() {
            Category::Navigation
        } else {
            Category::Default
        }
    }
}
