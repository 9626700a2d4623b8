//! Post lifecycle: statuses, the allowed transition graph, and the
//! precondition/postcondition contract of every pipeline stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// The single field that decides which stage acts on a post next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Scraped,
    Processed,
    MediaReady,
    Approved,
    Rejected,
    Published,
    Failed,
}

impl PostStatus {
    pub const ALL: [PostStatus; 7] = [
        PostStatus::Scraped,
        PostStatus::Processed,
        PostStatus::MediaReady,
        PostStatus::Approved,
        PostStatus::Rejected,
        PostStatus::Published,
        PostStatus::Failed,
    ];

    /// Statuses a human reviewer can act on.
    pub const REVIEWABLE: [PostStatus; 2] = [PostStatus::Processed, PostStatus::MediaReady];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Scraped => "scraped",
            PostStatus::Processed => "processed",
            PostStatus::MediaReady => "media_ready",
            PostStatus::Approved => "approved",
            PostStatus::Rejected => "rejected",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_reviewable(self) -> bool {
        Self::REVIEWABLE.contains(&self)
    }

    /// Returns `true` if `self → next` is an edge of the lifecycle graph.
    ///
    /// `Failed → Approved` is the manual requeue edge; callers must also check
    /// that the failure came from publishing (see `failed_stage`).
    #[must_use]
    pub fn can_transition_to(self, next: PostStatus) -> bool {
        use PostStatus::{Approved, Failed, MediaReady, Processed, Published, Rejected, Scraped};
        matches!(
            (self, next),
            (Scraped, Processed | Failed)
                | (Processed, MediaReady | Approved | Rejected)
                | (MediaReady, Approved | Rejected)
                | (Approved, Published | Failed)
                | (Failed, Approved)
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

/// Publishing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Instagram, Platform::TikTok];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }

    /// Parse a list of stored platform names, rejecting unknown entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownPlatform`] for the first unknown name.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Platform>, CoreError> {
        let mut platforms = Vec::with_capacity(names.len());
        for name in names {
            let platform = name.as_ref().parse::<Platform>()?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        Ok(platforms)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

/// One pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scrape,
    Process,
    Media,
    Publish,
}

impl Stage {
    /// Execution order within a pass.
    pub const ORDERED: [Stage; 4] = [Stage::Scrape, Stage::Process, Stage::Media, Stage::Publish];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Process => "process",
            Stage::Media => "media",
            Stage::Publish => "publish",
        }
    }

    #[must_use]
    pub fn contract(self) -> StageContract {
        match self {
            Stage::Scrape => StageContract {
                stage: self,
                precondition: None,
                postcondition: PostStatus::Scraped,
            },
            Stage::Process => StageContract {
                stage: self,
                precondition: Some(PostStatus::Scraped),
                postcondition: PostStatus::Processed,
            },
            Stage::Media => StageContract {
                stage: self,
                precondition: Some(PostStatus::Processed),
                postcondition: PostStatus::MediaReady,
            },
            Stage::Publish => StageContract {
                stage: self,
                precondition: Some(PostStatus::Approved),
                postcondition: PostStatus::Published,
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ORDERED
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStage(s.to_string()))
    }
}

/// The status a stage reads and the status it writes.
///
/// `precondition` is `None` only for scraping, which creates rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContract {
    pub stage: Stage,
    pub precondition: Option<PostStatus>,
    pub postcondition: PostStatus,
}

impl StageContract {
    /// Whether this stage may act on a post currently in `status`.
    #[must_use]
    pub fn accepts(&self, status: PostStatus) -> bool {
        self.precondition == Some(status)
    }
}
