//! Provider-agnostic webhook events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source-control providers that can deliver webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codehub,
    Gitlab,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Codehub, Provider::Gitlab, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codehub => "codehub",
            Provider::Gitlab => "gitlab",
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "codehub" => Ok(Provider::Codehub),
            "gitlab" => Ok(Provider::Gitlab),
            "github" => Ok(Provider::Github),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// One commit as delivered in a push payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub author: Author,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub clone_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub provider: Provider,
    /// Full ref, e.g. `refs/heads/main`
    pub git_ref: String,
    pub before: String,
    pub after: String,
    pub repository: Repository,
    /// Chronological, as delivered by the provider
    pub commits: Vec<Commit>,
}

impl PushEvent {
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestEvent {
    pub provider: Provider,
    pub action: String,
    pub source_branch: String,
    pub target_branch: String,
    pub head_sha: String,
    pub repository: Repository,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEvent {
    pub provider: Provider,
    /// Full ref, e.g. `refs/tags/v1.0.0`
    pub git_ref: String,
    pub sha: String,
    pub repository: Repository,
    pub commits: Vec<Commit>,
}

impl TagEvent {
    pub fn tag(&self) -> &str {
        self.git_ref.strip_prefix("refs/tags/").unwrap_or(&self.git_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalEvent {
    Push(PushEvent),
    MergeRequest(MergeRequestEvent),
    Tag(TagEvent),
}

impl CanonicalEvent {
    pub fn provider(&self) -> Provider {
        match self {
            CanonicalEvent::Push(e) => e.provider,
            CanonicalEvent::MergeRequest(e) => e.provider,
            CanonicalEvent::Tag(e) => e.provider,
        }
    }

    pub fn repository(&self) -> &Repository {
        match self {
            CanonicalEvent::Push(e) => &e.repository,
            CanonicalEvent::MergeRequest(e) => &e.repository,
            CanonicalEvent::Tag(e) => &e.repository,
        }
    }

    /// Short label used in logs and job records.
    pub fn kind(&self) -> &'static str {
        match self {
            CanonicalEvent::Push(_) => "push",
            CanonicalEvent::MergeRequest(_) => "merge_request",
            CanonicalEvent::Tag(_) => "tag",
        }
    }

    /// Branch (or tag name) the event refers to.
    pub fn branch(&self) -> &str {
        match self {
            CanonicalEvent::Push(e) => e.branch(),
            CanonicalEvent::MergeRequest(e) => &e.target_branch,
            CanonicalEvent::Tag(e) => e.tag(),
        }
    }

    /// Commit SHA the event points at.
    pub fn head_sha(&self) -> &str {
        match self {
            CanonicalEvent::Push(e) => &e.after,
            CanonicalEvent::MergeRequest(e) => &e.head_sha,
            CanonicalEvent::Tag(e) => &e.sha,
        }
    }
}
