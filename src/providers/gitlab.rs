//! GitLab webhook payloads. CodeHub reuses the same JSON shape.

use serde::Deserialize;

use super::{HookParser, Normalized, parse_json};
use crate::error::Result;
use crate::event::{
    Author, CanonicalEvent, Commit, MergeRequestEvent, Provider, PushEvent, Repository, TagEvent,
};

pub const PUSH_HOOK: &str = "Push Hook";
pub const TAG_PUSH_HOOK: &str = "Tag Push Hook";
pub const MERGE_REQUEST_HOOK: &str = "Merge Request Hook";

#[derive(Debug, Deserialize)]
struct HookProject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    path_with_namespace: Option<String>,
    #[serde(default)]
    git_http_url: Option<String>,
}

impl HookProject {
    fn into_repository(self) -> Repository {
        // path_with_namespace is authoritative when present ("group/sub/repo")
        let (owner, name) = match self.path_with_namespace.as_deref().and_then(|p| p.rsplit_once('/')) {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => (self.namespace, self.name),
        };
        Repository {
            owner,
            name,
            clone_url: self.git_http_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HookAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct HookCommit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: HookAuthor,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

impl From<HookCommit> for Commit {
    fn from(c: HookCommit) -> Self {
        Commit {
            id: c.id,
            message: c.message,
            author: Author {
                name: c.author.name,
                email: c.author.email,
            },
            added: c.added,
            modified: c.modified,
            removed: c.removed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushHook {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    #[serde(default)]
    checkout_sha: Option<String>,
    project: HookProject,
    #[serde(default)]
    commits: Vec<HookCommit>,
}

#[derive(Debug, Deserialize)]
struct MergeRequestHook {
    object_attributes: MergeRequestAttributes,
    project: HookProject,
}

#[derive(Debug, Deserialize)]
struct MergeRequestAttributes {
    #[serde(default)]
    action: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    last_commit: Option<LastCommit>,
}

#[derive(Debug, Deserialize)]
struct LastCommit {
    id: String,
}

/// Parse a GitLab-shaped payload, tagging the result with `provider`.
pub(crate) fn parse_gitlab_style(
    provider: Provider,
    event_type: &str,
    payload: &[u8],
) -> Result<Normalized> {
    let event = match event_type {
        PUSH_HOOK => {
            let hook: PushHook = parse_json(event_type, payload)?;
            CanonicalEvent::Push(PushEvent {
                provider,
                git_ref: hook.git_ref,
                before: hook.before,
                after: hook.after,
                repository: hook.project.into_repository(),
                commits: hook.commits.into_iter().map(Commit::from).collect(),
            })
        }
        TAG_PUSH_HOOK => {
            let hook: PushHook = parse_json(event_type, payload)?;
            let sha = hook.checkout_sha.unwrap_or(hook.after);
            CanonicalEvent::Tag(TagEvent {
                provider,
                git_ref: hook.git_ref,
                sha,
                repository: hook.project.into_repository(),
                commits: hook.commits.into_iter().map(Commit::from).collect(),
            })
        }
        MERGE_REQUEST_HOOK => {
            let hook: MergeRequestHook = parse_json(event_type, payload)?;
            let attrs = hook.object_attributes;
            CanonicalEvent::MergeRequest(MergeRequestEvent {
                provider,
                action: attrs.action,
                source_branch: attrs.source_branch,
                target_branch: attrs.target_branch,
                head_sha: attrs.last_commit.map(|c| c.id).unwrap_or_default(),
                repository: hook.project.into_repository(),
            })
        }
        other => return Ok(Normalized::NotRecognized(other.to_string())),
    };
    Ok(Normalized::Event(event))
}

pub struct GitlabParser;

impl HookParser for GitlabParser {
    fn event_header(&self) -> &'static str {
        "X-Gitlab-Event"
    }

    fn secret_header(&self) -> &'static str {
        "X-Gitlab-Token"
    }

    fn parse(&self, event_type: &str, payload: &[u8]) -> Result<Normalized> {
        parse_gitlab_style(Provider::Gitlab, event_type, payload)
    }
}
