//! GitHub webhooks

use axum::http::HeaderMap;
use serde::Deserialize;

use super::{HookParser, Normalized, header_str, parse_json};
use crate::error::Result;
use crate::event::{
    Author, CanonicalEvent, Commit, MergeRequestEvent, Provider, PushEvent, Repository, TagEvent,
};
use crate::utils::verify_github_signature;

#[derive(Debug, Deserialize)]
struct GhOwner {
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhRepository {
    name: String,
    owner: GhOwner,
    #[serde(default)]
    clone_url: Option<String>,
}

impl From<GhRepository> for Repository {
    fn from(repo: GhRepository) -> Self {
        Repository {
            owner: repo.owner.login.or(repo.owner.name).unwrap_or_default(),
            name: repo.name,
            clone_url: repo.clone_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GhAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhCommit {
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: GhAuthor,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

impl From<GhCommit> for Commit {
    fn from(c: GhCommit) -> Self {
        Commit {
            id: c.id,
            message: c.message,
            author: Author {
                name: c.author.name,
                email: c.author.email.unwrap_or_default(),
            },
            added: c.added,
            modified: c.modified,
            removed: c.removed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhPush {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    repository: GhRepository,
    #[serde(default)]
    commits: Vec<GhCommit>,
}

#[derive(Debug, Deserialize)]
struct GhPullRequestEvent {
    action: String,
    pull_request: GhPullRequest,
    repository: GhRepository,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    head: GhBranchRef,
    base: GhBranchRef,
}

#[derive(Debug, Deserialize)]
struct GhBranchRef {
    #[serde(rename = "ref")]
    branch: String,
    #[serde(default)]
    sha: String,
}

pub struct GithubParser;

impl HookParser for GithubParser {
    fn event_header(&self) -> &'static str {
        "X-GitHub-Event"
    }

    fn secret_header(&self) -> &'static str {
        "X-Hub-Signature-256"
    }

    fn parse(&self, event_type: &str, payload: &[u8]) -> Result<Normalized> {
        let event = match event_type {
            // GitHub reports tag pushes as plain push events
            "push" => {
                let push: GhPush = parse_json(event_type, payload)?;
                let commits = push.commits.into_iter().map(Commit::from).collect();
                if push.git_ref.starts_with("refs/tags/") {
                    CanonicalEvent::Tag(TagEvent {
                        provider: Provider::Github,
                        git_ref: push.git_ref,
                        sha: push.after,
                        repository: push.repository.into(),
                        commits,
                    })
                } else {
                    CanonicalEvent::Push(PushEvent {
                        provider: Provider::Github,
                        git_ref: push.git_ref,
                        before: push.before,
                        after: push.after,
                        repository: push.repository.into(),
                        commits,
                    })
                }
            }
            "pull_request" => {
                let pr: GhPullRequestEvent = parse_json(event_type, payload)?;
                CanonicalEvent::MergeRequest(MergeRequestEvent {
                    provider: Provider::Github,
                    action: pr.action,
                    source_branch: pr.pull_request.head.branch,
                    target_branch: pr.pull_request.base.branch,
                    head_sha: pr.pull_request.head.sha,
                    repository: pr.repository.into(),
                })
            }
            other => return Ok(Normalized::NotRecognized(other.to_string())),
        };
        Ok(Normalized::Event(event))
    }

    fn verify(&self, secret: &str, headers: &HeaderMap, payload: &[u8]) -> bool {
        match header_str(headers, self.secret_header()) {
            Some(signature) => verify_github_signature(secret, payload, signature),
            None => false,
        }
    }
}
