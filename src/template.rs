//! Service templates and the source locations they track

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SyncError;
use crate::event::Provider;

/// Deploy type of templates synchronized from webhooks by default.
pub const K8S_DEPLOY_TYPE: &str = "k8s";

/// `created_by` recorded on revisions produced by a webhook sync.
pub const SYSTEM_CREATOR: &str = "system";

/// Last commit a template was synchronized to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitWatermark {
    pub sha: String,
    pub message: Option<String>,
    pub author: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContent {
    /// All manifests joined with `---` separators
    pub yaml: String,
    /// Paths (relative to the repository root) the yaml was assembled from
    pub files: Vec<String>,
}

/// Stored definition of one deployable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTemplate {
    pub service_name: String,
    pub product_name: String,
    pub deploy_type: String,
    pub source: Provider,
    /// e.g. `https://codehub.example.com/team/repo/tree/main/deploy/api`
    pub src_path: String,
    pub revision: i64,
    /// `None` until the first successful sync
    pub commit: Option<CommitWatermark>,
    pub content: TemplateContent,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
}

impl ServiceTemplate {
    pub fn new(
        service_name: impl Into<String>,
        product_name: impl Into<String>,
        source: Provider,
        src_path: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            product_name: product_name.into(),
            deploy_type: K8S_DEPLOY_TYPE.to_string(),
            source,
            src_path: src_path.into(),
            revision: 1,
            commit: None,
            content: TemplateContent::default(),
            created_by: created_by.into(),
            updated_at: Utc::now(),
        }
    }

    /// SHA of the watermark, or `""` if never synced.
    pub fn commit_sha(&self) -> &str {
        self.commit.as_ref().map(|c| c.sha.as_str()).unwrap_or("")
    }

    pub fn location(&self) -> Result<SourceLocation, SyncError> {
        SourceLocation::parse(&self.src_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    /// A directory
    Tree,
    /// A single file
    Blob,
}

/// Parsed view of a template's `src_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// `scheme://host`
    pub address: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Path inside the repository; empty for the repository root
    pub path: String,
    pub path_type: PathType,
}

impl SourceLocation {
    /// Parse `scheme://host/owner/repo/{tree|blob}/branch/path...`.
    ///
    /// GitLab's `/-/` separator is accepted and dropped. A repository root
    /// needs the trailing slash: `.../tree/main/`.
    pub fn parse(src_path: &str) -> Result<Self, SyncError> {
        let invalid = |message: &str| SyncError::SourceLocation {
            src_path: src_path.to_string(),
            message: message.to_string(),
        };

        if !(src_path.starts_with("https://") || src_path.starts_with("http://")) {
            return Err(invalid("url must start with http:// or https://"));
        }

        let mut segments: Vec<&str> = src_path.split('/').collect();
        // GitLab puts a lone `-` between the repository and tree/blob
        if segments.get(5) == Some(&"-") {
            segments.remove(5);
        }
        if segments.len() < 8 {
            return Err(invalid("url is too short"));
        }

        let path_type = match segments[5] {
            "tree" => PathType::Tree,
            "blob" => PathType::Blob,
            _ => return Err(invalid("expected /tree/ or /blob/ after the repository")),
        };

        let (host, owner, repo, branch) = (segments[2], segments[3], segments[4], segments[6]);
        if host.is_empty() || owner.is_empty() || repo.is_empty() || branch.is_empty() {
            return Err(invalid("host, owner, repository and branch must be non-empty"));
        }

        Ok(Self {
            address: format!("{}//{}", segments[0], host),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            path: segments[7..].join("/"),
            path_type,
        })
    }

    /// Plain clone URL, without credentials.
    pub fn clone_url(&self) -> String {
        format!("{}/{}/{}.git", self.address, self.owner, self.repo)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}:{}",
            self.owner, self.repo, self.branch, self.path
        )
    }
}
