//! Provider client backed by the git CLI

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::sync::ProviderClient;
use crate::template::{CommitWatermark, PathType, SourceLocation, TemplateContent};
use crate::utils::run_git;

const MANIFEST_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
const YAML_SEPARATOR: &str = "\n---\n";

/// Talks to any HTTPS git remote through `git ls-remote` and shallow clones.
pub struct GitCliClient {
    access_token: Option<String>,
    work_dir: Option<PathBuf>,
}

impl GitCliClient {
    pub fn new(access_token: Option<String>, work_dir: Option<PathBuf>) -> Self {
        Self {
            access_token,
            work_dir,
        }
    }

    /// Clone URL with the access token embedded, if one is configured.
    fn remote_url(&self, location: &SourceLocation) -> String {
        let url = location.clone_url();
        match (&self.access_token, url.split_once("://")) {
            (Some(token), Some((scheme, rest))) if !token.is_empty() => {
                format!("{}://oauth2:{}@{}", scheme, token, rest)
            }
            _ => url,
        }
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("template-sync-");
            b
        };
        match &self.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(builder.tempdir_in(dir)?)
            }
            None => Ok(builder.tempdir()?),
        }
    }
}

#[async_trait]
impl ProviderClient for GitCliClient {
    async fn latest_commit(&self, location: &SourceLocation) -> Result<CommitWatermark> {
        let remote = self.remote_url(location);
        let head = format!("refs/heads/{}", location.branch);
        let stdout = run_git(None, &["ls-remote", &remote, &head]).await?;
        let sha = parse_ls_remote(&stdout, &head).ok_or_else(|| SyncError::ProviderQuery {
            operation: "git ls-remote".into(),
            message: format!("branch {} not found in {}/{}", location.branch, location.owner, location.repo),
        })?;
        debug!("Latest commit of {} is {}", location, sha);

        Ok(CommitWatermark {
            sha,
            message: None,
            author: None,
            committed_at: None,
        })
    }

    async fn fetch_content(&self, location: &SourceLocation) -> Result<TemplateContent> {
        let scratch = self.scratch_dir()?;
        let checkout = scratch.path().join("repo");
        let checkout_str = checkout.to_string_lossy().to_string();
        let remote = self.remote_url(location);

        info!("Cloning {}/{}@{}", location.owner, location.repo, location.branch);
        run_git(
            None,
            &[
                "clone",
                "--depth",
                "1",
                "--single-branch",
                "--branch",
                &location.branch,
                &remote,
                &checkout_str,
            ],
        )
        .await?;

        let path = location.path.clone();
        let path_type = location.path_type;
        // scratch is removed when dropped at the end of this call
        tokio::task::spawn_blocking(move || collect_manifests(&checkout, &path, path_type))
            .await
            .map_err(|e| SyncError::Internal(format!("manifest collection panicked: {}", e)))?
    }
}

/// SHA for `head` in `git ls-remote` output.
fn parse_ls_remote(stdout: &str, head: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (sha, name) = line.split_once('\t')?;
        (name.trim() == head).then(|| sha.trim().to_string())
    })
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
}

/// Read the manifests under `sub_path` of a checkout, sorted by path.
fn collect_manifests(root: &Path, sub_path: &str, path_type: PathType) -> Result<TemplateContent> {
    let target = root.join(sub_path.trim_matches('/'));
    if !target.exists() {
        return Err(SyncError::ProviderQuery {
            operation: "read manifests".into(),
            message: format!("path '{}' does not exist in the repository", sub_path),
        });
    }

    let mut files = Vec::new();
    match path_type {
        PathType::Blob => files.push(target),
        PathType::Tree => walk(&target, &mut files)?,
    }
    files.sort();

    let mut docs = Vec::new();
    let mut names = Vec::new();
    for file in files {
        let body = std::fs::read_to_string(&file)?;
        let rel = file.strip_prefix(root).unwrap_or(&file);
        names.push(rel.to_string_lossy().replace('\\', "/"));
        docs.push(body.trim().to_string());
    }

    Ok(TemplateContent {
        yaml: docs.join(YAML_SEPARATOR),
        files: names,
    })
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        if path.is_dir() {
            walk(&path, out)?;
        } else if is_manifest(&path) {
            out.push(path);
        }
    }
    Ok(())
}
