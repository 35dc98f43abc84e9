use axum::http::HeaderMap;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::SyncError;
use crate::WorkflowConfig;

// For signature verification
use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
type HmacSha256 = Hmac<Sha256>;

/// Helper function for verifying GitHub webhook signature
pub fn verify_github_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    // Expected format: "sha256=..."
    let Some(git_signature) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // GitHub provides the signature as hex
    match hex_decode(git_signature) {
        Ok(git_signature_bytes) => mac.verify_slice(&git_signature_bytes).is_ok(),
        Err(_) => {
            error!("Signature verification failed: signature is not valid hex");
            false
        }
    }
}

/// Produce the `X-Hub-Signature-256` value GitHub would send for `payload`.
pub fn sign_github_payload(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Byte-for-byte comparison of a token header against the configured secret.
pub fn verify_token(secret: &str, token: &str) -> bool {
    secret.as_bytes() == token.as_bytes()
}

/// Build `{proto}://{host}` from the forwarding headers set by the ingress.
pub fn forwarded_base_uri(headers: &HeaderMap) -> String {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    };
    format!("{}://{}", get("X-Forwarded-Proto"), get("X-Forwarded-Host"))
}

/// Workflows configured for this repository, branch and event kind.
pub fn matching_workflows<'a>(
    workflows: &'a [WorkflowConfig],
    repo_name: &'a str,
    branch: &'a str,
    event_kind: &'a str,
) -> impl Iterator<Item = &'a WorkflowConfig> + 'a {
    workflows.iter().filter(move |wf| {
        wf.repo == repo_name && wf.branches.iter().any(|b| b == branch) && wf.handles(event_kind)
    })
}

/// Run a git subcommand and return its stdout.
pub async fn run_git(cwd: Option<&Path>, args: &[&str]) -> Result<String, SyncError> {
    // subcommand name, used in logs and errors
    let operation = format!("git {}", args.first().copied().unwrap_or(""));
    debug!("Running (cwd = {:?}): {}", cwd, operation);

    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    // never block on a credential prompt
    cmd.env("GIT_TERMINAL_PROMPT", "0").args(args);

    let output = cmd.output().await.map_err(|e| {
        error!("{} failed to start: {}", operation, e);
        SyncError::ProviderQuery {
            operation: operation.clone(),
            message: format!("failed to start: {}", e),
        }
    })?;

    if !output.status.success() {
        let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("{} failed: {}", operation, message);
        return Err(SyncError::ProviderQuery { operation, message });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn signature_round_trip_and_tamper() {
        let sig = sign_github_payload("k", b"payload").unwrap();
        assert!(verify_github_signature("k", b"payload", &sig));
        assert!(!verify_github_signature("k", b"payload!", &sig));
        assert!(!verify_github_signature("k", b"payload", "sha1=abcd"));
        assert!(!verify_github_signature("k", b"payload", "sha256=zz"));
    }

    #[test]
    fn base_uri_from_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-Proto", HeaderValue::from_static("https"));
        headers.insert("X-Forwarded-Host", HeaderValue::from_static("cd.example.com"));
        assert_eq!(forwarded_base_uri(&headers), "https://cd.example.com");
        assert_eq!(forwarded_base_uri(&HeaderMap::new()), "://");
    }

    #[test]
    fn workflows_match_repo_branch_and_kind() {
        let wf = |name: &str, events: &[&str]| WorkflowConfig {
            name: name.into(),
            repo: "shop".into(),
            branches: vec!["main".into()],
            run_script: "./deploy.sh".into(),
            branch_scripts: None,
            working_dir: None,
            events: events.iter().map(|e| e.to_string()).collect(),
        };
        let workflows = vec![wf("a", &["push"]), wf("b", &["push", "tag"]), wf("c", &["tag"])];

        let names: Vec<&str> = matching_workflows(&workflows, "shop", "main", "push")
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(matching_workflows(&workflows, "shop", "dev", "push").count(), 0);
        assert_eq!(matching_workflows(&workflows, "cart", "main", "push").count(), 0);
    }

    #[test]
    fn token_compare_is_exact() {
        assert!(verify_token("abc", "abc"));
        assert!(!verify_token("abc", "ABC"));
        assert!(!verify_token("abc", ""));
    }
}
