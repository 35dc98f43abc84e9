//! Huawei CodeHub webhooks (GitLab-compatible payloads, own headers)

use super::gitlab::parse_gitlab_style;
use super::{HookParser, Normalized};
use crate::error::Result;
use crate::event::Provider;

pub struct CodehubParser;

impl HookParser for CodehubParser {
    fn event_header(&self) -> &'static str {
        "X-Codehub-Event"
    }

    fn secret_header(&self) -> &'static str {
        "X-Codehub-Token"
    }

    fn parse(&self, event_type: &str, payload: &[u8]) -> Result<Normalized> {
        parse_gitlab_style(Provider::Codehub, event_type, payload)
    }
}
