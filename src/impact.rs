//! Decide which tracked templates a push touches

use tracing::{info, warn};

use crate::aggregate::ErrorList;
use crate::event::PushEvent;
use crate::template::ServiceTemplate;

/// Every added, modified and removed path of every commit, in delivery order.
/// Duplicates are kept.
pub fn changed_files(event: &PushEvent) -> Vec<&str> {
    event
        .commits
        .iter()
        .flat_map(|c| c.added.iter().chain(&c.modified).chain(&c.removed))
        .map(String::as_str)
        .collect()
}

/// Templates whose tracked sub-path occurs as a substring of a changed path.
///
/// Substring matching over-matches short or shared sub-paths; a false
/// positive only costs a sync that finds the watermark unchanged.
/// Templates with an unparseable `src_path` are reported to `errors` and skipped.
pub fn affected_templates(
    event: &PushEvent,
    templates: Vec<ServiceTemplate>,
    errors: &mut ErrorList,
) -> Vec<ServiceTemplate> {
    let files = changed_files(event);
    let mut affected = Vec::new();

    for template in templates {
        let location = match template.location() {
            Ok(loc) => loc,
            Err(e) => {
                warn!(
                    "Service template {} has an invalid source path: {}",
                    template.service_name, e
                );
                errors.append(format!("resolve {}", template.service_name), e);
                continue;
            }
        };

        if files.iter().any(|f| f.contains(location.path.as_str())) {
            info!(
                "Service template {} from {} {} is affected",
                template.service_name, template.source, template.src_path
            );
            affected.push(template);
        } else {
            info!(
                "Service template {} from {} {} is not affected, no sync",
                template.service_name, template.source, template.src_path
            );
        }
    }
    affected
}
