// Workflow Conditions - declarative gate evaluated before a run is created

use inspectos_shared::Conditions;
use std::collections::HashSet;
use std::future::Future;
use uuid::Uuid;

use crate::database::StoreResult;

/// Evaluate `conditions` against the entity's status and assigned tags.
///
/// Predicates are ANDed and short-circuit in the order statusEquals,
/// statusIn, includeTagIds, excludeTagIds. Status predicates only apply
/// when the firing context carries a status. `fetch_tags` runs at most
/// once, and only when a tag predicate is present.
pub async fn should_run<F, Fut>(
    conditions: &Conditions,
    status: Option<&str>,
    fetch_tags: F,
) -> StoreResult<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = StoreResult<HashSet<Uuid>>>,
{
    if !status_matches(conditions, status) {
        return Ok(false);
    }

    if !conditions.needs_tags() {
        return Ok(true);
    }

    let assigned = fetch_tags().await?;
    Ok(tags_match(conditions, &assigned))
}

fn status_matches(conditions: &Conditions, status: Option<&str>) -> bool {
    let Some(status) = status else {
        return true;
    };

    if let Some(expected) = &conditions.status_equals {
        if expected != status {
            return false;
        }
    }

    if let Some(allowed) = &conditions.status_in {
        if !allowed.iter().any(|s| s == status) {
            return false;
        }
    }

    true
}

fn tags_match(conditions: &Conditions, assigned: &HashSet<Uuid>) -> bool {
    conditions.include_tag_ids.iter().all(|t| assigned.contains(t))
        && !conditions.exclude_tag_ids.iter().any(|t| assigned.contains(t))
}
