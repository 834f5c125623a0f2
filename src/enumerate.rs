//! Walks the activity search endpoint page by page until it runs dry.

use crate::api::{ActivityApi, ApiError};

pub const PAGE_SIZE: u32 = 100;

/// Upper bound on pages fetched in one run (one million activities).
pub const MAX_PAGES: u32 = 10_000;

/// Collect every remote activity id, in the order the service returns them.
///
/// Pages are requested strictly one after another; enumeration stops at the
/// first empty page. Any page failure aborts enumeration, since an
/// incomplete id list would be diffed as if it were complete.
pub async fn activity_ids(api: &dyn ActivityApi, only_running: bool) -> Result<Vec<String>, ApiError> {
    activity_ids_with(api, only_running, PAGE_SIZE, MAX_PAGES).await
}

pub(crate) async fn activity_ids_with(
    api: &dyn ActivityApi,
    only_running: bool,
    page_size: u32,
    max_pages: u32,
) -> Result<Vec<String>, ApiError> {
    let mut ids = Vec::new();
    let mut start = 0u32;

    for page in 0..max_pages {
        let activities = api.list_activities(start, page_size, only_running).await?;
        if activities.is_empty() {
            tracing::debug!(pages = page, total = ids.len(), "Activity listing exhausted");
            return Ok(ids);
        }

        let count = activities.len();
        for activity in activities {
            match activity.activity_id {
                Some(id) => ids.push(id),
                None => tracing::warn!(
                    "Skipping activity without id: {}",
                    activity.activity_name.as_deref().unwrap_or("<unnamed>")
                ),
            }
        }
        tracing::info!("Syncing activity ids: {} on page at {}, {} so far", count, start, ids.len());
        start = start.saturating_add(page_size);
    }

    tracing::warn!(
        "Stopped listing after {} pages ({} activities); remaining pages are ignored",
        max_pages,
        ids.len()
    );
    Ok(ids)
}
