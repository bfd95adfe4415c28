use ideaforge_core::{Fingerprint, IdeaforgeError, IdeaforgeResult, ProjectRecord, ProjectStatus};
use ideaforge_store::HistoryStore;
use tracing::info;

/// Give a FAILED record a fresh retry budget.
///
/// Records that kept their artifacts go back to DEVELOPED so only publishing
/// is retried; the rest restart from PENDING. Any other status is rejected
/// and the record is left untouched.
pub async fn requeue(
    store: &dyn HistoryStore,
    fingerprint: &Fingerprint,
) -> IdeaforgeResult<ProjectRecord> {
    let mut record = store
        .get(fingerprint)
        .await?
        .ok_or_else(|| IdeaforgeError::NotFound(format!("no record for {fingerprint}")))?;

    let target = if record.artifact.is_some() {
        ProjectStatus::Developed
    } else {
        ProjectStatus::Pending
    };
    if record.status != ProjectStatus::Failed {
        return Err(IdeaforgeError::InvalidTransition {
            fingerprint: fingerprint.to_string(),
            from: record.status,
            to: target,
        });
    }

    let previous_error = record.last_error.take();
    record.transition(target)?;
    record.attempt_count = 0;
    store.upsert(&record).await?;
    info!(
        fingerprint = %fingerprint,
        status = %record.status,
        previous_error = previous_error.as_deref().unwrap_or(""),
        "Record re-queued"
    );
    Ok(record)
}
