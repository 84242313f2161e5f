use std::path::PathBuf;

use waypoint_core::models::PhotoRef;
use waypoint_core::photos::{LocalImage, PhotoOwner};
use waypoint_core::{EntityKind, Record};

use crate::cli::PhotoOwnerKind;
use crate::commands::common::{resolve_record, AppContext};
use crate::error::CliError;

/// Attach photos to a log or trip and wait for the uploads to settle.
///
/// Returns the number of photos that uploaded.
pub async fn run_attach(
    ctx: &AppContext,
    owner: PhotoOwnerKind,
    query: &str,
    paths: &[PathBuf],
) -> Result<usize, CliError> {
    let kind = match owner {
        PhotoOwnerKind::Log => EntityKind::Log,
        PhotoOwnerKind::Trip => EntityKind::Trip,
    };
    let stored = resolve_record(&ctx.store, kind, query)?;
    let images = paths
        .iter()
        .map(LocalImage::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    let engine = ctx.engine()?;
    let queue = ctx.photo_queue()?;
    let owner = PhotoOwner::new(kind, stored.record.id());
    let (placeholders, task) = engine.attach_photos(&queue, owner, images)?;
    tracing::debug!("Queued {} photo upload(s) for {kind} {}", placeholders.len(), owner.record_id);

    task.await
        .map_err(|error| CliError::Task(error.to_string()))??;

    let Some(current) = ctx.store.get(kind, &owner.record_id)? else {
        println!("{kind} {} was deleted before the uploads finished", owner.record_id);
        return Ok(0);
    };
    let (unresolved, failed) = unresolved_counts(&current.record, &placeholders);
    let uploaded = placeholders.len().saturating_sub(unresolved);
    println!(
        "{} photo(s) queued, {uploaded} uploaded, {failed} failed; run `waypoint sync` to push the record",
        placeholders.len()
    );
    Ok(uploaded)
}

/// References from this batch still unresolved, and how many of those failed.
fn unresolved_counts(record: &Record, placeholders: &[String]) -> (usize, usize) {
    let photos: Vec<&PhotoRef> = match record {
        Record::Log(log) => log.photos.iter().collect(),
        Record::Trip(trip) => trip.cover_photo.iter().collect(),
        Record::Place(_) => Vec::new(),
    };
    let ours = photos
        .into_iter()
        .filter(|photo| {
            photo
                .placeholder()
                .is_some_and(|placeholder| placeholders.iter().any(|p| p == placeholder))
        })
        .collect::<Vec<_>>();
    let failed = ours
        .iter()
        .filter(|photo| matches!(photo, PhotoRef::Failed { .. }))
        .count();
    (ours.len(), failed)
}
