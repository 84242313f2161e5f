//! Pull phase: incremental per-kind fetch from the stored cursor.

use crate::error::Result;
use crate::models::{EntityKind, Record};
use crate::remote::{with_timeout, RemoteBackend};

use super::{classify, Disposition, EngineInner, Interrupt, SyncReport};

/// Pull every kind. A failing kind is recorded and skipped; the others still
/// pull. Its cursor stays put so the next cycle fetches the same window.
pub(super) async fn pull_all<B: RemoteBackend>(
    inner: &EngineInner<B>,
    report: &mut SyncReport,
) -> std::result::Result<(), Interrupt> {
    for kind in EntityKind::ALL {
        let cursor = inner.store.cursor(kind)?;
        let result = with_timeout(
            inner.request_timeout(),
            inner.backend.select(kind.table(), &inner.row_filter(cursor)),
        )
        .await;

        let rows = match result {
            Ok(rows) => rows,
            Err(error) => {
                match classify(&error)? {
                    Disposition::Transient => {
                        tracing::warn!("Pulling {} failed, will retry: {error}", kind.table());
                        report.transient_failures += 1;
                    }
                    Disposition::Permanent => {
                        tracing::warn!("Pulling {} rejected: {error}", kind.table());
                    }
                }
                report.pull_failures.push(kind);
                continue;
            }
        };

        let records = match decode_rows(kind, rows) {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!("Discarding {} batch with a malformed row: {error}", kind.table());
                report.pull_failures.push(kind);
                continue;
            }
        };

        let fetched = records.len();
        let outcome = inner.store.merge_remote(kind, records)?;
        tracing::debug!(
            "Pulled {fetched} {} row(s): {} applied, {} unchanged, {} kept local, {} tombstoned; cursor {}",
            kind.table(),
            outcome.applied,
            outcome.unchanged,
            outcome.kept_local,
            outcome.tombstoned,
            outcome.cursor
        );
        report.merged.insert(kind, outcome);
    }
    Ok(())
}

fn decode_rows(kind: EntityKind, rows: Vec<crate::remote::Row>) -> Result<Vec<Record>> {
    rows.into_iter()
        .map(|row| Record::from_remote_row(kind, row))
        .collect()
}
