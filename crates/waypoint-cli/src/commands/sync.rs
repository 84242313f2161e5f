use std::time::Duration;

use serde::Serialize;
use waypoint_core::db::{RecordFilter, SyncCounts};
use waypoint_core::status::SyncStatusSnapshot;
use waypoint_core::{EntityKind, RecordId, SyncReport, SyncStatus};

use crate::commands::common::{format_sync_timestamp, record_title, short_id, AppContext};
use crate::error::CliError;

pub async fn run_sync(ctx: &AppContext) -> Result<SyncReport, CliError> {
    let engine = ctx.engine()?;
    let Some(report) = engine.sync_now().await? else {
        // Only one engine per process; nothing else can be mid-cycle.
        return Err(CliError::Task("a sync cycle is already running".to_string()));
    };
    if report.auth_suspended {
        return Err(CliError::AuthRequired);
    }

    for line in format_report_lines(&report) {
        println!("{line}");
    }
    Ok(report)
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.offline {
        lines.push("Backend unreachable; local changes stay queued".to_string());
    }
    lines.push(format!(
        "Pushed {}, deleted {}, pulled {} (passes: {})",
        report.pushed,
        report.deletions_confirmed,
        report.merged_count(),
        report.passes
    ));
    if report.deferred > 0 {
        lines.push(format!("{} log(s) waiting on their place", report.deferred));
    }
    if report.awaiting_photos > 0 {
        lines.push(format!(
            "{} record(s) stay pending until their photos upload",
            report.awaiting_photos
        ));
    }
    if report.marked_failed > 0 {
        lines.push(format!(
            "{} change(s) rejected; see `waypoint status`, then `waypoint retry`",
            report.marked_failed
        ));
    }
    if report.transient_failures > 0 {
        lines.push(format!(
            "{} call(s) failed transiently and will be retried",
            report.transient_failures
        ));
    }
    for kind in &report.pull_failures {
        lines.push(format!("Pulling {} failed; cursor unchanged", kind.table()));
    }
    lines
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub pending_count: usize,
    pub failed_count: usize,
    pub last_sync_at: Option<i64>,
    pub failures: Vec<FailureItem>,
}

#[derive(Debug, Serialize)]
pub struct FailureItem {
    pub kind: String,
    pub id: String,
    pub title: String,
    pub error: Option<String>,
}

pub fn collect_status(ctx: &AppContext) -> Result<StatusReport, CliError> {
    let SyncCounts { pending, failed } = ctx.store.counts();
    let mut failures = Vec::new();
    for kind in EntityKind::ALL {
        let filter = RecordFilter::kind(kind).with_statuses(&[SyncStatus::Failed]);
        failures.extend(ctx.store.fetch(&filter)?.into_iter().map(|stored| FailureItem {
            kind: kind.to_string(),
            id: stored.record.id().to_string(),
            title: record_title(&stored.record),
            error: stored.last_error,
        }));
    }
    failures.extend(
        ctx.store
            .tombstones()?
            .into_iter()
            .filter(|tombstone| tombstone.status == SyncStatus::Failed)
            .map(|tombstone| FailureItem {
                kind: tombstone.kind.to_string(),
                id: tombstone.id.to_string(),
                title: "(deleted)".to_string(),
                error: tombstone.last_error,
            }),
    );

    Ok(StatusReport {
        pending_count: pending,
        failed_count: failed,
        last_sync_at: ctx.store.last_sync_at()?,
        failures,
    })
}

pub fn run_status(ctx: &AppContext, as_json: bool) -> Result<(), CliError> {
    let status = collect_status(ctx)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Pending: {}", status.pending_count);
    println!("Failed:  {}", status.failed_count);
    println!(
        "Last sync: {}",
        status
            .last_sync_at
            .map_or_else(|| "never".to_string(), format_sync_timestamp)
    );
    for failure in &status.failures {
        let id = failure
            .id
            .parse::<RecordId>()
            .map_or_else(|_| failure.id.clone(), |id| short_id(&id));
        println!(
            "  {:<6} {id:<13}  {}  {}",
            failure.kind,
            failure.title,
            failure.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub fn run_retry(ctx: &AppContext) -> Result<usize, CliError> {
    let requeued = ctx.store.retry_failed()?;
    println!("Requeued {requeued} change(s)");
    Ok(requeued)
}

/// Run the background loop and print status changes until Ctrl-C.
pub async fn run_watch(ctx: &AppContext, interval: Option<u64>) -> Result<(), CliError> {
    let mut sync = ctx.config.sync.clone();
    sync.start_automatically = true;
    if let Some(secs) = interval {
        sync = sync.with_sync_interval(Duration::from_secs(secs));
    }
    let engine = ctx.engine_with(sync)?;
    let mut status = engine.status();
    let handle = engine.start();
    println!("{}", format_snapshot(&status.snapshot()));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = status.changed() => {
                if !changed {
                    break;
                }
                status.mark_seen();
                let snapshot = status.snapshot();
                println!("{}", format_snapshot(&snapshot));
                if snapshot.fatal_error.is_some() {
                    break;
                }
            }
        }
    }

    handle.stop().await;
    let snapshot = status.snapshot();
    if let Some(error) = snapshot.fatal_error {
        return Err(CliError::Task(error));
    }
    Ok(())
}

pub fn format_snapshot(snapshot: &SyncStatusSnapshot) -> String {
    let mut line = format!(
        "[{}] pending={} failed={} online={} last_sync={}",
        snapshot.phase,
        snapshot.pending_count,
        snapshot.failed_count,
        snapshot.is_online,
        snapshot
            .last_sync_at
            .map_or_else(|| "never".to_string(), format_sync_timestamp)
    );
    if snapshot.auth_required {
        line.push_str(" auth_required");
    }
    if let Some(error) = &snapshot.fatal_error {
        line.push_str(&format!(" fatal=\"{error}\""));
    }
    line
}
