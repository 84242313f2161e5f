use waypoint_core::models::{Log, Place, Trip};
use waypoint_core::util::normalize_text_option;
use waypoint_core::{EntityKind, Record, RecordId};

use crate::cli::ListArgs;
use crate::commands::common::{
    format_record_lines, list_records, record_to_list_item, resolve_record, AppContext,
};
use crate::error::CliError;

pub struct NewPlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub address: Option<String>,
    pub category: Option<String>,
}

pub fn run_add_place(ctx: &AppContext, input: NewPlace) -> Result<RecordId, CliError> {
    let mut place = Place::new(input.name, input.lat, input.lon, ctx.store.clock().now_millis());
    place.address = normalize_text_option(input.address);
    place.category = normalize_text_option(input.category);

    let stored = ctx.store.save(Record::Place(place))?;
    println!("{}", stored.record.id());
    Ok(stored.record.id())
}

pub fn run_add_log(
    ctx: &AppContext,
    place_query: &str,
    title: String,
    notes: Option<String>,
    rating: Option<u8>,
) -> Result<RecordId, CliError> {
    let place = resolve_record(&ctx.store, EntityKind::Place, place_query)?;
    let mut log = Log::new(place.record.id(), title, ctx.store.clock().now_millis());
    log.notes = notes.unwrap_or_default();
    log.rating = rating;

    let stored = ctx.store.save(Record::Log(log))?;
    println!("{}", stored.record.id());
    Ok(stored.record.id())
}

pub fn run_add_trip(
    ctx: &AppContext,
    name: String,
    description: Option<String>,
    log_queries: &[String],
) -> Result<RecordId, CliError> {
    let mut trip = Trip::new(name, ctx.store.clock().now_millis());
    trip.description = normalize_text_option(description);
    for query in log_queries {
        let log = resolve_record(&ctx.store, EntityKind::Log, query)?;
        if !trip.log_ids.contains(&log.record.id()) {
            trip.log_ids.push(log.record.id());
        }
    }

    let stored = ctx.store.save(Record::Trip(trip))?;
    println!("{}", stored.record.id());
    Ok(stored.record.id())
}

pub fn run_list(ctx: &AppContext, kind: EntityKind, args: &ListArgs) -> Result<(), CliError> {
    let records = list_records(&ctx.store, kind, args.limit)?;

    if args.json {
        let items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if records.is_empty() {
        println!("No {} yet.", kind.table());
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn run_delete(ctx: &AppContext, kind: EntityKind, query: &str) -> Result<RecordId, CliError> {
    let stored = resolve_record(&ctx.store, kind, query)?;
    let id = stored.record.id();
    ctx.store.delete(kind, &id)?;
    println!("{id}");
    Ok(id)
}
