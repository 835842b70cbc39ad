//! Paginated fetcher.
//!
//! `search` pages of ids under the model's domain plus a change filter, then
//! `search_read` each page once per active locale.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde_json::json;

use mirror_core::{Domain, Operator};

use crate::connection::Connection;
use crate::error::{RpcError, SyncError};
use crate::node::Record;
use crate::plan::ModelPlan;
use crate::rpc::{parse_ids, parse_records};
use crate::watermark::{format_write_date, Watermark, WRITE_DATE};

pub const PAGE_SIZE: usize = 50;

const ORDER: &str = "write_date ASC";

/// Records changed since the watermark.
///
/// `(id not in ties AND max <= write_date < max+1s) OR write_date >= max+1s`:
/// the remote timestamp has one-second resolution, so ids other than the
/// known ties inside the max second are re-examined, and everything from the
/// next second on is new.
pub fn build_change_filter(max: NaiveDateTime, ties: &BTreeSet<i64>) -> Domain {
    let next = max + chrono::Duration::seconds(1);
    let ties: Vec<i64> = ties.iter().copied().collect();
    let same_second = Domain::leaf("id", Operator::NotIn, ties)
        .and(Domain::leaf(WRITE_DATE, Operator::Ge, format_write_date(max)))
        .and(Domain::leaf(WRITE_DATE, Operator::Lt, format_write_date(next)));
    same_second.or(Domain::leaf(WRITE_DATE, Operator::Ge, format_write_date(next)))
}

pub fn forced_filter(ids: &[i64]) -> Domain {
    Domain::leaf("id", Operator::In, ids.to_vec())
}

#[derive(Debug, Clone, Copy)]
pub enum FetchMode<'a> {
    Incremental(&'a Watermark),
    /// Exactly these ids, regardless of timestamps.
    Forced(&'a BTreeSet<i64>),
}

/// Fetch every in-scope record of `plan`, calling `on_page(locale, records)`
/// for each page and locale. Returns the number of records read.
///
/// The first failing remote call aborts the fetch; pages already handed to
/// `on_page` stay processed.
pub fn fetch_pages<F>(
    conn: &Connection,
    plan: &ModelPlan<'_>,
    mode: FetchMode<'_>,
    mut on_page: F,
) -> Result<usize, SyncError>
where
    F: FnMut(&str, Vec<Record>) -> Result<(), SyncError>,
{
    let mut fetched = 0;
    match mode {
        FetchMode::Incremental(watermark) => {
            let domain = plan
                .mapping
                .domain
                .clone()
                .and(build_change_filter(watermark.max, &watermark.ties));
            let mut offset = 0;
            loop {
                let ids = search(conn, plan, &domain, offset)?;
                fetched += read_page(conn, plan, &ids, &mut on_page)?;
                if ids.len() < PAGE_SIZE {
                    break;
                }
                offset += PAGE_SIZE;
            }
        }
        FetchMode::Forced(forced) => {
            let forced: Vec<i64> = forced.iter().copied().collect();
            for chunk in forced.chunks(PAGE_SIZE) {
                let domain = plan.mapping.domain.clone().and(forced_filter(chunk));
                let ids = search(conn, plan, &domain, 0)?;
                fetched += read_page(conn, plan, &ids, &mut on_page)?;
            }
        }
    }
    Ok(fetched)
}

fn search(
    conn: &Connection,
    plan: &ModelPlan<'_>,
    domain: &Domain,
    offset: usize,
) -> Result<Vec<i64>, SyncError> {
    let model = &plan.mapping.remote.0;
    let raw = conn.call(
        model,
        "search",
        json!([domain.to_prefix()]),
        json!({
            "limit": PAGE_SIZE,
            "offset": offset,
            "order": ORDER,
            "context": { "active_test": false },
        }),
    )?;
    parse_ids(raw).map_err(|source| remote_error(conn, model, "search", source))
}

fn read_page<F>(
    conn: &Connection,
    plan: &ModelPlan<'_>,
    ids: &[i64],
    on_page: &mut F,
) -> Result<usize, SyncError>
where
    F: FnMut(&str, Vec<Record>) -> Result<(), SyncError>,
{
    if ids.is_empty() {
        return Ok(0);
    }
    let model = &plan.mapping.remote.0;
    let mut read = 0;
    for locale in conn.locales() {
        tracing::info!("fetching {} x{} ({})", model, ids.len(), locale);
        let raw = conn.call(
            model,
            "search_read",
            json!([[["id", "in", ids]], plan.read_fields]),
            json!({ "context": { "active_test": false, "lang": locale } }),
        )?;
        let records =
            parse_records(raw).map_err(|source| remote_error(conn, model, "search_read", source))?;
        read += records.len();
        on_page(locale, records)?;
    }
    Ok(read)
}

fn remote_error(conn: &Connection, model: &str, operation: &str, source: RpcError) -> SyncError {
    SyncError::Remote {
        connection: conn.label(),
        model: model.to_owned(),
        operation: operation.to_owned(),
        source,
    }
}
