//! Sync orchestration: `INCREMENTAL → FORCED → DONE`.
//!
//! ## Incremental pass
//!
//! For every connection, every model (garbage model last):
//!
//! 1. Watermark the model's local nodes (touching each).
//! 2. Fetch records changed since the watermark, page by page, per locale.
//! 3. Normalize, run the garbage collector, resolve relations.
//! 4. Upsert; collect referenced ids when the model already had nodes.
//!
//! ## Forced pass
//!
//! Re-fetch exactly the collected ids of each target model. Models with no
//! collected ids are skipped; this pass never scans.
//!
//! Connections run in parallel within a pass. Models and locales within a
//! connection run in order.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use mirror_core::{LocalType, RemoteModel};

use crate::connection::Connection;
use crate::error::{RpcError, SyncError};
use crate::fetch::{fetch_pages, FetchMode};
use crate::garbage::collect_victim;
use crate::node::Record;
use crate::normalize::normalize_field;
use crate::plan::ModelPlan;
use crate::relations::{resolve_links, RelatedIds};
use crate::store::{NodeStore, UpsertOutcome};
use crate::upsert::{upsert_record, ResolvedRecord};
use crate::watermark::{self, parse_write_date, WRITE_DATE};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Incremental,
    Forced,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Incremental => "incremental",
            Phase::Forced => "forced",
        })
    }
}

/// Node counts for one model in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelStats {
    /// Records read, summed over locales.
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Nodes removed on behalf of garbage records.
    pub deleted: usize,
}

impl ModelStats {
    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn add(&mut self, other: &ModelStats) {
        self.fetched += other.fetched;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResult {
    pub connection: String,
    pub model: RemoteModel,
    pub local: LocalType,
    pub phase: Phase,
    pub stats: ModelStats,
}

/// A model whose fetch was cut short by a remote failure. Nodes upserted
/// before the failure stay in place.
#[derive(Debug)]
pub struct ModelFailure {
    pub connection: String,
    pub model: RemoteModel,
    pub phase: Phase,
    pub error: SyncError,
}

/// Ids handed from the incremental pass to the forced pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedIds {
    pub connection: String,
    pub model: RemoteModel,
    pub ids: BTreeSet<i64>,
}

/// Outcome of one `sync` invocation.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub models: Vec<ModelResult>,
    pub failures: Vec<ModelFailure>,
    pub forced: Vec<ForcedIds>,
}

impl SyncReport {
    /// No model failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn totals(&self) -> ModelStats {
        let mut totals = ModelStats::default();
        for result in &self.models {
            totals.add(&result.stats);
        }
        totals
    }

    fn absorb(&mut self, pass: PassOutcome) {
        self.models.extend(pass.models);
        self.failures.extend(pass.failures);
    }
}

#[derive(Debug, Default)]
struct PassOutcome {
    models: Vec<ModelResult>,
    failures: Vec<ModelFailure>,
    related: RelatedIds,
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

/// Run both passes over `connections`.
///
/// Remote failures are isolated to their model and reported; configuration,
/// resolution, and store errors abort the run.
pub fn sync(connections: &[Connection], store: &dyn NodeStore) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();

    let incremental = in_parallel(connections, |conn| incremental_pass(conn, store))?;

    let mut handoff = Vec::with_capacity(connections.len());
    for (conn, mut pass) in connections.iter().zip(incremental) {
        for (model, ids) in pass.related.iter() {
            report.forced.push(ForcedIds {
                connection: conn.label(),
                model: model.clone(),
                ids: ids.clone(),
            });
        }
        let related = std::mem::take(&mut pass.related);
        if !related.is_empty() {
            handoff.push((conn, related));
        }
        report.absorb(pass);
    }

    let forced = in_parallel(&handoff, |(conn, related)| forced_pass(conn, store, related))?;
    for pass in forced {
        report.absorb(pass);
    }

    let totals = report.totals();
    tracing::info!(
        "sync done: {} created, {} updated, {} unchanged, {} deleted, {} failure(s)",
        totals.created,
        totals.updated,
        totals.unchanged,
        totals.deleted,
        report.failures.len()
    );
    Ok(report)
}

/// Run `f` for every item on its own scoped thread, keeping input order.
fn in_parallel<I, T, F>(items: &[I], f: F) -> Result<Vec<T>, SyncError>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<T, SyncError> + Sync,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = items
            .iter()
            .map(|item| scope.spawn(move || f(item)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn incremental_pass(conn: &Connection, store: &dyn NodeStore) -> Result<PassOutcome, SyncError> {
    let mut pass = PassOutcome::default();
    for mapping in conn.config.all_models() {
        let plan = ModelPlan::build(conn, mapping)?;
        let watermark = watermark::track(store, &mapping.local)?;
        tracing::debug!(
            "{}: {} watermark {} ({} tie(s))",
            conn.label(),
            mapping.remote,
            watermark::format_write_date(watermark.max),
            watermark.ties.len()
        );

        let run = ModelRun {
            conn,
            store,
            plan: &plan,
            phase: Phase::Incremental,
        };
        let mut related = watermark.has_nodes.then(RelatedIds::new);
        let mut stats = ModelStats::default();
        let mode = FetchMode::Incremental(&watermark);
        let fetched = fetch_pages(conn, &plan, mode, |locale, records| {
            run.apply_page(locale, records, related.as_mut(), &mut stats)
        });
        run.finish(&mut pass, stats, fetched)?;
        if let Some(related) = related {
            for (model, ids) in related.iter() {
                pass.related.add(model, ids.iter().copied());
            }
        }
    }
    Ok(pass)
}

fn forced_pass(
    conn: &Connection,
    store: &dyn NodeStore,
    related: &RelatedIds,
) -> Result<PassOutcome, SyncError> {
    let mut pass = PassOutcome::default();
    for mapping in conn.config.all_models() {
        let Some(ids) = related.get(&mapping.remote).filter(|ids| !ids.is_empty()) else {
            continue;
        };
        let plan = ModelPlan::build(conn, mapping)?;
        let run = ModelRun {
            conn,
            store,
            plan: &plan,
            phase: Phase::Forced,
        };
        let mut stats = ModelStats::default();
        let fetched = fetch_pages(conn, &plan, FetchMode::Forced(ids), |locale, records| {
            run.apply_page(locale, records, None, &mut stats)
        });
        run.finish(&mut pass, stats, fetched)?;
    }
    Ok(pass)
}

// ---------------------------------------------------------------------------
// Per-model processing
// ---------------------------------------------------------------------------

struct ModelRun<'a> {
    conn: &'a Connection,
    store: &'a dyn NodeStore,
    plan: &'a ModelPlan<'a>,
    phase: Phase,
}

impl ModelRun<'_> {
    fn apply_page(
        &self,
        locale: &str,
        records: Vec<Record>,
        mut related: Option<&mut RelatedIds>,
        stats: &mut ModelStats,
    ) -> Result<(), SyncError> {
        for raw in records {
            self.apply_record(locale, raw, related.as_deref_mut(), stats)?;
        }
        Ok(())
    }

    fn apply_record(
        &self,
        locale: &str,
        mut raw: Record,
        related: Option<&mut RelatedIds>,
        stats: &mut ModelStats,
    ) -> Result<(), SyncError> {
        let remote_id = raw
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| self.bad_record("record without an integer id"))?;
        let write_date = raw
            .get(WRITE_DATE)
            .and_then(Value::as_str)
            .and_then(parse_write_date);

        let mut fields = Record::new();
        for field in &self.plan.fields {
            let value = raw.remove(field.name).unwrap_or(Value::Null);
            fields.insert(
                field.name.to_owned(),
                normalize_field(value, field.field_type, field.spec),
            );
        }

        if self.plan.is_garbage {
            if let Some(victim) = collect_victim(&self.conn.config, &fields, locale) {
                if self.store.delete(&victim)? {
                    stats.deleted += 1;
                    tracing::debug!(
                        "deleted {victim} named by garbage record {remote_id} ({locale})"
                    );
                }
            }
        }

        let links = resolve_links(self.plan, &mut fields, locale, related);
        let record = ResolvedRecord {
            remote_id,
            write_date,
            fields,
            links,
        };
        let forced = self.phase == Phase::Forced;
        let local = &self.plan.mapping.local;
        let (_, outcome) = upsert_record(self.store, local, locale, record, forced)?;
        stats.count(outcome);
        Ok(())
    }

    /// File the model's result; remote failures become report entries,
    /// anything else aborts the run.
    fn finish(
        &self,
        pass: &mut PassOutcome,
        mut stats: ModelStats,
        fetched: Result<usize, SyncError>,
    ) -> Result<(), SyncError> {
        let mapping = self.plan.mapping;
        let connection = self.conn.label();
        match fetched {
            Ok(count) => stats.fetched = count,
            Err(error) if error.is_remote() => {
                tracing::warn!(
                    "{connection}: {} {} pass aborted: {error}",
                    mapping.remote,
                    self.phase
                );
                pass.failures.push(ModelFailure {
                    connection: connection.clone(),
                    model: mapping.remote.clone(),
                    phase: self.phase,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
        tracing::info!(
            "{connection}: {} [{}] fetched {}, created {}, updated {}, deleted {}",
            mapping.remote,
            self.phase,
            stats.fetched,
            stats.created,
            stats.updated,
            stats.deleted
        );
        pass.models.push(ModelResult {
            connection,
            model: mapping.remote.clone(),
            local: mapping.local.clone(),
            phase: self.phase,
            stats,
        });
        Ok(())
    }

    fn bad_record(&self, message: &str) -> SyncError {
        SyncError::Remote {
            connection: self.conn.label(),
            model: self.plan.mapping.remote.0.clone(),
            operation: "search_read".into(),
            source: RpcError::BadResponse(message.to_owned()),
        }
    }
}
