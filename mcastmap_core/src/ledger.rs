//! The address ledger service: window queries and bucket mutations.
//!
//! Queries fetch one bucket snapshot and one flow snapshot, then work purely
//! in memory. Mutations go through the guard inside a single repository
//! transaction; update and delete additionally claim their bucket ids so
//! two concurrent requests on the same bucket cannot both win.

use crate::arena::BucketArena;
use crate::config::LedgerConfig;
use crate::constants::AUDIT_TARGET;
use crate::errors::{Error, Result};
use crate::guard;
use crate::inflight::InflightRegistry;
use crate::overlap;
use crate::public_api::{
    BucketBackup, BucketRecord, BucketUpdate, ChildBucketPayload, Counts, DeleteOutcome,
    DetailResponse, ImportOutcome, OverviewResponse, ParentBucketPayload, ReservedDetail,
    UsedDetail,
};
use crate::repository::{BucketRepository, MemoryRepository, UsageSource};
use crate::segments::{self, ReservedInterval};
use crate::table::NewBucket;
use crate::telemetry;
use crate::types::{AddressBucket, BucketId, BucketKind, SegmentState};
use crate::usage::UsageIndex;
use crate::window::{resolve_window, Window, WindowQuery};
use env_logger::Env;
use log::{debug, info, warn};
use metrics::{counter, gauge, histogram};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

pub struct AddressLedger<R: BucketRepository = MemoryRepository> {
    config: LedgerConfig,
    repo: R,
    usage: Arc<dyn UsageSource>,
    inflight: InflightRegistry,
}

impl AddressLedger<MemoryRepository> {
    /// In-memory ledger, seeded with the Tier0 blocks unless
    /// `config.seed_tier0` is off.
    pub fn open(config: LedgerConfig, usage: Arc<dyn UsageSource>) -> Result<Self> {
        let repo = if config.seed_tier0 {
            MemoryRepository::seeded()
        } else {
            MemoryRepository::empty()
        };
        Self::with_repository(config, repo, usage)
    }
}

impl<R: BucketRepository> AddressLedger<R> {
    pub fn with_repository(
        config: LedgerConfig,
        repo: R,
        usage: Arc<dyn UsageSource>,
    ) -> Result<Self> {
        config.validate()?;
        Self::ensure_logging(&config.log_level);
        telemetry::init();
        let buckets = repo.snapshot()?.len();
        gauge!("mcastmap_buckets").set(buckets as f64);
        info!(
            "[OPEN] ledger ready: {} buckets, default scope {}",
            buckets, config.default_scope
        );
        Ok(Self {
            config,
            repo,
            usage,
            inflight: InflightRegistry::new(),
        })
    }

    // ---- logging bootstrapper -------------------------------------------------
    fn ensure_logging(level: &str) {
        static INIT: OnceCell<()> = OnceCell::new();
        INIT.get_or_init(|| {
            // RUST_LOG wins over the configured level; a host logger wins over both.
            let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level))
                .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
                .try_init();
        });
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn inflight(&self) -> &InflightRegistry {
        &self.inflight
    }

    pub fn resolve(&self, query: &WindowQuery) -> Result<Window> {
        resolve_window(query, &self.config.default_scope)
    }

    fn usage_index(&self, window: &Window) -> Result<UsageIndex> {
        let flows = self.usage.flow_addresses()?;
        Ok(UsageIndex::build(&flows, window))
    }

    fn arena(&self) -> Result<BucketArena> {
        Ok(BucketArena::new(self.repo.snapshot()?.ordered()))
    }

    // ───────────────────────── queries ───────────────────────────────── //

    /// Per-bucket overlap and usage for the window. `center` is ignored.
    pub fn overview(&self, query: &WindowQuery) -> Result<OverviewResponse> {
        let window = self.resolve(query)?;
        let arena = self.arena()?;
        let index = self.usage_index(&window)?;
        let used = index.offsets();
        let summary = overlap::summarize(arena.buckets(), &window, &used);
        counter!("mcastmap_queries_total", "view" => "overview").increment(1);
        debug!(
            "[OVERVIEW] {} parents={} children={} used={}",
            window.label,
            summary.parents.len(),
            summary.children.len(),
            used.len()
        );
        Ok(OverviewResponse {
            window: (&window).into(),
            parents: summary.parents,
            children: summary.children,
        })
    }

    /// Full FREE/USED/RESERVED partition of the window with per-address
    /// detail.
    pub fn detail(&self, query: &WindowQuery) -> Result<DetailResponse> {
        let window = self.resolve(query)?;
        let (center_index, center_address) = window.center(query.center.as_deref())?;
        let arena = self.arena()?;
        let index = self.usage_index(&window)?;
        let used = index.offsets();

        let reserved = segments::reserved_intervals(arena.buckets(), &window);
        let intervals: Vec<ReservedInterval> = reserved.iter().map(|(r, _)| *r).collect();
        let plan = segments::build_segments(window.total, &used, &intervals);
        let (used_count, reserved_count, free) =
            segments::counts(window.total, used.len() as u64, plan.reserved_count);

        let used_details = index
            .iter()
            .map(|(offset, flows)| UsedDetail {
                index: offset,
                address: window.addr_at(offset),
                state: SegmentState::Used,
                flows: flows.to_vec(),
            })
            .collect();
        let reserved_segments = reserved
            .iter()
            .map(|(r, block)| ReservedDetail {
                start: r.start,
                length: r.end - r.start,
                address: window.addr_at(r.start),
                end_address: window.addr_at(r.end - 1),
                block: (*block).clone(),
            })
            .collect();

        counter!("mcastmap_queries_total", "view" => "detail").increment(1);
        histogram!("mcastmap_segments_per_query").record(plan.segments.len() as f64);
        debug!(
            "[DETAIL] {} segments={} used={} reserved={} free={}",
            window.label,
            plan.segments.len(),
            used_count,
            reserved_count,
            free
        );
        Ok(DetailResponse {
            scope: (&window).into(),
            center_index,
            center_address,
            counts: Counts {
                total: window.total,
                used: used_count,
                reserved: reserved_count,
                free,
            },
            segments: plan.segments,
            used_details,
            reserved_segments,
            blocks: arena.into_buckets(),
        })
    }

    pub fn get_bucket(&self, id: BucketId) -> Result<AddressBucket> {
        self.repo.snapshot()?.require(id).cloned()
    }

    /// Tier0 blocks by start address.
    pub fn list_tier0(&self) -> Result<Vec<AddressBucket>> {
        Ok(self.arena()?.tier0().cloned().collect())
    }

    /// Direct children, Parents before Children, each by start address.
    pub fn list_children(&self, id: BucketId) -> Result<Vec<AddressBucket>> {
        let arena = self.arena()?;
        if arena.get(id).is_none() {
            return Err(Error::bucket_not_found(id));
        }
        Ok(arena.children_of(id).cloned().collect())
    }

    /// Every bucket, Tier0 then Parent then Child, each by start address.
    pub fn export(&self) -> Result<BucketBackup> {
        let table = self.repo.snapshot()?;
        let records = table.export_order().iter().map(BucketRecord::from).collect();
        let backup = BucketBackup::new(records);
        info!("[EXPORT] {} buckets", backup.count);
        Ok(backup)
    }

    pub fn export_json(&self) -> Result<String> {
        self.export()?.to_json()
    }

    // ───────────────────────── mutations ─────────────────────────────── //

    fn mutate<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        counter!("mcastmap_mutations_total", "op" => op).increment(1);
        let out = f();
        if let Err(e) = &out {
            counter!(
                "mcastmap_mutation_failures_total",
                "op" => op,
                "code" => e.code().as_str()
            )
            .increment(1);
            warn!("[MUTATION] {op} rejected: {e}");
        }
        out
    }

    fn committed(&self, buckets: usize, audit: fmt::Arguments<'_>) {
        gauge!("mcastmap_buckets").set(buckets as f64);
        if self.config.audit {
            info!(target: AUDIT_TARGET, "{audit}");
        }
    }

    pub fn create_parent(&self, payload: &ParentBucketPayload) -> Result<AddressBucket> {
        self.mutate("create_parent", || {
            let range = payload.range()?;
            let (bucket, len) = self.repo.transaction(|t| {
                let placement = guard::place_parent(t, &range, payload.parent_id)?;
                let bucket = t.insert(NewBucket {
                    kind: BucketKind::Parent,
                    privilege_id: Some(placement.privilege_id),
                    parent_id: Some(placement.parent_id),
                    range: range.clone(),
                    description: payload.description.clone(),
                    memo: payload.memo.clone(),
                    color: payload.color.clone(),
                    is_reserved: false,
                })?;
                Ok((bucket, t.len()))
            })?;
            info!(
                "[CREATE_PARENT] id={} range={} parent={:?}",
                bucket.id, range, bucket.parent_id
            );
            self.committed(
                len,
                format_args!("op=create_parent id={} range={range}", bucket.id),
            );
            Ok(bucket)
        })
    }

    pub fn create_child(&self, payload: &ChildBucketPayload) -> Result<AddressBucket> {
        self.mutate("create_child", || {
            let range = payload.range()?;
            let (bucket, len) = self.repo.transaction(|t| {
                let placement = guard::place_child(t, &range, payload.parent_id)?;
                let bucket = t.insert(NewBucket {
                    kind: BucketKind::Child,
                    privilege_id: Some(placement.privilege_id),
                    parent_id: Some(placement.parent_id),
                    range: range.clone(),
                    description: payload.description.clone(),
                    memo: payload.memo.clone(),
                    color: payload.color.clone(),
                    is_reserved: payload.is_reserved,
                })?;
                Ok((bucket, t.len()))
            })?;
            info!(
                "[CREATE_CHILD] id={} parent={} range={} reserved={}",
                bucket.id, payload.parent_id, range, bucket.is_reserved
            );
            self.committed(
                len,
                format_args!("op=create_child id={} range={range}", bucket.id),
            );
            Ok(bucket)
        })
    }

    pub fn update_bucket(&self, id: BucketId, update: &BucketUpdate) -> Result<AddressBucket> {
        self.mutate("update_bucket", || {
            // A re-parent also holds the new owner so it cannot be deleted underneath.
            let mut ids = vec![id];
            ids.extend(update.parent_id);
            let _claim = self.inflight.claim("update_bucket", &ids)?;
            let (bucket, len) = self.repo.transaction(|t| {
                let next = guard::apply_update(t, id, update)?;
                t.replace(next.clone())?;
                Ok((next, t.len()))
            })?;
            info!("[UPDATE] id={} parent={:?}", id, bucket.parent_id);
            self.committed(len, format_args!("op=update_bucket id={id}"));
            Ok(bucket)
        })
    }

    /// Delete a Parent or Child and everything beneath it.
    pub fn delete_bucket(&self, id: BucketId) -> Result<DeleteOutcome> {
        self.mutate("delete_bucket", || {
            let snapshot = self.repo.snapshot()?;
            let planned = guard::plan_delete(&snapshot, id)?;
            let _claim = self.inflight.claim("delete_bucket", &planned)?;
            // Re-plan under the writer; anything that joined the subtree since
            // the snapshot was never claimed.
            let (deleted, len) = self.repo.transaction(|t| {
                let ids = guard::plan_delete(t, id)?;
                if let Some(&stray) = ids.iter().find(|i| !planned.contains(i)) {
                    return Err(Error::Busy { id: stray });
                }
                for i in &ids {
                    t.remove(*i);
                }
                Ok((ids, t.len()))
            })?;
            info!("[DELETE] id={} removed={}", id, deleted.len());
            self.committed(len, format_args!("op=delete_bucket ids={deleted:?}"));
            Ok(DeleteOutcome { deleted })
        })
    }

    /// Replace the whole store with `backup`. Nothing changes on error.
    pub fn import(&self, backup: &BucketBackup) -> Result<ImportOutcome> {
        self.mutate("import", || {
            if backup.count != 0 && backup.count != backup.buckets.len() {
                warn!(
                    "[IMPORT] count field says {} but {} rows supplied",
                    backup.count,
                    backup.buckets.len()
                );
            }
            let imported = self.repo.transaction(|t| {
                *t = guard::rebuild(&backup.buckets)?;
                Ok(t.len())
            })?;
            info!("[IMPORT] replaced store with {} buckets", imported);
            self.committed(imported, format_args!("op=import imported={imported}"));
            Ok(ImportOutcome { imported })
        })
    }

    pub fn import_json(&self, json: &str) -> Result<ImportOutcome> {
        let backup = BucketBackup::from_json(json)?;
        self.import(&backup)
    }
}
