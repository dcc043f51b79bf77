//! The indexing pipeline driving the initial full load and the polling cycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use config::shared::PipelineConfig;
use tracing::{debug, error, info};

use crate::concurrency::shutdown::{
    ShutdownResult, ShutdownRx, ShutdownTx, create_shutdown_channel, is_shutdown_requested,
};
use crate::destination::Destination;
use crate::error::EtlResult;
#[cfg(feature = "failpoints")]
use crate::failpoints::{
    PIPELINE__AFTER_UPSERT, PIPELINE__BEFORE_SWEEP_RESET, PIPELINE__BEFORE_WATERMARK_ADVANCE,
    etl_fail_point,
};
use crate::retry::Backoff;
use crate::source::Source;
use crate::state::cursor::Cursor;
use crate::state::store::StateStore;
use crate::sync::assembler::DocumentAssembler;
use crate::sync::detector::{ChangeDetector, SweepStart};
use crate::sync::resolver::RootResolver;
use crate::types::EntityKind;

/// Instant a cycle commits its watermark to once every sweep completed.
#[derive(Debug, Clone, Copy)]
struct CycleStart {
    at: DateTime<Utc>,
    /// Whether `at` is persisted in the cursor.
    recorded: bool,
    /// Whether `at` belongs to the cycle that recorded the excepted ids found in the cursor.
    owns_excepted_ids: bool,
}

/// What one sweep over an entity kind did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub kind: EntityKind,
    /// Pages written during this sweep.
    pub pages: usize,
    /// Changed ids of the sweep, including ids recorded by an interrupted earlier attempt.
    pub changes: usize,
    /// Documents upserted during this sweep.
    pub documents: usize,
}

impl SweepSummary {
    fn new(kind: EntityKind, resumed_changes: usize) -> Self {
        Self {
            kind,
            pages: 0,
            changes: resumed_changes,
            documents: 0,
        }
    }
}

/// Result of one bootstrap or polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every kind was drained.
    Completed {
        changes: usize,
        /// The new watermark, when it moved.
        advanced_to: Option<DateTime<Utc>>,
    },
    /// A shutdown was requested before the cycle finished. Nothing was committed past the
    /// last written page.
    Interrupted,
}

/// Incremental indexer from the source store into a search index destination.
///
/// The pipeline runs a full load of every film once, then polls genres, persons and films in
/// that order. Progress is committed to the cursor only after the destination confirmed the
/// write it depends on, so a crash can replay a page but never skip one.
#[derive(Debug)]
pub struct Pipeline<Src, S, D> {
    config: Arc<PipelineConfig>,
    detector: ChangeDetector<Src>,
    resolver: RootResolver<Src>,
    assembler: DocumentAssembler<Src>,
    cursor: Cursor<S>,
    destination: D,
    backoff: Backoff,
    schema_ready: AtomicBool,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<Src, S, D> Pipeline<Src, S, D>
where
    Src: Source + Clone + Send + Sync + 'static,
    S: StateStore + Send + Sync + 'static,
    D: Destination + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, source: Src, state_store: S, destination: D) -> Self {
        let page_size = config.batch.page_size;
        let backoff = Backoff::from(&config.retry);

        // The pipeline keeps its own receiver so a shutdown signalled before `run` starts is
        // still observed.
        let (shutdown_tx, _) = create_shutdown_channel();
        let shutdown_rx = shutdown_tx.subscribe();

        Self {
            config: Arc::new(config),
            detector: ChangeDetector::new(source.clone(), page_size),
            resolver: RootResolver::new(source.clone(), page_size),
            assembler: DocumentAssembler::new(source),
            cursor: Cursor::new(state_store),
            destination,
            backoff,
            schema_ready: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Requests the pipeline to stop at the next page or cycle boundary.
    pub fn shutdown(&self) -> EtlResult<()> {
        self.shutdown_tx.shutdown()
    }

    pub fn cursor(&self) -> &Cursor<S> {
        &self.cursor
    }

    /// Seeds the cursor on first boot.
    ///
    /// Failing here means the pipeline cannot know what was already indexed, so callers must
    /// abort instead of running.
    pub async fn initialize(&self) -> EtlResult<()> {
        let time_of_run = self
            .backoff
            .retry("initialize cursor", || self.cursor.initialize(Utc::now()))
            .await?;

        info!(
            %time_of_run,
            destination = D::name(),
            page_size = self.config.batch.page_size,
            "pipeline initialized"
        );

        Ok(())
    }

    /// Runs the pipeline until a shutdown is requested.
    ///
    /// Cycle failures are logged and the next cycle starts after the poll interval. Only a
    /// failure to initialize the cursor is returned.
    pub async fn run(self) -> EtlResult<()> {
        self.initialize().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            match self.run_once().await {
                Ok(CycleOutcome::Completed {
                    changes,
                    advanced_to,
                }) => {
                    debug!(changes, ?advanced_to, "cycle completed");
                }
                Ok(CycleOutcome::Interrupted) => {
                    info!("cycle interrupted by shutdown");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "cycle failed, retrying at the next poll");
                }
            }

            if is_shutdown_requested(&shutdown_rx) {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("pipeline stopped");

        Ok(())
    }

    /// Runs the initial full load if it is still pending, a polling cycle otherwise.
    pub async fn run_once(&self) -> EtlResult<CycleOutcome> {
        let is_first_run = self
            .backoff
            .retry("read first run flag", || self.cursor.is_first_run())
            .await?;

        if is_first_run {
            self.run_bootstrap().await
        } else {
            self.run_cycle().await
        }
    }

    /// Indexes every film, regardless of the watermark.
    ///
    /// The watermark stays at the instant the first bootstrap attempt started, so any change
    /// made while the full load ran, or between an interrupted attempt and its resumption, is
    /// picked up by the following cycles.
    pub async fn run_bootstrap(&self) -> EtlResult<CycleOutcome> {
        let started_at = self
            .backoff
            .retry("initialize cursor", || self.cursor.initialize(Utc::now()))
            .await?;

        info!(%started_at, "starting initial full load");

        // The watermark seeded by the first attempt doubles as the cycle start.
        let mut cycle = CycleStart {
            at: started_at,
            recorded: true,
            owns_excepted_ids: true,
        };
        let summary = match self
            .sweep(EntityKind::Film, SweepStart::Beginning, &mut cycle)
            .await?
        {
            ShutdownResult::Ok(summary) => summary,
            ShutdownResult::Shutdown(_) => return Ok(CycleOutcome::Interrupted),
        };

        let advanced_to = self
            .backoff
            .retry("advance watermark", || {
                self.cursor.advance_time_of_run(started_at)
            })
            .await?;
        self.backoff
            .retry("complete first run", || self.cursor.complete_first_run())
            .await?;

        info!(
            films = summary.changes,
            documents = summary.documents,
            "initial full load completed"
        );

        Ok(CycleOutcome::Completed {
            changes: summary.changes,
            advanced_to: Some(advanced_to),
        })
    }

    /// Sweeps every kind for changes since the watermark and advances it when any were found.
    ///
    /// The watermark is read once, so every kind of the cycle is swept from the same instant.
    /// A failure in any kind aborts the cycle before the watermark moves. A cycle resuming
    /// an interrupted one advances only to the instant the interrupted cycle started, since
    /// ids it recorded as excepted may have changed again after that instant.
    pub async fn run_cycle(&self) -> EtlResult<CycleOutcome> {
        let watermark = self
            .backoff
            .retry("read watermark", || self.cursor.time_of_run())
            .await?
            .unwrap_or(DateTime::UNIX_EPOCH);
        let persisted_start = self
            .backoff
            .retry("read cycle start", || self.cursor.cycle_started_at())
            .await?;

        let mut cycle = match persisted_start {
            Some(at) => {
                info!(cycle_started_at = %at, "resuming interrupted cycle");
                CycleStart {
                    at,
                    recorded: true,
                    owns_excepted_ids: true,
                }
            }
            // Captured before any query so changes made while the cycle runs stay after the
            // new watermark.
            None => CycleStart {
                at: Utc::now(),
                recorded: false,
                owns_excepted_ids: false,
            },
        };

        debug!(%watermark, cycle_started_at = %cycle.at, "starting cycle");

        let mut changes = 0;
        for kind in EntityKind::SWEEP_ORDER {
            match self
                .sweep(kind, SweepStart::After(watermark), &mut cycle)
                .await?
            {
                ShutdownResult::Ok(summary) => {
                    if summary.changes > 0 {
                        info!(
                            %kind,
                            changes = summary.changes,
                            pages = summary.pages,
                            documents = summary.documents,
                            "sweep completed"
                        );
                    }
                    changes += summary.changes;
                }
                ShutdownResult::Shutdown(_) => return Ok(CycleOutcome::Interrupted),
            }
        }

        if changes == 0 && !cycle.recorded {
            return Ok(CycleOutcome::Completed {
                changes,
                advanced_to: None,
            });
        }

        #[cfg(feature = "failpoints")]
        etl_fail_point(PIPELINE__BEFORE_WATERMARK_ADVANCE)?;

        let advanced_to = self
            .backoff
            .retry("advance watermark", || self.cursor.advance_time_of_run(cycle.at))
            .await?;
        if cycle.recorded {
            self.backoff
                .retry("clear cycle start", || self.cursor.clear_cycle_started_at())
                .await?;
        }

        Ok(CycleOutcome::Completed {
            changes,
            advanced_to: Some(advanced_to),
        })
    }

    /// Pages through every change of `kind` past `start` until none is left.
    ///
    /// Each page is detected, resolved to films, assembled and upserted before its ids are
    /// appended to the excepted ids. Once the kind is drained its excepted ids are reset.
    async fn sweep(
        &self,
        kind: EntityKind,
        start: SweepStart,
        cycle: &mut CycleStart,
    ) -> EtlResult<ShutdownResult<SweepSummary, SweepSummary>> {
        let mut excepted = self
            .backoff
            .retry("read excepted ids", || self.cursor.excepted_ids(kind))
            .await?;

        if !excepted.is_empty() {
            info!(%kind, excepted = excepted.len(), "resuming interrupted sweep");

            // The cycle that recorded these ids left no start behind, so the current
            // watermark is the only instant known to precede their changes.
            if let SweepStart::After(watermark) = start {
                if !cycle.owns_excepted_ids && cycle.at > watermark {
                    self.backoff
                        .retry("record cycle start", || {
                            self.cursor.set_cycle_started_at(watermark)
                        })
                        .await?;
                    cycle.at = watermark;
                    cycle.recorded = true;
                }
            }
        }

        let mut summary = SweepSummary::new(kind, excepted.len());
        loop {
            if is_shutdown_requested(&self.shutdown_rx) {
                return Ok(ShutdownResult::Shutdown(summary));
            }

            let page = self
                .backoff
                .retry("detect changes", || self.detector.detect(kind, start, &excepted))
                .await?;
            if page.exhausted {
                break;
            }

            let roots = self
                .backoff
                .retry("resolve root films", || self.resolver.resolve(kind, &page.ids))
                .await?;
            let documents = self
                .backoff
                .retry("assemble documents", || self.assembler.assemble(&roots))
                .await?;

            // Changes of persons or genres no film references produce no document.
            let document_count = documents.len();
            if document_count > 0 {
                self.ensure_schema().await?;
                self.backoff
                    .retry("upsert documents", || {
                        self.destination.upsert_batch(documents.clone())
                    })
                    .await?;
            }

            #[cfg(feature = "failpoints")]
            etl_fail_point(PIPELINE__AFTER_UPSERT)?;

            if !cycle.recorded {
                let started_at = cycle.at;
                self.backoff
                    .retry("record cycle start", || {
                        self.cursor.set_cycle_started_at(started_at)
                    })
                    .await?;
                cycle.recorded = true;
            }

            // The ids are recorded only now that their documents are stored, so a crash before
            // this point replays the page instead of skipping it.
            excepted = self
                .backoff
                .retry("record excepted ids", || {
                    self.cursor.append_excepted_ids(kind, page.ids.as_slice())
                })
                .await?;

            summary.pages += 1;
            summary.changes += page.ids.len();
            summary.documents += document_count;

            debug!(
                %kind,
                ids = page.ids.len(),
                roots = roots.len(),
                documents = document_count,
                "page written"
            );
        }

        #[cfg(feature = "failpoints")]
        etl_fail_point(PIPELINE__BEFORE_SWEEP_RESET)?;

        self.backoff
            .retry("reset excepted ids", || self.cursor.reset_excepted_ids(kind))
            .await?;

        Ok(ShutdownResult::Ok(summary))
    }

    /// Ensures the destination schema once per pipeline lifetime.
    async fn ensure_schema(&self) -> EtlResult<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        self.backoff
            .retry("ensure destination schema", || {
                self.destination.ensure_schema()
            })
            .await?;
        self.schema_ready.store(true, Ordering::Release);

        Ok(())
    }
}
