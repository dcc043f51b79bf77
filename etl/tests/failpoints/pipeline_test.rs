use chrono::DateTime;
use chrono::Utc;
use etl::destination::memory::MemoryDestination;
use etl::error::ErrorKind;
use etl::failpoints::{
    PIPELINE__AFTER_UPSERT, PIPELINE__BEFORE_SWEEP_RESET, PIPELINE__BEFORE_WATERMARK_ADVANCE,
};
use etl::pipeline::CycleOutcome;
use etl::source::memory::MemorySource;
use etl::state::cursor::Cursor;
use etl::state::store::memory::MemoryStateStore;
use etl::test_utils::failpoints::CustomFailScenario;
use etl::test_utils::fixtures::{add_film, instant};
use etl::test_utils::pipeline::create_pipeline;
use etl::types::EntityKind;
use telemetry::tracing::init_test_tracing;

async fn skip_bootstrap(store: &MemoryStateStore, watermark: DateTime<Utc>) {
    let cursor = Cursor::new(store.clone());
    cursor.initialize(watermark).await.unwrap();
    cursor.complete_first_run().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_after_upsert_replays_the_page() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(PIPELINE__AFTER_UPSERT, "1*return")]);

    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;
    let film = add_film(&source, "Replayed", instant(1)).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    let err = pipeline.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WithPermanentFailure);

    // The document is stored but the page was never recorded.
    assert!(destination.document(&film).await.is_some());
    assert!(
        pipeline
            .cursor()
            .excepted_ids(EntityKind::Film)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        pipeline.cursor().time_of_run().await.unwrap(),
        Some(instant(0))
    );

    let outcome = pipeline.run_cycle().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Completed {
            changes: 1,
            advanced_to: Some(_),
        }
    ));
    assert_eq!(destination.bulk_writes().await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_before_watermark_advance_replays_the_cycle() {
    init_test_tracing();
    let _scenario =
        CustomFailScenario::setup(&[(PIPELINE__BEFORE_WATERMARK_ADVANCE, "1*return")]);

    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;
    add_film(&source, "Replayed", instant(1)).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    pipeline.run_cycle().await.unwrap_err();
    assert_eq!(
        pipeline.cursor().time_of_run().await.unwrap(),
        Some(instant(0))
    );
    assert_eq!(destination.bulk_writes().await, 1);

    let outcome = pipeline.run_cycle().await.unwrap();
    let CycleOutcome::Completed {
        changes: 1,
        advanced_to: Some(advanced_to),
    } = outcome
    else {
        panic!("expected the film to be swept again, got {outcome:?}");
    };
    assert!(advanced_to > instant(1));
    assert_eq!(destination.bulk_writes().await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_before_sweep_reset_skips_recorded_ids() {
    init_test_tracing();
    // Genres and persons are swept before films.
    let _scenario =
        CustomFailScenario::setup(&[(PIPELINE__BEFORE_SWEEP_RESET, "2*off->1*return")]);

    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;
    let film = add_film(&source, "Recorded", instant(1)).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    pipeline.run_cycle().await.unwrap_err();
    let excepted = pipeline
        .cursor()
        .excepted_ids(EntityKind::Film)
        .await
        .unwrap();
    assert_eq!(excepted.as_slice(), &[film]);
    let started_at = pipeline.cursor().cycle_started_at().await.unwrap().unwrap();

    let outcome = pipeline.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes: 1,
            advanced_to: Some(started_at),
        }
    );
    assert_eq!(pipeline.cursor().cycle_started_at().await.unwrap(), None);
    assert_eq!(destination.bulk_writes().await, 1);
    assert!(
        pipeline
            .cursor()
            .excepted_ids(EntityKind::Film)
            .await
            .unwrap()
            .is_empty()
    );
}
