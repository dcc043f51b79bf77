use chrono::{DateTime, Utc};
use etl::destination::memory::MemoryDestination;
use etl::error::ErrorKind;
use etl::pipeline::CycleOutcome;
use etl::source::memory::{FilmRecord, MemorySource};
use etl::state::cursor::Cursor;
use etl::state::store::StateStore;
use etl::state::store::memory::MemoryStateStore;
use etl::test_utils::destination::{DestinationFaultConfig, FaultInjectingDestination};
use etl::test_utils::faults::{Fault, FaultType};
use etl::test_utils::fixtures::{add_film, add_genre, add_person, instant};
use etl::test_utils::pipeline::create_pipeline;
use etl::test_utils::state_store::{FaultConfig, FaultInjectingStateStore};
use etl::test_utils::test_destination_wrapper::TestDestinationWrapper;
use etl::types::{EntityKind, PersonRef};
use serde_json::json;
use telemetry::tracing::init_test_tracing;
use uuid::Uuid;

/// Seeds the watermark and marks the full load as done, so the next run is a polling cycle.
async fn skip_bootstrap(store: &MemoryStateStore, watermark: DateTime<Utc>) {
    let cursor = Cursor::new(store.clone());
    cursor.initialize(watermark).await.unwrap();
    cursor.complete_first_run().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_then_person_link_updates_the_film_document() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    let film = add_film(&source, "Lonely Film", instant(-10)).await;

    // The watermark of the very first boot.
    Cursor::new(store.clone())
        .initialize(instant(0))
        .await
        .unwrap();

    let pipeline = create_pipeline(source.clone(), store.clone(), destination.clone(), 10);
    pipeline.initialize().await.unwrap();

    let outcome = pipeline.run_once().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes: 1,
            advanced_to: Some(instant(0)),
        }
    );
    assert!(!pipeline.cursor().is_first_run().await.unwrap());

    let document = destination.document(&film).await.unwrap();
    assert_eq!(document.title, "Lonely Film");
    assert!(document.actors.is_empty());
    assert!(document.writers.is_empty());
    assert!(document.genres.is_empty());
    assert_eq!(document.director, None);

    let person = add_person(&source, "New Actor", instant(5)).await;
    source.link_person(film, person, "actor").await;

    let outcome = pipeline.run_once().await.unwrap();
    let CycleOutcome::Completed {
        changes,
        advanced_to,
    } = outcome
    else {
        panic!("cycle was interrupted");
    };
    assert_eq!(changes, 1);
    assert!(advanced_to.unwrap() > instant(5));

    let document = destination.document(&film).await.unwrap();
    assert_eq!(
        document.actors,
        vec![PersonRef {
            id: person,
            name: "New Actor".to_string(),
        }]
    );
    assert_eq!(destination.documents().await.len(), 1);
    assert_eq!(destination.bulk_writes().await, 2);
    assert_eq!(destination.ensure_schema_calls().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn watermark_moves_forward_only_when_changes_are_found() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;
    add_genre(&source, "Drama", instant(1)).await;

    let pipeline = create_pipeline(source.clone(), store.clone(), destination.clone(), 10);

    let first = pipeline.run_cycle().await.unwrap();
    let CycleOutcome::Completed {
        changes: 1,
        advanced_to: Some(first_watermark),
    } = first
    else {
        panic!("expected one change and a new watermark, got {first:?}");
    };
    assert!(first_watermark > instant(0));

    let second = pipeline.run_cycle().await.unwrap();
    assert_eq!(
        second,
        CycleOutcome::Completed {
            changes: 0,
            advanced_to: None,
        }
    );
    assert_eq!(
        pipeline.cursor().time_of_run().await.unwrap(),
        Some(first_watermark)
    );

    // An unreferenced genre is a change even though no document is written for it.
    assert_eq!(destination.bulk_writes().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn genre_change_reindexes_exactly_the_referencing_films() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;

    let comedy_one = add_film(&source, "Comedy One", instant(-5)).await;
    let comedy_two = add_film(&source, "Comedy Two", instant(-5)).await;
    let other = add_film(&source, "Other", instant(-5)).await;
    let comedy = add_genre(&source, "Comedy", instant(3)).await;
    source.link_genre(comedy_one, comedy).await;
    source.link_genre(comedy_two, comedy).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 1);
    pipeline.run_cycle().await.unwrap();

    let documents = destination.documents().await;
    assert_eq!(documents.len(), 2);
    assert!(!documents.contains_key(&other));
    assert_eq!(documents[&comedy_one].genres, vec!["Comedy".to_string()]);
    assert_eq!(documents[&comedy_two].genres, vec!["Comedy".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn sweep_pages_through_all_changes_and_resets_excepted_ids() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;

    for minute in 1..=25 {
        add_film(&source, &format!("Film {minute}"), instant(minute)).await;
    }

    let pipeline = create_pipeline(source, store.clone(), destination.clone(), 10);
    let outcome = pipeline.run_cycle().await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::Completed { changes: 25, .. }
    ));
    assert_eq!(destination.documents().await.len(), 25);
    assert_eq!(destination.bulk_writes().await, 3);

    let snapshot = store.snapshot().await;
    for kind in EntityKind::SWEEP_ORDER {
        assert_eq!(snapshot[&format!("{kind}_excepted_ids")], json!([]));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_sweep_resumes_without_rewriting_recorded_pages() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    skip_bootstrap(&store, instant(0)).await;

    let first_film = add_film(&source, "First", instant(-5)).await;
    let second_film = add_film(&source, "Second", instant(-5)).await;
    let first_person = add_person(&source, "First Person", instant(3)).await;
    let second_person = add_person(&source, "Second Person", instant(4)).await;
    source.link_person(first_film, first_person, "writer").await;
    source.link_person(second_film, second_person, "writer").await;

    // A cycle started at minute 6 wrote the first person's page and crashed before finishing
    // the sweep.
    store
        .set("person_excepted_ids", json!([first_person.to_string()]))
        .await
        .unwrap();
    store
        .set("cycle_started_at", json!(instant(6).to_rfc3339()))
        .await
        .unwrap();

    let pipeline = create_pipeline(source, store.clone(), destination.clone(), 10);
    let outcome = pipeline.run_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes: 2,
            advanced_to: Some(instant(6)),
        }
    );
    assert_eq!(pipeline.cursor().cycle_started_at().await.unwrap(), None);
    let documents = destination.documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[&second_film].writers[0].id, second_person);
    assert!(
        pipeline
            .cursor()
            .excepted_ids(EntityKind::Person)
            .await
            .unwrap()
            .is_empty()
    );
}

/// Sets up a person recorded as excepted by an interrupted cycle, then renamed after it.
///
/// Returns the only film linked to the person.
async fn person_changed_again_after_interrupted_cycle(
    source: &MemorySource,
    store: &MemoryStateStore,
) -> etl::types::EntityId {
    skip_bootstrap(store, instant(0)).await;

    let film = add_film(source, "Linked Film", instant(-5)).await;
    let person = add_person(source, "Old Name", instant(2)).await;
    source.link_person(film, person, "writer").await;

    store
        .set("person_excepted_ids", json!([person.to_string()]))
        .await
        .unwrap();

    source.rename_person(person, "New Name").await;
    assert!(source.touch(EntityKind::Person, person, instant(5)).await);

    film
}

#[tokio::test(flavor = "multi_thread")]
async fn excepted_ids_changed_again_are_reindexed_by_the_next_cycle() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    let film = person_changed_again_after_interrupted_cycle(&source, &store).await;
    store
        .set("cycle_started_at", json!(instant(3).to_rfc3339()))
        .await
        .unwrap();

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    // The resumed cycle skips the excepted person and commits the interrupted cycle's start.
    let outcome = pipeline.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes: 1,
            advanced_to: Some(instant(3)),
        }
    );
    assert!(destination.document(&film).await.is_none());

    pipeline.run_cycle().await.unwrap();
    let document = destination.document(&film).await.unwrap();
    assert_eq!(document.writers[0].name, "New Name");
}

#[tokio::test(flavor = "multi_thread")]
async fn excepted_ids_without_cycle_start_keep_the_watermark() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    let film = person_changed_again_after_interrupted_cycle(&source, &store).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    let outcome = pipeline.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            changes: 1,
            advanced_to: Some(instant(0)),
        }
    );
    assert_eq!(pipeline.cursor().cycle_started_at().await.unwrap(), None);

    pipeline.run_cycle().await.unwrap();
    let document = destination.document(&film).await.unwrap();
    assert_eq!(document.writers[0].name, "New Name");
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_indexes_films_never_modified() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    let dated = add_film(&source, "Dated", instant(-10)).await;
    let undated = Uuid::new_v4();
    source
        .insert_film(FilmRecord {
            id: undated,
            title: "Undated".to_string(),
            description: None,
            rating: None,
            kind: "movie".to_string(),
            created: None,
            modified: None,
        })
        .await;

    let pipeline = create_pipeline(source, store, destination.clone(), 1);
    pipeline.initialize().await.unwrap();
    let outcome = pipeline.run_once().await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::Completed { changes: 2, .. }
    ));
    assert!(destination.document(&dated).await.is_some());
    assert_eq!(destination.document(&undated).await.unwrap().title, "Undated");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_never_reaches_the_destination() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(source, store, destination.clone(), 10);
    pipeline.initialize().await.unwrap();

    let outcome = pipeline.run_once().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Completed { changes: 0, .. }
    ));

    let outcome = pipeline.run_once().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Completed {
            changes: 0,
            advanced_to: None,
        }
    ));

    assert_eq!(destination.bulk_writes().await, 0);
    assert_eq!(destination.ensure_schema_calls().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_destination_failures_are_retried() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = FaultInjectingDestination::wrap(
        MemoryDestination::new(),
        DestinationFaultConfig {
            upsert_batch: Some(Fault::times(FaultType::Transient, 2)),
            ..Default::default()
        },
    );
    skip_bootstrap(&store, instant(0)).await;
    let film = add_film(&source, "Retried", instant(1)).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);
    pipeline.run_cycle().await.unwrap();

    assert_eq!(destination.failed_upserts(), 2);
    assert!(destination.inner().document(&film).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_write_commits_nothing_and_is_replayed_next_cycle() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = FaultInjectingDestination::wrap(
        MemoryDestination::new(),
        DestinationFaultConfig {
            upsert_batch: Some(Fault::times(FaultType::Permanent, 1)),
            ..Default::default()
        },
    );
    skip_bootstrap(&store, instant(0)).await;
    let film = add_film(&source, "Replayed", instant(1)).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    let err = pipeline.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert_eq!(
        pipeline.cursor().time_of_run().await.unwrap(),
        Some(instant(0))
    );
    assert!(
        pipeline
            .cursor()
            .excepted_ids(EntityKind::Film)
            .await
            .unwrap()
            .is_empty()
    );

    let outcome = pipeline.run_cycle().await.unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::Completed { changes: 1, .. }
    ));
    assert!(destination.inner().document(&film).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_transient_failure_gives_up_and_keeps_the_watermark() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = FaultInjectingDestination::wrap(
        MemoryDestination::new(),
        DestinationFaultConfig {
            ensure_schema: Some(Fault::always(FaultType::Transient)),
            ..Default::default()
        },
    );
    skip_bootstrap(&store, instant(0)).await;
    add_film(&source, "Unreachable", instant(1)).await;

    let pipeline = create_pipeline(source, store, destination.clone(), 10);

    let err = pipeline.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DestinationConnectionFailed);
    assert_eq!(
        pipeline.cursor().time_of_run().await.unwrap(),
        Some(instant(0))
    );
    assert!(destination.inner().documents().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_state_store_aborts_startup() {
    init_test_tracing();
    let store = FaultInjectingStateStore::wrap(
        MemoryStateStore::new(),
        FaultConfig {
            get: Some(Fault::always(FaultType::Transient)),
            ..Default::default()
        },
    );

    let pipeline = create_pipeline(
        MemorySource::new(),
        store.clone(),
        MemoryDestination::new(),
        10,
    );

    let err = pipeline.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateStoreConnectionFailed);
    assert!(store.failed_gets() > 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn running_pipeline_indexes_and_stops_on_shutdown() {
    init_test_tracing();
    let source = MemorySource::new();
    let store = MemoryStateStore::new();
    let destination = TestDestinationWrapper::wrap(MemoryDestination::new());
    let first = add_film(&source, "First", instant(1)).await;

    let pipeline = create_pipeline(source.clone(), store, destination.clone(), 10);
    let shutdown_tx = pipeline.shutdown_tx();

    let first_indexed = destination
        .notify_on_documents(move |documents| documents.contains_key(&first))
        .await;
    let handle = tokio::spawn(pipeline.run());
    first_indexed.notified().await;

    // A film modified now is picked up by a later polling cycle.
    let second = add_film(&source, "Second", Utc::now() + chrono::Duration::seconds(1)).await;
    let second_indexed = destination
        .notify_on_documents(move |documents| documents.contains_key(&second))
        .await;
    second_indexed.notified().await;

    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(destination.documents().await.len(), 2);
    assert_eq!(destination.ensure_schema_calls().await, 1);
}
