use fieldsync_core::{
    AliveStatus, AmendError, DailyRecord, EligibilityReason, EngineConfig, FeedingObservation,
    FoodMonitoringObservation, FoodPortion, FormPayload, FormType, InMemoryRecordRepository,
    KeyValueStore, MemoryKeyValueStore, MonitoredSubject, RecordDate, RecordKey, RecordOrigin,
    SubjectId, SubmissionError, SubmissionResult, SubmissionState, SyncEngine,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn engine(store: Arc<dyn KeyValueStore>, repo: &InMemoryRecordRepository, online: bool) -> SyncEngine {
    SyncEngine::builder()
        .config(EngineConfig {
            periodic_flush_secs: None,
            ..EngineConfig::default()
        })
        .store(store)
        .repository(Arc::new(repo.clone()))
        .initially_online(online)
        .build()
        .unwrap()
}

fn set_online(engine: &SyncEngine, online: bool) {
    let now = Instant::now();
    engine.monitor().observe(online, now);
    engine.monitor().poll(now + Duration::from_secs(5));
    assert_eq!(engine.monitor().is_online(), online);
}

fn date() -> RecordDate {
    "2024-01-01".parse().unwrap()
}

fn key(subject: &str) -> RecordKey {
    RecordKey::new(FormType::FoodMonitoring, date(), SubjectId::parse(subject).unwrap())
}

fn food(temperature: f64) -> FormPayload {
    FormPayload::FoodMonitoring(FoodMonitoringObservation {
        temperature,
        leftover_food: Some(FoodPortion::Quarter),
        notes: None,
    })
}

#[tokio::test]
async fn offline_submission_syncs_after_reconnect_and_blocks_duplicates() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, false);
    let service = engine.service();

    let queued = service
        .submit_json(FormType::FoodMonitoring, "S1", date(), json!({ "temperature": 24 }))
        .await
        .unwrap();
    let SubmissionResult::Queued(entry) = queued else {
        panic!("expected Queued, got {queued:?}");
    };
    assert_eq!(repo.total_writes(), 0);
    assert_eq!(service.pending_count().await.unwrap(), 1);
    assert_eq!(
        service.submission_state(&key("S1")).map(|t| t.state),
        Some(SubmissionState::QueuedOffline)
    );

    set_online(&engine, true);
    let report = engine.coordinator().flush().await.unwrap();
    assert_eq!(report.synced, vec![key("S1")]);

    let stored: DailyRecord =
        serde_json::from_value(repo.snapshot("food-monitoring/2024-01-01/S1").unwrap()).unwrap();
    assert_eq!(stored.submission_id, entry.record.submission_id);
    assert_eq!(stored.origin, RecordOrigin::Synced);
    assert!(!service.has_pending().await.unwrap());
    assert_eq!(
        service.submission_state(&key("S1")).map(|t| t.state),
        Some(SubmissionState::Synced)
    );

    let again = service
        .submit(FormType::FoodMonitoring, "S1", date(), food(25.0))
        .await
        .unwrap();
    assert_eq!(
        again,
        SubmissionResult::DuplicateSubmission {
            key: key("S1"),
            reason: EligibilityReason::AlreadySynced,
        }
    );
    assert_eq!(repo.write_count("food-monitoring/2024-01-01/S1"), 1);
}

#[tokio::test]
async fn online_submission_writes_directly_and_mirrors_temperature() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);

    let result = engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();
    let SubmissionResult::Synced(record) = result else {
        panic!("expected Synced, got {result:?}");
    };
    assert_eq!(record.origin, RecordOrigin::Synced);
    assert_eq!(repo.write_count("food-monitoring/2024-01-01/S1"), 1);
    assert_eq!(engine.service().pending_count().await.unwrap(), 0);

    let mirrored = repo
        .snapshot("temperature-history/food-monitoring/2024-01-01/S1")
        .unwrap();
    assert_eq!(mirrored["temperature"], json!(24.0));
}

#[tokio::test]
async fn feeding_records_are_not_mirrored() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);

    engine
        .service()
        .submit(
            FormType::Feeding,
            "S1",
            date(),
            FormPayload::Feeding(FeedingObservation {
                feeding_details: "2 rats".to_string(),
                health_status: "active".to_string(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(repo.paths(), vec!["feeding/2024-01-01/S1".to_string()]);
}

#[tokio::test]
async fn second_offline_submission_for_same_key_is_rejected_locally() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, false);
    let service = engine.service();

    service
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();
    let second = service
        .submit(FormType::FoodMonitoring, "S1", date(), food(26.0))
        .await
        .unwrap();

    assert_eq!(
        second,
        SubmissionResult::DuplicateSubmission {
            key: key("S1"),
            reason: EligibilityReason::AlreadyQueued,
        }
    );
    let entries = service.pending_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record.payload.temperature(), Some(24.0));

    // A different form type for the same subject and day is its own slot.
    let other_form = service
        .submit(
            FormType::Feeding,
            "S1",
            date(),
            FormPayload::Feeding(FeedingObservation {
                feeding_details: "chicks".to_string(),
                health_status: "ok".to_string(),
            }),
        )
        .await
        .unwrap();
    assert!(matches!(other_form, SubmissionResult::Queued(_)));
}

#[tokio::test]
async fn validation_errors_list_every_field_and_queue_nothing() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, false);
    let service = engine.service();

    let result = service
        .submit_json(
            FormType::EnclosureMonitoring,
            "S1",
            date(),
            json!({ "temperature": 99, "humidity": 140, "health": "" }),
        )
        .await
        .unwrap();
    let SubmissionResult::ValidationError(errors) = result else {
        panic!("expected ValidationError, got {result:?}");
    };
    assert_eq!(errors.field_names(), vec!["temperature", "humidity", "health"]);

    let bad_subject = service
        .submit(FormType::FoodMonitoring, "S1/../S2", date(), food(20.0))
        .await
        .unwrap();
    let SubmissionResult::ValidationError(errors) = bad_subject else {
        panic!("expected ValidationError, got {bad_subject:?}");
    };
    assert_eq!(errors.field_names(), vec!["subjectId"]);

    let wrong_form = service
        .submit(FormType::Feeding, "S1", date(), food(20.0))
        .await
        .unwrap();
    assert!(matches!(wrong_form, SubmissionResult::ValidationError(_)));

    assert_eq!(service.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn offline_submission_never_waits_on_the_network() {
    let repo = InMemoryRecordRepository::new();
    repo.set_latency(Duration::from_secs(30));
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, false);

    let result = tokio::time::timeout(
        Duration::from_millis(500),
        engine
            .service()
            .submit(FormType::FoodMonitoring, "S1", date(), food(24.0)),
    )
    .await
    .expect("offline submit must not touch the remote store")
    .unwrap();
    assert!(matches!(result, SubmissionResult::Queued(_)));
}

#[tokio::test]
async fn failed_direct_write_degrades_to_queue() {
    let repo = InMemoryRecordRepository::new();
    repo.fail_writes_to("food-monitoring/2024-01-01/S1");
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);

    let result = engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();
    assert!(matches!(result, SubmissionResult::Queued(_)));
    assert_eq!(repo.write_count("food-monitoring/2024-01-01/S1"), 0);

    repo.clear_write_failures();
    let report = engine.coordinator().flush().await.unwrap();
    assert_eq!(report.synced, vec![key("S1")]);
    assert_eq!(repo.write_count("food-monitoring/2024-01-01/S1"), 1);
}

#[tokio::test]
async fn unreachable_remote_while_online_still_accepts_submission() {
    let repo = InMemoryRecordRepository::new();
    repo.set_reachable(false);
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);

    let result = engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();
    assert!(matches!(result, SubmissionResult::Queued(_)));
}

#[tokio::test]
async fn unreadable_remote_slot_is_queued_and_never_overwritten() {
    let repo = InMemoryRecordRepository::new();
    let other_device = json!({ "fromOtherDevice": true });
    repo.seed("food-monitoring/2024-01-01/S1", other_device.clone());
    repo.fail_reads_from("food-monitoring/2024-01-01/S1");
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);

    let result = engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();
    assert!(matches!(result, SubmissionResult::Queued(_)), "{result:?}");
    assert_eq!(repo.write_count("food-monitoring/2024-01-01/S1"), 0);
    assert_eq!(
        repo.snapshot("food-monitoring/2024-01-01/S1"),
        Some(other_device.clone())
    );

    repo.clear_read_failures();
    let report = engine.coordinator().flush().await.unwrap();
    assert_eq!(report.superseded, vec![key("S1")]);
    assert_eq!(
        repo.snapshot("food-monitoring/2024-01-01/S1"),
        Some(other_device)
    );
    assert_eq!(engine.service().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn json_submission_names_each_missing_field() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);

    let result = engine
        .service()
        .submit_json(FormType::EnclosureMonitoring, "S1", date(), json!({}))
        .await
        .unwrap();
    let SubmissionResult::ValidationError(errors) = result else {
        panic!("expected ValidationError, got {result:?}");
    };
    assert_eq!(errors.field_names(), vec!["temperature", "humidity", "health"]);
    assert_eq!(repo.total_writes(), 0);
    assert_eq!(engine.service().pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn local_storage_failure_is_surfaced() {
    let repo = InMemoryRecordRepository::new();
    let store = Arc::new(MemoryKeyValueStore::new());
    store.set_fail_writes(true);
    let engine = engine(store, &repo, false);

    let err = engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Storage(_)));
    assert_eq!(
        engine.service().submission_state(&key("S1")).map(|t| t.state),
        Some(SubmissionState::Rejected)
    );
}

#[tokio::test]
async fn amend_rewrites_synced_record_in_place() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);
    let service = engine.service();

    let SubmissionResult::Synced(original) = service
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap()
    else {
        panic!("expected Synced");
    };

    let amended = service.amend(&key("S1"), food(21.5)).await.unwrap();
    assert_eq!(amended.submission_id, original.submission_id);
    assert_eq!(amended.submitted_at, original.submitted_at);
    assert!(amended.amended_at.is_some());
    assert_eq!(repo.write_count("food-monitoring/2024-01-01/S1"), 2);

    let stored: DailyRecord =
        serde_json::from_value(repo.snapshot("food-monitoring/2024-01-01/S1").unwrap()).unwrap();
    assert_eq!(stored.payload.temperature(), Some(21.5));

    let missing = service.amend(&key("S2"), food(20.0)).await.unwrap_err();
    assert!(matches!(missing, AmendError::NotFound(_)));

    let invalid = service.amend(&key("S1"), food(80.0)).await.unwrap_err();
    assert!(matches!(invalid, AmendError::Validation(_)));

    set_online(&engine, false);
    let offline = service.amend(&key("S1"), food(20.0)).await.unwrap_err();
    assert!(matches!(offline, AmendError::Offline));
}

#[tokio::test]
async fn watch_record_observes_flush() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, false);
    let seen_present = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen_present);

    let subscription = engine
        .service()
        .watch_record(
            &key("S1"),
            Arc::new(move |value| {
                if value.is_some() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();
    assert_eq!(seen_present.load(Ordering::SeqCst), 0);

    engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();
    set_online(&engine, true);
    engine.coordinator().flush().await.unwrap();
    assert_eq!(seen_present.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
}

#[tokio::test]
async fn daily_report_reads_synced_slots() {
    let repo = InMemoryRecordRepository::new();
    let engine = engine(Arc::new(MemoryKeyValueStore::new()), &repo, true);
    engine
        .service()
        .submit(FormType::FoodMonitoring, "S1", date(), food(24.0))
        .await
        .unwrap();

    let subjects: Vec<MonitoredSubject> = ["S1", "S2"]
        .into_iter()
        .map(|id| MonitoredSubject {
            id: SubjectId::parse(id).unwrap(),
            name: format!("Cat {id}"),
            species: "Lion".to_string(),
            group_section: "BigCats".to_string(),
            alive_status: AliveStatus::Alive,
        })
        .collect();
    let report = engine
        .daily_report(FormType::FoodMonitoring, date(), &subjects)
        .await
        .unwrap();

    assert_eq!(report.recorded_count(), 1);
    let text = report.render_text();
    assert!(text.contains("Cat S1 (Lion)\nTemperature: 24°C\nLeftover Food: 1/4\n"));
    assert!(text.contains("Cat S2 (Lion)\nNot recorded\n"));
}
