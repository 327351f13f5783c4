//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `fieldsync_core` linkage against a file-backed SQLite queue.
//! - Run the offline submit, reconnect, flush scenario and print one
//!   `key=value` line per step.
//!
//! Usage: `fieldsync_cli [queue-db-path]`. Defaults to a file in the
//! system temp directory.

use fieldsync_core::{
    EngineConfig, FormType, InMemoryRecordRepository, RecordDate, RecordKey, SqliteKeyValueStore,
    SubjectId, SubmissionResult, SyncEngine, SyncNotice,
};
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("fieldsync_core ping={}", fieldsync_core::ping());
    println!("fieldsync_core version={}", fieldsync_core::core_version());

    let db_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("fieldsync-smoke.sqlite3"));
    let store = Arc::new(SqliteKeyValueStore::open(&db_path)?);
    let repo = InMemoryRecordRepository::new();

    let config = EngineConfig {
        stability_window_ms: 50,
        periodic_flush_secs: None,
        ..EngineConfig::default()
    };
    let engine = SyncEngine::builder()
        .config(config)
        .store(store)
        .repository(Arc::new(repo.clone()))
        .initially_online(false)
        .build()?;
    let mut notices = engine.coordinator().subscribe_notices();
    let (reachability, source) = mpsc::channel(8);
    engine.start(source);
    println!("step=start queue_db={}", db_path.display());

    let date: RecordDate = "2024-01-01".parse()?;
    let outcome = engine
        .service()
        .submit_json(
            FormType::FoodMonitoring,
            "S1",
            date,
            json!({ "temperature": 24, "leftoverFood": "1/2" }),
        )
        .await?;
    let key = RecordKey::new(FormType::FoodMonitoring, date, SubjectId::parse("S1")?);
    match &outcome {
        SubmissionResult::Queued(entry) => println!(
            "step=submit outcome=queued key={} submission_id={}",
            key, entry.record.submission_id
        ),
        SubmissionResult::DuplicateSubmission { reason, .. } => println!(
            "step=submit outcome=duplicate key={} reason={}",
            key,
            reason.as_str()
        ),
        other => println!("step=submit outcome=unexpected detail={:?}", other),
    }
    println!(
        "step=pending count={}",
        engine.service().pending_count().await?
    );

    reachability.send(true).await?;
    match tokio::time::timeout(Duration::from_secs(5), notices.recv()).await {
        Ok(Ok(SyncNotice::Synced { key, .. })) => println!("step=flush outcome=synced key={}", key),
        Ok(Ok(notice)) => println!("step=flush outcome=other detail={:?}", notice),
        Ok(Err(err)) => println!("step=flush outcome=error error={}", err),
        Err(_) => println!("step=flush outcome=timeout"),
    }
    println!(
        "step=remote writes={} pending={}",
        repo.write_count(&key.path()),
        engine.service().pending_count().await?
    );

    engine.shutdown();
    Ok(())
}
