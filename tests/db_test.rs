use varq::db::Db;
use varq::model::{FinishedRecord, NewQueueEntry, OptionValue, Outcome, Variant};

fn entry(color: &str) -> NewQueueEntry {
    let mut variant = Variant::new();
    variant.set("Color", OptionValue::from(color));
    NewQueueEntry::from_variant(&variant).unwrap()
}

#[tokio::test]
async fn opens_file_and_migrates_twice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("varq.db");

    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();
    db.migrate().await.unwrap();
    assert!(db.health_check().await.is_ok());
    assert!(path.exists());
    db.close().await;
}

#[tokio::test]
async fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("varq.db");

    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();
    assert!(db.append(&entry("Red")).await.unwrap());
    assert!(db.append(&entry("Blue")).await.unwrap());
    db.close().await;

    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();
    assert_eq!(db.queue_len().await.unwrap(), 2);
    assert!(!db.append(&entry("Red")).await.unwrap());

    let claimed = db.claim_batch(10).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert!(claimed[0].id < claimed[1].id);
    assert_eq!(claimed[0].payload, r#"{"Color":"Red"}"#);
    assert!(db.claim_batch(10).await.unwrap().is_empty());
    db.close().await;
}

#[tokio::test]
async fn uncommitted_appends_are_not_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("varq.db");

    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();

    let mut tx = db.begin_append().await.unwrap();
    tx.append(&entry("Red")).await.unwrap();
    tx.append(&entry("Green")).await.unwrap();
    assert_eq!(tx.appended(), 2);
    drop(tx);

    assert_eq!(db.queue_len().await.unwrap(), 0);
    db.close().await;
}

#[tokio::test]
async fn finished_records_persist_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("varq.db");

    let db = Db::open(&path).await.unwrap();
    db.migrate().await.unwrap();
    let written = db
        .record_finished(&[
            FinishedRecord::new(
                2,
                Outcome::Success {
                    status: 200,
                    body: "{}".to_string(),
                },
            ),
            FinishedRecord::new(1, Outcome::Timeout),
        ])
        .await
        .unwrap();
    assert_eq!(written, 2);
    db.close().await;

    let db = Db::open(&path).await.unwrap();
    let records = db.finished_records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 1);
    assert_eq!(records[0].outcome, Outcome::Timeout);
    assert!(records[1].outcome.is_success());
    db.close().await;
}
