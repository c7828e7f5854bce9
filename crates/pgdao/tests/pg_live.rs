//! Record store against a live PostgreSQL server.
//!
//! Skipped unless `DATABASE_URL` is set (a `.env` file is honored).

#![cfg(feature = "pool")]

use pgdao::{
    Condition, DaoResult, Entity, PgEngine, PlanRequest, PoolConfig, RecordStore, SortDirection,
};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Entity)]
#[dao(table = "pgdao_live_notes", name = "LiveNote")]
struct LiveNote {
    #[dao(id)]
    id: Option<i64>,
    tag: String,
    body: Option<String>,
    created_at: chrono::NaiveDateTime,
}

fn note(tag: &str, body: Option<&str>) -> LiveNote {
    LiveNote {
        id: None,
        tag: tag.to_string(),
        body: body.map(str::to_string),
        created_at: chrono::Local::now().naive_local(),
    }
}

#[tokio::test]
async fn crud_round_trip() -> DaoResult<()> {
    dotenvy::dotenv().ok();
    let config = match PoolConfig::from_env() {
        Ok(config) => config,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping crud_round_trip");
            return Ok(());
        }
    };

    let engine = PgEngine::connect(&config.max_size(2))?;
    let client = engine.pool().get().await?;
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS pgdao_live_notes (
                id BIGSERIAL PRIMARY KEY,
                tag TEXT NOT NULL,
                body TEXT,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .await?;
    drop(client);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let tag = format!("t{}_{nanos}", std::process::id());
    let store: RecordStore<LiveNote, _> = RecordStore::new(engine.clone());

    let first = store.create(note(&tag, Some("alpha"))).await?;
    let second = store.create(note(&tag, None)).await?;
    assert!(first.id.is_some() && second.id.is_some());
    let found = store
        .find_by_id(first.id.unwrap())
        .await?
        .expect("created row is readable");
    assert_eq!((found.tag.as_str(), found.body.as_deref()), (tag.as_str(), Some("alpha")));

    let rows = store
        .query(
            &PlanRequest::new("LiveNote")
                .condition(Condition::eq("tag", tag.as_str()))
                .condition(Condition::is_null("body"))
                .order_by("id", SortDirection::Desc)
                .limit(10),
        )
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, second.id);

    assert_eq!(
        store
            .count_where(vec![Condition::eq("tag", tag.as_str())])
            .await?,
        2
    );
    let today = store.find_created_today("created_at").await?;
    assert_eq!(today.iter().filter(|n| n.tag == tag).count(), 2);

    assert!(store.delete_by_id(first.id.unwrap()).await?);
    assert!(!store.delete_by_id(first.id.unwrap()).await?);
    assert_eq!(store.delete_by_field("tag", tag.as_str()).await?, 1);
    Ok(())
}
