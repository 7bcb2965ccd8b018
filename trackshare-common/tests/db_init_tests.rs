//! Database initialization tests

use tempfile::TempDir;
use trackshare_common::db::init::{init_database, init_schema};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("trackshare.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_schema_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("trackshare.db");

    let pool = init_database(&db_path).await.unwrap();
    init_schema(&pool).await.expect("second schema pass should be a no-op");
    drop(pool);

    // Reopening an existing database also succeeds
    init_database(&db_path).await.expect("reopen existing database");
}

#[tokio::test]
async fn test_expected_tables_exist() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("trackshare.db")).await.unwrap();

    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();

    for expected in [
        "accounts",
        "processed_events",
        "storage_orphans",
        "stored_objects",
        "sweep_leases",
        "tracks",
    ] {
        assert!(names.contains(&expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_tier_check_constraint() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("trackshare.db")).await.unwrap();

    let bad = sqlx::query("INSERT INTO accounts (id, tier) VALUES ('a1', 'GOLD')")
        .execute(&pool)
        .await;
    assert!(bad.is_err(), "unknown tier must be rejected by the schema");

    let good = sqlx::query("INSERT INTO accounts (id) VALUES ('a2')")
        .execute(&pool)
        .await;
    assert!(good.is_ok());

    let tier: String = sqlx::query_scalar("SELECT tier FROM accounts WHERE id = 'a2'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tier, "FREE");
}

#[tokio::test]
async fn test_billing_customer_id_is_unique() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("trackshare.db")).await.unwrap();

    sqlx::query("INSERT INTO accounts (id, billing_customer_id) VALUES ('a1', 'cus_1')")
        .execute(&pool)
        .await
        .unwrap();
    let dup = sqlx::query("INSERT INTO accounts (id, billing_customer_id) VALUES ('a2', 'cus_1')")
        .execute(&pool)
        .await;
    assert!(dup.is_err());
}
