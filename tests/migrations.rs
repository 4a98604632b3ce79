use sqlx::migrate::Migrator;
use starterkit_api::test_support::TestDatabase;

static TEST_MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn users_table_count(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public' AND table_name = 'users'",
    )
    .fetch_one(pool)
    .await
    .expect("lookup succeeded")
}

#[tokio::test]
async fn migrations_apply_and_revert_cleanly() {
    let test_db = TestDatabase::new()
        .await
        .expect("failed to provision test database");

    let pool = test_db.pool_clone();

    TEST_MIGRATOR.run(&pool).await.expect("migrations run");
    TEST_MIGRATOR.undo(&pool, 0).await.expect("migrations revert");

    assert_eq!(users_table_count(&pool).await, 0, "users should be dropped after revert");

    TEST_MIGRATOR.run(&pool).await.expect("migrations rerun");
    assert_eq!(users_table_count(&pool).await, 1);

    test_db.close().await.expect("failed to drop test database");
}
