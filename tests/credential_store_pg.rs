use starterkit_api::auth::{CredentialStore, PgCredentialStore};
use starterkit_api::test_support::{TestDatabase, insert_user, test_password_service};

#[tokio::test]
async fn finds_users_by_exact_username() {
    let test_db = TestDatabase::new()
        .await
        .expect("failed to provision test database");

    let pool = test_db.pool_clone();
    let passwords = test_password_service();
    let user_id = insert_user(&pool, &passwords, "alice", "correct")
        .await
        .expect("insert alice");

    let store = PgCredentialStore::new(pool.clone());

    let record = store
        .find_by_username("alice")
        .await
        .expect("lookup succeeds")
        .expect("alice exists");
    assert_eq!(record.user_id, user_id);
    assert_eq!(record.username, "alice");
    assert!(
        passwords
            .verify_password("correct", &record.password_hash)
            .expect("verify")
    );

    assert!(store.find_by_username("Alice").await.expect("lookup").is_none());
    assert!(store.find_by_username("ghost").await.expect("lookup").is_none());

    drop(store);
    pool.close().await;
    test_db.close().await.expect("failed to drop test database");
}
