use rocket_db_pools::sqlx::{self, PgPool};
use rocket_db_pools::Database;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Database)]
#[database("starterkit_db")]
pub struct StarterkitDb(sqlx::PgPool);

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
