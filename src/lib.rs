#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod request_logger;
pub mod routes;

use crate::auth::{
    AuthConfig, AuthState, JwtService, PasswordService, PgCredentialStore, RedisSessionStore,
};
use crate::db::StarterkitDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

async fn build_auth_state(rocket: &Rocket<Build>) -> Result<AuthState, String> {
    let pool = StarterkitDb::fetch(rocket)
        .map(|db| (**db).clone())
        .ok_or_else(|| "database pool not available for auth state".to_string())?;

    let config = AuthConfig::from_env().map_err(|err| err.to_string())?;
    let sessions = RedisSessionStore::connect(&config.session_store_url, &config.session_key_prefix)
        .map_err(|err| err.to_string())?;

    if let Err(err) = sessions.ping().await {
        log::warn!(
            "session store at {} is not reachable yet: {}. Logins will fail until it is.",
            config.session_store_url,
            err
        );
    }

    let password_service = PasswordService::new().map_err(|err| err.to_string())?;
    let jwt_service = JwtService::from_config(&config).map_err(|err| err.to_string())?;

    Ok(AuthState::new(
        config,
        password_service,
        jwt_service,
        Arc::new(PgCredentialStore::new(pool)),
        Arc::new(sessions),
    ))
}

pub fn rocket() -> Rocket<Build> {
    init_logger();
    log::info!("Starting Starterkit API Server");

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(StarterkitDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match StarterkitDb::fetch(&rocket) {
                    Some(db) => match db::run_migrations(db).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    },
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            match build_auth_state(&rocket).await {
                Ok(state) => {
                    log::info!(
                        "auth configured: access tokens {}s, refresh tokens {}s",
                        state.config.access_token_ttl_secs,
                        state.config.refresh_token_ttl_secs
                    );
                    Ok(rocket.manage(state))
                }
                Err(err) => {
                    log::error!("failed to initialize authentication: {}", err);
                    Err(rocket)
                }
            }
        }))
        .register("/", error::catchers())
        .mount(
            "/api",
            openapi_get_routes![
                // Health routes
                routes::health::healthy,
                // Auth routes
                auth::routes::issue_token,
                auth::routes::refresh_token,
                auth::routes::current_session,
                auth::routes::signing_keys,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Starterkit API", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, PgPool};

    use crate::auth::{
        AuthConfig, AuthState, JwtService, MemoryCredentialStore, MemorySessionStore,
        PasswordService, UserId,
    };

    pub use database::{TestDatabase, TestDatabaseError};
    pub use redis::TestRedis;

    pub const TEST_JWT_SECRET: &str = "testkey";

    /// Auth configuration with short, distinct lifetimes for assertions.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: TEST_JWT_SECRET.into(),
            issuer: "starterkit-test".into(),
            access_token_ttl_secs: 300,
            refresh_token_ttl_secs: 3000,
            token_leeway_secs: 0,
            session_store_url: "redis://127.0.0.1:6379".into(),
            session_key_prefix: "refresh_token".into(),
            session_store_timeout_ms: 1_000,
        }
    }

    /// Cheap argon2 parameters so tests do not spend seconds hashing.
    pub fn test_password_service() -> PasswordService {
        PasswordService::with_params(1024, 1, 1).expect("test password service")
    }

    /// In-memory auth wiring: credentials and sessions live in the process
    /// and stay inspectable from the test.
    pub struct TestAuth {
        pub state: AuthState,
        pub credentials: Arc<MemoryCredentialStore>,
        pub sessions: Arc<MemorySessionStore>,
        passwords: PasswordService,
    }

    impl TestAuth {
        pub fn new() -> Self {
            Self::with_config(test_auth_config())
        }

        pub fn with_config(config: AuthConfig) -> Self {
            let credentials = Arc::new(MemoryCredentialStore::new());
            let sessions = Arc::new(MemorySessionStore::new(config.session_key_prefix.clone()));
            let passwords = test_password_service();
            let jwt_service = JwtService::from_config(&config).expect("test jwt service");

            let state = AuthState::new(
                config,
                passwords.clone(),
                jwt_service,
                credentials.clone(),
                sessions.clone(),
            );

            Self {
                state,
                credentials,
                sessions,
                passwords,
            }
        }

        /// Register a user whose stored hash matches `password`.
        pub fn add_user(&self, user_id: UserId, username: &str, password: &str) {
            let hash = self
                .passwords
                .hash_password(password)
                .expect("hash test password");
            self.credentials.insert(user_id, username, &hash);
        }
    }

    impl Default for TestAuth {
        fn default() -> Self {
            Self::new()
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::ImageExt;
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral, migrated database inside a disposable Postgres container.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().with_tag("16-alpine").start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let base_options: PgConnectOptions = admin_url.parse()?;
                let admin_options = base_options.log_statements(LevelFilter::Off);

                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;

                let new_db_name = format!("starterkit_{}", Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql).execute(&admin_pool).await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(admin_options.clone().database(&new_db_name))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container: Some(container),
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections, drop the database and stop the container.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database(self.admin_options.clone(), &self.database_name).await?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", database_name);
            sqlx::query(&drop_sql).execute(&admin_pool).await?;
            admin_pool.close().await;
            Ok(())
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                // The container removes itself when dropped; only the pool needs closing.
                if let Some(pool) = self.pool.take() {
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                        });
                    }
                }
            }
        }
    }

    pub mod redis {
        use testcontainers_modules::redis::{REDIS_PORT, Redis};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use uuid::Uuid;

        use crate::auth::{AuthResult, RedisSessionStore};

        /// Disposable Redis server for session store tests.
        pub struct TestRedis {
            url: String,
            _container: ContainerAsync<Redis>,
        }

        impl TestRedis {
            pub async fn start() -> Result<Self, TestcontainersError> {
                let container = Redis::default().start().await?;
                let host = container.get_host().await?;
                let port = container.get_host_port_ipv4(REDIS_PORT).await?;

                Ok(Self {
                    url: format!("redis://{}:{}", host, port),
                    _container: container,
                })
            }

            pub fn url(&self) -> &str {
                &self.url
            }

            /// Session store under a prefix unique to this call.
            pub fn session_store(&self) -> AuthResult<RedisSessionStore> {
                let prefix = format!("refresh_token_test_{}", Uuid::new_v4().simple());
                RedisSessionStore::connect(&self.url, prefix)
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        pg_pool: Option<PgPool>,
        auth_state: Option<AuthState>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                pg_pool: None,
                auth_state: None,
            }
        }

        /// Mount routes under `/api`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api".to_string(), routes));
            self
        }

        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        pub fn manage_auth(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).register("/", crate::error::catchers());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }

    /// Insert a `users` row with an argon2 hash of `password`, returning its id.
    pub async fn insert_user(
        pool: &PgPool,
        passwords: &PasswordService,
        username: &str,
        password: &str,
    ) -> Result<UserId, sqlx::Error> {
        let hash = passwords
            .hash_password(password)
            .map_err(|err| sqlx::Error::Protocol(err.to_string()))?;

        sqlx::query_scalar("INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id")
            .bind(username)
            .bind(hash)
            .fetch_one(pool)
            .await
    }
}
