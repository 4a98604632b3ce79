use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use starterkit_api::auth::passwords::PasswordService;

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Create a user account that can log in")]
struct Args {
    /// Username to log in with (case sensitive).
    #[arg(long)]
    username: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let username = args.username.trim();

    if username.is_empty() || args.password.is_empty() {
        writeln!(io::stderr(), "error: username and password must not be empty")?;
        std::process::exit(1);
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(username)
        .fetch_one(&pool)
        .await?;

    if existing > 0 {
        writeln!(
            io::stderr(),
            "error: a user named '{username}' already exists."
        )?;
        std::process::exit(1);
    }

    let password_service = PasswordService::new()
        .map_err(|err| io::Error::other(format!("argon2 init failed: {err}")))?;
    let password_hash = password_service
        .hash_password(&args.password)
        .map_err(|err| io::Error::other(format!("password hash failed: {err}")))?;

    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(&pool)
    .await?;

    log::info!("created user '{}' with id {}", username, user_id);
    println!("Created user '{username}' with id {user_id}");
    Ok(())
}
