//! Applies pending `sqlx` migrations. Grounded on
//! `rootsignal-server/src/bin/run_migrations.rs`'s shape (connect, run,
//! report) with `clap` added the way `rootsignal-server/src/main.rs` takes
//! its flags, so a `--dry-run` can be added later without reworking the
//! entry point.

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hub_common::Config;

#[derive(Parser)]
#[command(name = "hub-migrate", about = "Run pending hub database migrations")]
struct Cli {
    /// Report pending migrations without applying them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hub=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::migrate_from_env();

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;

    let migrator = sqlx::migrate!("./migrations");

    if cli.dry_run {
        let total = migrator.iter().count();
        info!(total, "dry run: not applying migrations");
        return Ok(());
    }

    migrator.run(&pool).await?;
    info!("migrations applied successfully");

    Ok(())
}
