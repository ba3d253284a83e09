use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coach_controller::{
    api::routes::{self, AppState},
    config::Config,
    orchestrator::{OrchestratorSettings, SessionOrchestrator},
    services::{
        clock::SystemClock,
        llm_bridge_client::{CompletionProvider, LlmBridgeClient},
    },
    storage::{
        self, SeaOrmConversationRepository, SeaOrmIdentityVerifier, SeaOrmRelationshipRepository,
        SeaOrmUsageStore,
    },
};

const RATE_LIMIT_CLEANUP_SECS: u64 = 60;

/// Coaching sessions and weekly message quotas for couples.
#[derive(Parser, Debug)]
#[command(name = "coach-controller", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.coach/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server (default).
    Serve,
    /// Create or update a user and print a fresh bearer token.
    IssueToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        premium: bool,
    },
    /// Write a couple with sample activity for manual testing.
    SeedDemo {
        #[arg(long)]
        couple_id: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        partner_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path, true),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("coach_controller={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = storage::init_db_with_pool(&config.database_url, config.max_connections).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, db).await,
        Commands::IssueToken {
            user_id,
            name,
            premium,
        } => {
            let now = Utc::now();
            SeaOrmRelationshipRepository::new(db.clone())
                .upsert_user(&user_id, Some(&name), premium, now)
                .await?;
            let token = SeaOrmIdentityVerifier::new(db)
                .issue_token(&user_id, now)
                .await?;
            println!("{token}");
            Ok(())
        }
        Commands::SeedDemo {
            couple_id,
            user_id,
            partner_id,
        } => seed_demo(db, &couple_id, &user_id, &partner_id).await,
    }
}

async fn serve(config: Config, db: sea_orm::DatabaseConnection) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let conversations = Arc::new(SeaOrmConversationRepository::with_resume_window(
        db.clone(),
        Duration::hours(config.resume_window_hours),
    ));
    let usage = Arc::new(SeaOrmUsageStore::new(db.clone()));
    let relationships = Arc::new(SeaOrmRelationshipRepository::new(db.clone()));
    let identity = Arc::new(SeaOrmIdentityVerifier::new(db));

    let llm: Option<Arc<dyn CompletionProvider>> = match LlmBridgeClient::from_config(&config)? {
        Some(client) => {
            tracing::info!("LLM configured with model {}", client.model());
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("No LLM API key configured; coach replies will return 503");
            None
        }
    };

    let orchestrator = Arc::new(SessionOrchestrator::new(
        conversations,
        usage,
        relationships,
        llm,
        Arc::new(SystemClock),
        OrchestratorSettings::from(config.as_ref()),
    ));

    let state = AppState::new(config.clone(), orchestrator, identity);

    // Forwarded-for values are client controlled; keep the keyed state bounded.
    let _cleanup = state
        .rate_limiter
        .spawn_cleanup(std::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));

    let app = routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!(
        "Weekly limit: {} messages, resume window: {}h",
        config.weekly_message_limit,
        config.resume_window_hours
    );

    axum::serve(listener, app).await?;

    Ok(())
}

async fn seed_demo(
    db: sea_orm::DatabaseConnection,
    couple_id: &str,
    user_id: &str,
    partner_id: &str,
) -> anyhow::Result<()> {
    let repo = SeaOrmRelationshipRepository::new(db);
    let now = Utc::now();

    repo.upsert_user(user_id, Some("Alex"), false, now).await?;
    repo.upsert_user(partner_id, Some("Jordan"), false, now).await?;
    repo.create_couple(couple_id, user_id, Some(partner_id), now)
        .await?;

    repo.record_health_score(couple_id, 68, now - Duration::days(14))
        .await?;
    repo.record_health_score(couple_id, 61, now - Duration::days(1))
        .await?;
    repo.record_date(
        couple_id,
        "Picnic in the park",
        Some(now - Duration::days(2)),
        None,
    )
    .await?;
    repo.record_flirt(couple_id, user_id, "Thinking of you", now - Duration::hours(5))
        .await?;

    for (days_ago, stress, connection) in [(6, 3, 4), (4, 4, 3), (2, 5, 3), (1, 4, 2)] {
        repo.record_check_in(
            user_id,
            couple_id,
            stress,
            connection,
            None,
            now - Duration::days(days_ago),
        )
        .await?;
    }

    tracing::info!("Seeded demo couple {}", couple_id);
    println!("Seeded couple {couple_id} ({user_id} + {partner_id})");
    Ok(())
}
