use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use std::time::Duration;

const MIGRATIONS: [(&str, &str); 5] = [
    (
        "001_create_users",
        include_str!("../../migrations/001_create_users.sql"),
    ),
    (
        "002_create_conversations",
        include_str!("../../migrations/002_create_conversations.sql"),
    ),
    (
        "003_create_messages",
        include_str!("../../migrations/003_create_messages.sql"),
    ),
    (
        "004_create_weekly_usage",
        include_str!("../../migrations/004_create_weekly_usage.sql"),
    ),
    (
        "005_create_activity",
        include_str!("../../migrations/005_create_activity.sql"),
    ),
];

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    init_db_with_pool(database_url, 10).await
}

pub async fn init_db_with_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", database_url);

    let mut options = if database_url == "sqlite::memory:" {
        // Each pooled connection would otherwise get its own empty database.
        let mut opts = ConnectOptions::new(database_url);
        opts.max_connections(1);
        opts
    } else if let Some(path_str) = database_url.strip_prefix("sqlite://") {
        let path_str = path_str.split('?').next().unwrap_or(path_str);
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbErr::Custom(format!("Failed to create DB directory: {}", e)))?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        if !path.exists() {
            std::fs::File::create(path)
                .map_err(|e| DbErr::Custom(format!("Failed to create DB file: {}", e)))?;
            tracing::info!("Created database file: {}", path.display());
        }

        let mut opts = ConnectOptions::new(database_url);
        opts.max_connections(max_connections);
        opts
    } else {
        return Err(DbErr::Custom("Invalid SQLite URL format".to_string()));
    };

    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?;

    apply_schema(&db).await?;

    Ok(db)
}

/// Every statement is `IF NOT EXISTS`, so this is safe on every boot.
async fn apply_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    tracing::info!("Applying schema...");

    for (name, sql) in MIGRATIONS.iter() {
        db.execute_unprepared(sql).await?;
        tracing::debug!("Applied migration {}", name);
    }

    Ok(())
}
