use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    create_users_table(pool).await?;
    create_attendance_records_table(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            discord_id TEXT UNIQUE NOT NULL,
            username TEXT NOT NULL,
            full_name TEXT,
            role TEXT NOT NULL DEFAULT 'employee' CHECK (role IN ('employee', 'manager')),
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            is_registered BOOLEAN NOT NULL DEFAULT FALSE,
            work_start_time TEXT NOT NULL,
            work_end_time TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_attendance_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance_records (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            date DATE NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'present', 'absent', 'on_the_way')),
            check_in_time DATETIME,
            check_out_time DATETIME,
            check_in_latitude REAL,
            check_in_longitude REAL,
            is_within_office_radius BOOLEAN NOT NULL DEFAULT FALSE,
            absence_reason TEXT,
            estimated_arrival_time DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE (user_id, date),
            CHECK (check_out_time IS NULL OR check_in_time IS NOT NULL),
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_date ON attendance_records (date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
