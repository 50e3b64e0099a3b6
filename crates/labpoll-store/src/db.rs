use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::time::Duration;
use tracing::info;

/// 设备表
pub const DEVICES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    ip_address TEXT NOT NULL,
    port INTEGER NOT NULL,
    label TEXT,
    device_type TEXT NOT NULL,
    refresh_rate INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (ip_address, port)
)
"#;

/// 建立数据库连接池
///
/// SQLite 下打开外键约束，级联删除依赖它
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(max_connections.max(1))
        .min_connections(1)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;

    if db.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            "PRAGMA foreign_keys = ON".to_string(),
        ))
        .await?;
    }

    info!(database_url = %database_url, max_connections, "Connected to measurement store");
    Ok(db)
}

/// 创建设备表（幂等）
pub async fn create_devices_table(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        DEVICES_TABLE.to_string(),
    ))
    .await?;
    Ok(())
}
