//! 数据库连接管理

use retina_core::{Result, RetinaError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 数据库连接池
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 根据连接字符串建立连接池
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| RetinaError::Database(e.to_string()))?;

        tracing::info!("Connected to database, max_connections={}", max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
