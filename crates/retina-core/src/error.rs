//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum RetinaError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("验证错误: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("导入错误: {0}")]
    Import(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl RetinaError {
    /// 单条消息的验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        RetinaError::Validation(vec![message.into()])
    }
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, RetinaError>;
