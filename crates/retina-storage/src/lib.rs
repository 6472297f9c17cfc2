//! # Retina存储模块
//!
//! 负责影像文件的落盘管理（主存储目录及可选的Web服务副本）和过曝检测。

pub mod illumination;
pub mod storage;

pub use illumination::is_over_illuminated;
pub use storage::FileStore;
