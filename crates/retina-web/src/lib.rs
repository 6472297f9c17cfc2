//! # Retina Web模块
//!
//! HTTP服务层：受试者/站点/影像的CRUD接口、影像上传和仪表盘统计API。

pub mod dashboard;
pub mod handlers;
pub mod server;
pub mod validation;

pub use server::{AppState, WebServer};
