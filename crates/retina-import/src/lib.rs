//! # Retina导入模块
//!
//! 批量数据导入与合成数据生成：CSV受试者导入、文件名身份提取、
//! 站点质量画像驱动的随机元数据采样，以及整体导入流水线。

pub mod csv;
pub mod filename;
pub mod pipeline;
pub mod profile;
pub mod sampler;
pub mod store;

#[cfg(test)]
mod testing;

pub use csv::{import_patients, PatientImportCounts};
pub use filename::extract_identity;
pub use pipeline::{ImportConfig, ImportPipeline, ImportReport};
pub use profile::QualityProfile;
pub use sampler::WeightedChoice;
pub use store::ImportStore;
