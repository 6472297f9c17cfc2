//! # Retina统计模块
//!
//! 仪表盘统计的核心：可用性判定与站点/影像质量聚合。
//! 所有计算都是对已物化数据集合的纯函数，不持有状态、不产生副作用。

pub mod eligibility;
pub mod statistics;

pub use eligibility::{is_patient_available, is_qualifying};
pub use statistics::{
    image_quality_statistics, site_statistics, AnatomyDistribution, IlluminationDistribution,
    ImageQualityStatistics, QualityDistribution, SiteStatistics,
};
