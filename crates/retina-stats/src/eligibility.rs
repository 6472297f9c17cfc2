//! 可用性判定
//!
//! 一名受试者在某站点"可用于自动分析"，当且仅当其在该站点的影像中
//! 左右眼各存在至少一张合格影像。

use retina_core::models::{AnatomyScore, EyeSide, Image, QualityScore};

/// 单张影像是否合格
///
/// 三个条件须同时满足：质量评分为HIGH或ACCEPTABLE，解剖评分为GOOD或
/// ACCEPTABLE，且未过曝。未评分（None）视为不合格。
pub fn is_qualifying(image: &Image) -> bool {
    let quality_ok = match image.quality_score {
        Some(QualityScore::High) | Some(QualityScore::Acceptable) => true,
        Some(QualityScore::Low) | None => false,
    };

    let anatomy_ok = match image.anatomy_score {
        Some(AnatomyScore::Good) | Some(AnatomyScore::Acceptable) => true,
        Some(AnatomyScore::Poor) | None => false,
    };

    quality_ok && anatomy_ok && !image.over_illuminated
}

/// 受试者在单一站点范围内是否可用
///
/// 入参须已按站点过滤。每只眼只要求至少一张影像合格；某只眼完全没有
/// 影像等价于该眼不达标。
pub fn is_patient_available(images: &[Image]) -> bool {
    let left_ok = images
        .iter()
        .any(|img| img.eye_side == EyeSide::Left && is_qualifying(img));
    let right_ok = images
        .iter()
        .any(|img| img.eye_side == EyeSide::Right && is_qualifying(img));

    left_ok && right_ok
}
