//! 影像过曝检测
//!
//! 固定亮度阈值的逐像素扫描：任一像素的感知亮度超过阈值即判定过曝。

use retina_core::{Result, RetinaError};
use std::path::Path;

const PX_MAX_VALUE: f32 = 255.0;

/// 默认亮度阈值
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// 检测影像是否过曝
pub fn is_over_illuminated(path: &Path, threshold: f32) -> Result<bool> {
    let img = image::open(path)
        .map_err(|e| RetinaError::Storage(format!("无法解码影像 {}: {}", path.display(), e)))?
        .to_rgb8();

    Ok(img.pixels().any(|px| luminance(px.0) > threshold))
}

/// 感知亮度，权重对应人眼对RGB分量的敏感度
fn luminance([r, g, b]: [u8; 3]) -> f32 {
    (0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32) / PX_MAX_VALUE
}
