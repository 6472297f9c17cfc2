//! 站点质量画像
//!
//! 每个画像定义质量评分、解剖评分的加权分布以及过曝概率，
//! 用于为站点生成贴近真实的合成影像元数据。画像只在单次导入
//! 运行期间有效，从不持久化。

use rand::seq::SliceRandom;
use rand::Rng;
use retina_core::models::{AnatomyScore, QualityScore};

/// 站点质量画像
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityProfile {
    High,
    Medium,
    Low,
}

impl QualityProfile {
    /// 质量评分分布，None表示未评分
    pub fn quality_weights(&self) -> Vec<(Option<QualityScore>, f64)> {
        match self {
            QualityProfile::High => vec![
                (Some(QualityScore::High), 0.7),
                (Some(QualityScore::Acceptable), 0.25),
                (Some(QualityScore::Low), 0.05),
            ],
            QualityProfile::Medium => vec![
                (Some(QualityScore::High), 0.3),
                (Some(QualityScore::Acceptable), 0.45),
                (Some(QualityScore::Low), 0.15),
                (None, 0.1),
            ],
            QualityProfile::Low => vec![
                (Some(QualityScore::High), 0.1),
                (Some(QualityScore::Acceptable), 0.3),
                (Some(QualityScore::Low), 0.45),
                (None, 0.15),
            ],
        }
    }

    /// 解剖评分分布
    pub fn anatomy_weights(&self) -> Vec<(Option<AnatomyScore>, f64)> {
        match self {
            QualityProfile::High => vec![
                (Some(AnatomyScore::Good), 0.7),
                (Some(AnatomyScore::Acceptable), 0.25),
                (Some(AnatomyScore::Poor), 0.05),
            ],
            QualityProfile::Medium => vec![
                (Some(AnatomyScore::Good), 0.3),
                (Some(AnatomyScore::Acceptable), 0.45),
                (Some(AnatomyScore::Poor), 0.15),
                (None, 0.1),
            ],
            QualityProfile::Low => vec![
                (Some(AnatomyScore::Good), 0.1),
                (Some(AnatomyScore::Acceptable), 0.3),
                (Some(AnatomyScore::Poor), 0.45),
                (None, 0.15),
            ],
        }
    }

    /// 过曝概率
    pub fn over_illumination_rate(&self) -> f64 {
        match self {
            QualityProfile::High => 0.05,
            QualityProfile::Medium => 0.15,
            QualityProfile::Low => 0.3,
        }
    }

    /// 均匀随机画像（用于已存在的站点）
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *[QualityProfile::High, QualityProfile::Medium, QualityProfile::Low]
            .choose(rng)
            .expect("profile pool is not empty")
    }
}

/// 新建站点的画像组合：30%高 / 50%中 / 20%低
///
/// 各类别向下取整，余数补为Medium，最后打乱顺序。
pub fn profile_mix<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<QualityProfile> {
    let high = count * 30 / 100;
    let low = count * 20 / 100;
    let medium = count - high - low;

    let mut mix = Vec::with_capacity(count);
    mix.extend(std::iter::repeat(QualityProfile::High).take(high));
    mix.extend(std::iter::repeat(QualityProfile::Medium).take(medium));
    mix.extend(std::iter::repeat(QualityProfile::Low).take(low));
    mix.shuffle(rng);
    mix
}
