//! 加权随机采样

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use retina_core::{Result, RetinaError};

/// 离散加权分布采样器
///
/// 权重无须归一化，类别L被选中的概率为 weight(L) / sum(weights)。
/// 全零权重或空分布属于上游配置错误，构造时直接失败。
#[derive(Debug, Clone)]
pub struct WeightedChoice<T> {
    labels: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T: Clone> WeightedChoice<T> {
    pub fn new(choices: &[(T, f64)]) -> Result<Self> {
        let weights: Vec<f64> = choices.iter().map(|(_, w)| *w).collect();
        let index = WeightedIndex::new(&weights)
            .map_err(|e| RetinaError::Import(format!("无效的权重配置: {}", e)))?;

        Ok(Self {
            labels: choices.iter().map(|(label, _)| label.clone()).collect(),
            index,
        })
    }

    /// 独立同分布的单次抽取
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.labels[self.index.sample(rng)].clone()
    }
}
