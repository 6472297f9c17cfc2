//! 站点与影像质量统计聚合

use crate::eligibility::is_patient_available;
use retina_core::models::{AnatomyScore, Image, QualityScore, Site};
use serde::Serialize;
use std::collections::BTreeMap;

/// 单个站点的统计摘要
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SiteStatistics {
    pub id: i32,
    pub name: String,
    pub location: Option<String>,
    pub total_patients: usize,
    pub available_for_ai: usize,
    pub availability_percentage: f64,
}

/// 质量评分分布
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct QualityDistribution {
    #[serde(rename = "HIGH")]
    pub high: usize,
    #[serde(rename = "ACCEPTABLE")]
    pub acceptable: usize,
    #[serde(rename = "LOW")]
    pub low: usize,
    #[serde(rename = "UNRATED")]
    pub unrated: usize,
}

/// 解剖评分分布
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct AnatomyDistribution {
    #[serde(rename = "GOOD")]
    pub good: usize,
    #[serde(rename = "ACCEPTABLE")]
    pub acceptable: usize,
    #[serde(rename = "POOR")]
    pub poor: usize,
    #[serde(rename = "UNRATED")]
    pub unrated: usize,
}

/// 过曝分布
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct IlluminationDistribution {
    #[serde(rename = "OVER_ILLUMINATED")]
    pub over_illuminated: usize,
    #[serde(rename = "NORMAL")]
    pub normal: usize,
}

/// 全量影像质量统计摘要
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageQualityStatistics {
    pub total_images: usize,
    pub quality: QualityDistribution,
    pub anatomy: AnatomyDistribution,
    pub illumination: IlluminationDistribution,
}

/// 计算所有站点的统计摘要（按站点名称升序）
///
/// total_patients统计该站点有任意影像的受试者数，不区分眼别——只有
/// 单眼影像的受试者也计入分母，这是沿用的产品口径。
pub fn site_statistics(sites: &[Site], images: &[Image]) -> Vec<SiteStatistics> {
    let mut ordered: Vec<&Site> = sites.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    ordered
        .into_iter()
        .map(|site| {
            // BTreeMap保证受试者遍历顺序确定
            let mut by_patient: BTreeMap<i32, Vec<Image>> = BTreeMap::new();
            for image in images.iter().filter(|img| img.site_id == Some(site.id)) {
                by_patient
                    .entry(image.patient_id)
                    .or_default()
                    .push(image.clone());
            }

            let total_patients = by_patient.len();
            let available_for_ai = by_patient
                .values()
                .filter(|patient_images| is_patient_available(patient_images))
                .count();

            let availability_percentage = if total_patients > 0 {
                round_one_decimal(available_for_ai as f64 / total_patients as f64 * 100.0)
            } else {
                0.0
            };

            SiteStatistics {
                id: site.id,
                name: site.name.clone(),
                location: site.location.clone(),
                total_patients,
                available_for_ai,
                availability_percentage,
            }
        })
        .collect()
}

/// 计算全量影像的质量分布统计
///
/// 每张影像在每个分布中恰好计入一个桶，各分布的桶计数之和等于总数。
pub fn image_quality_statistics(images: &[Image]) -> ImageQualityStatistics {
    let mut quality = QualityDistribution::default();
    let mut anatomy = AnatomyDistribution::default();
    let mut illumination = IlluminationDistribution::default();

    for image in images {
        match image.quality_score {
            Some(QualityScore::High) => quality.high += 1,
            Some(QualityScore::Acceptable) => quality.acceptable += 1,
            Some(QualityScore::Low) => quality.low += 1,
            None => quality.unrated += 1,
        }

        match image.anatomy_score {
            Some(AnatomyScore::Good) => anatomy.good += 1,
            Some(AnatomyScore::Acceptable) => anatomy.acceptable += 1,
            Some(AnatomyScore::Poor) => anatomy.poor += 1,
            None => anatomy.unrated += 1,
        }

        if image.over_illuminated {
            illumination.over_illuminated += 1;
        } else {
            illumination.normal += 1;
        }
    }

    ImageQualityStatistics {
        total_images: images.len(),
        quality,
        anatomy,
        illumination,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retina_core::models::EyeSide;

    fn site(id: i32, name: &str) -> Site {
        Site {
            id,
            name: name.to_string(),
            location: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    fn image(
        patient_id: i32,
        site_id: i32,
        eye_side: EyeSide,
        quality: Option<QualityScore>,
        anatomy: Option<AnatomyScore>,
        over_illuminated: bool,
    ) -> Image {
        Image {
            id: 0,
            patient_id,
            site_id: Some(site_id),
            eye_side,
            quality_score: quality,
            anatomy_score: anatomy,
            over_illuminated,
            image_path: "test.png".to_string(),
            acquisition_date: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    fn good_pair(patient_id: i32, site_id: i32) -> Vec<Image> {
        vec![
            image(
                patient_id,
                site_id,
                EyeSide::Left,
                Some(QualityScore::High),
                Some(AnatomyScore::Good),
                false,
            ),
            image(
                patient_id,
                site_id,
                EyeSide::Right,
                Some(QualityScore::Acceptable),
                Some(AnatomyScore::Acceptable),
                false,
            ),
        ]
    }

    #[test]
    fn test_three_patients_two_available() {
        let sites = vec![site(1, "Amsterdam")];
        let mut images = Vec::new();
        images.extend(good_pair(1, 1));
        images.extend(good_pair(2, 1));
        // 受试者3只有左眼影像
        images.push(image(
            3,
            1,
            EyeSide::Left,
            Some(QualityScore::High),
            Some(AnatomyScore::Good),
            false,
        ));

        let stats = site_statistics(&sites, &images);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_patients, 3);
        assert_eq!(stats[0].available_for_ai, 2);
        assert_eq!(stats[0].availability_percentage, 66.7);
    }

    #[test]
    fn test_empty_site_has_zero_percentage() {
        let sites = vec![site(1, "Empty")];
        let stats = site_statistics(&sites, &[]);
        assert_eq!(stats[0].total_patients, 0);
        assert_eq!(stats[0].available_for_ai, 0);
        assert_eq!(stats[0].availability_percentage, 0.0);
    }

    #[test]
    fn test_sites_ordered_by_name() {
        let sites = vec![site(1, "Rotterdam"), site(2, "Amsterdam"), site(3, "Delft")];
        let stats = site_statistics(&sites, &[]);
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Amsterdam", "Delft", "Rotterdam"]);
    }

    #[test]
    fn test_images_at_other_sites_do_not_count() {
        let sites = vec![site(1, "A"), site(2, "B")];
        // 受试者1在站点1双眼合格，在站点2只有一张不合格影像
        let mut images = good_pair(1, 1);
        images.push(image(1, 2, EyeSide::Left, None, None, false));

        let stats = site_statistics(&sites, &images);
        assert_eq!(stats[0].total_patients, 1);
        assert_eq!(stats[0].available_for_ai, 1);
        assert_eq!(stats[1].total_patients, 1);
        assert_eq!(stats[1].available_for_ai, 0);
    }

    #[test]
    fn test_available_never_exceeds_total() {
        let sites = vec![site(1, "A")];
        let mut images = Vec::new();
        for patient_id in 1..=5 {
            images.extend(good_pair(patient_id, 1));
        }
        let stats = site_statistics(&sites, &images);
        assert!(stats[0].available_for_ai <= stats[0].total_patients);
        assert_eq!(stats[0].availability_percentage, 100.0);
    }

    #[test]
    fn test_quality_distribution_sums_to_total() {
        let images = vec![
            image(1, 1, EyeSide::Left, Some(QualityScore::High), Some(AnatomyScore::Good), false),
            image(1, 1, EyeSide::Right, Some(QualityScore::Low), Some(AnatomyScore::Poor), true),
            image(2, 1, EyeSide::Left, None, None, false),
            image(2, 1, EyeSide::Right, Some(QualityScore::Acceptable), None, false),
        ];

        let stats = image_quality_statistics(&images);
        assert_eq!(stats.total_images, 4);

        let q = &stats.quality;
        assert_eq!(q.high + q.acceptable + q.low + q.unrated, stats.total_images);
        assert_eq!(q.high, 1);
        assert_eq!(q.acceptable, 1);
        assert_eq!(q.low, 1);
        assert_eq!(q.unrated, 1);

        let a = &stats.anatomy;
        assert_eq!(a.good + a.acceptable + a.poor + a.unrated, stats.total_images);
        assert_eq!(a.unrated, 2);

        let i = &stats.illumination;
        assert_eq!(i.over_illuminated + i.normal, stats.total_images);
        assert_eq!(i.over_illuminated, 1);
    }

    #[test]
    fn test_empty_dataset_statistics() {
        let stats = image_quality_statistics(&[]);
        assert_eq!(stats.total_images, 0);
        assert_eq!(stats.quality, QualityDistribution::default());
    }
}
