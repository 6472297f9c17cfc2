//! 随机化导入流水线
//!
//! 按顺序执行：CSV受试者导入 → 站点生成与画像分配 → 受试者生成 →
//! 真实影像分配（第一遍）→ 合成影像回填（第二遍）。流水线整体是
//! 随机化的，不保证跨运行可复现；单项失败只记录和计数。

use crate::csv::{import_patients, PatientImportCounts};
use crate::filename::extract_identity;
use crate::profile::{profile_mix, QualityProfile};
use crate::sampler::WeightedChoice;
use crate::store::ImportStore;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use retina_core::models::{AnatomyScore, EyeSide, QualityScore, Sex, Site};
use retina_core::{Result, RetinaError};
use retina_database::{NewImage, NewPatient, NewSite};
use retina_storage::FileStore;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 生成受试者的ID从当前最大ID加此偏移量开始，与CSV导入的编号段隔开
const GENERATED_ID_OFFSET: i32 = 1000;

/// 站点名称池，重名时追加数字后缀
const SITE_NAME_POOL: &[&str] = &[
    "Central Eye Clinic",
    "University Hospital",
    "Harbor View Clinic",
    "Riverside Medical Center",
    "Hillcrest Ophthalmology",
    "Lakeside Imaging Center",
];

/// 站点位置池
const SITE_LOCATION_POOL: &[&str] = &[
    "Rotterdam",
    "Amsterdam",
    "Utrecht",
    "Leiden",
    "Groningen",
    "Eindhoven",
];

/// 导入流水线参数
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// 受试者CSV文件，None时跳过CSV导入
    pub csv_file: Option<PathBuf>,
    /// 真实影像文件目录
    pub images_folder: PathBuf,
    /// 目标站点数
    pub site_count: usize,
    /// 目标最少受试者数
    pub min_patients: usize,
    /// 合成回填时每名受试者的最大影像数
    pub max_images_per_patient: usize,
}

/// 导入运行结果
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub patients: PatientImportCounts,
    pub sites_created: usize,
    pub patients_generated: usize,
    pub images_processed: usize,
    pub images_errored: usize,
}

/// 随机化导入流水线
pub struct ImportPipeline<'a, S: ImportStore, R: Rng + Send> {
    store: &'a S,
    files: &'a FileStore,
    rng: R,
}

impl<'a, S: ImportStore, R: Rng + Send> ImportPipeline<'a, S, R> {
    pub fn new(store: &'a S, files: &'a FileStore, rng: R) -> Self {
        Self { store, files, rng }
    }

    /// 执行整个导入流程
    pub async fn run(&mut self, config: &ImportConfig) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        if let Some(csv_file) = &config.csv_file {
            info!("Starting patient import from {}", csv_file.display());
            report.patients = import_patients(self.store, csv_file).await?;
        }

        let (sites, profiles, sites_created) = self.ensure_sites(config.site_count).await?;
        report.sites_created = sites_created;
        if sites.is_empty() {
            return Err(RetinaError::Import(
                "没有可用的采集站点，无法分配影像".to_string(),
            ));
        }

        report.patients_generated = self.generate_patients(config.min_patients).await?;

        let image_files = list_image_files(&config.images_folder).await?;

        // 同一受试者的所有影像归属同一站点，映射仅在本次运行内有效
        let mut site_by_patient: HashMap<i32, i32> = HashMap::new();

        self.assign_real_images(&sites, &profiles, &image_files, &mut site_by_patient, &mut report)
            .await;
        self.backfill_images(
            config.max_images_per_patient,
            &sites,
            &profiles,
            &image_files,
            &mut site_by_patient,
            &mut report,
        )
        .await?;

        info!(
            "Image import completed: {} processed, {} errors",
            report.images_processed, report.images_errored
        );
        Ok(report)
    }

    /// 站点生成与画像分配
    ///
    /// 画像是运行期的临时元数据，保存在以站点ID为键的映射中，从不写库。
    async fn ensure_sites(
        &mut self,
        site_count: usize,
    ) -> Result<(Vec<Site>, HashMap<i32, QualityProfile>, usize)> {
        let existing = self.store.list_sites().await?;
        let mut used_names: HashSet<String> =
            existing.iter().map(|site| site.name.clone()).collect();

        let needed = site_count.saturating_sub(existing.len());
        let mix = profile_mix(needed, &mut self.rng);

        let mut profiles: HashMap<i32, QualityProfile> = existing
            .iter()
            .map(|site| (site.id, QualityProfile::random(&mut self.rng)))
            .collect();

        let mut sites = existing;
        for profile in mix {
            let name = self.next_site_name(&used_names);
            used_names.insert(name.clone());
            let location = SITE_LOCATION_POOL.choose(&mut self.rng).map(|l| l.to_string());

            let site = self.store.create_site(&NewSite { name, location }).await?;
            info!("Created site: {} ({:?})", site.name, profile);
            profiles.insert(site.id, profile);
            sites.push(site);
        }

        Ok((sites, profiles, needed))
    }

    /// 从名称池取一个未使用的站点名，必要时追加数字后缀
    fn next_site_name(&mut self, used: &HashSet<String>) -> String {
        let base = SITE_NAME_POOL
            .choose(&mut self.rng)
            .expect("site name pool is not empty");
        if !used.contains(*base) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{} {}", base, suffix);
            if !used.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// 补齐受试者数量
    async fn generate_patients(&mut self, min_patients: usize) -> Result<usize> {
        let current = self.store.count_patients().await? as usize;
        if current >= min_patients {
            return Ok(0);
        }

        let needed = min_patients - current;
        let base = self.store.max_patient_id().await?.unwrap_or(0) + GENERATED_ID_OFFSET;

        for i in 0..needed {
            let patient = NewPatient {
                birth_date: self.random_birth_date(),
                sex: self.random_sex(),
            };
            self.store
                .create_patient_with_id(base + i as i32, &patient)
                .await?;
        }

        info!("Generated {} synthetic patients", needed);
        Ok(needed)
    }

    /// 随机出生日期：年[1950,2010]，月[1,12]，日[1,28]
    fn random_birth_date(&mut self) -> chrono::NaiveDate {
        let year = self.rng.gen_range(1950..=2010);
        let month = self.rng.gen_range(1..=12);
        let day = self.rng.gen_range(1..=28); // 日期上限28，避开月长差异
        chrono::NaiveDate::from_ymd_opt(year, month, day).expect("valid generated date")
    }

    fn random_sex(&mut self) -> Sex {
        *[Sex::Male, Sex::Female, Sex::Other]
            .choose(&mut self.rng)
            .expect("sex pool is not empty")
    }

    /// 第一遍：按文件名身份分配真实影像
    async fn assign_real_images(
        &mut self,
        sites: &[Site],
        profiles: &HashMap<i32, QualityProfile>,
        image_files: &[PathBuf],
        site_by_patient: &mut HashMap<i32, i32>,
        report: &mut ImportReport,
    ) {
        for path in image_files {
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let Some((patient_id, eye_side)) = extract_identity(filename) else {
                warn!("Couldn't extract patient ID or eye side from filename: {}", filename);
                report.images_errored += 1;
                continue;
            };

            match self
                .import_real_image(patient_id, eye_side, path, filename, sites, profiles, site_by_patient)
                .await
            {
                Ok(true) => report.images_processed += 1,
                Ok(false) => {
                    warn!("Patient with ID {} does not exist for image: {}", patient_id, filename);
                    report.images_errored += 1;
                }
                Err(e) => {
                    error!("Error importing image {}: {}", filename, e);
                    report.images_errored += 1;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn import_real_image(
        &mut self,
        patient_id: i32,
        eye_side: EyeSide,
        path: &Path,
        filename: &str,
        sites: &[Site],
        profiles: &HashMap<i32, QualityProfile>,
        site_by_patient: &mut HashMap<i32, i32>,
    ) -> Result<bool> {
        if self.store.get_patient(patient_id).await?.is_none() {
            return Ok(false);
        }

        let site_id = self.site_for_patient(patient_id, sites, site_by_patient);
        let (quality, anatomy, over_illuminated) = self.sample_metadata(profiles, site_id)?;

        let data = tokio::fs::read(path).await?;
        let stored_name = self.files.save(filename, &data).await?;

        self.store
            .create_image(&NewImage {
                patient_id,
                site_id: Some(site_id),
                eye_side,
                quality_score: quality,
                anatomy_score: anatomy,
                over_illuminated,
                image_path: stored_name,
                acquisition_date: Some(self.random_recent_timestamp()),
            })
            .await?;
        Ok(true)
    }

    /// 第二遍：为没有影像的受试者随机回填合成影像
    async fn backfill_images(
        &mut self,
        max_images_per_patient: usize,
        sites: &[Site],
        profiles: &HashMap<i32, QualityProfile>,
        image_files: &[PathBuf],
        site_by_patient: &mut HashMap<i32, i32>,
        report: &mut ImportReport,
    ) -> Result<()> {
        if image_files.is_empty() || max_images_per_patient == 0 {
            warn!("No source images available, skipping synthetic backfill");
            return Ok(());
        }

        let candidates = self.store.patient_ids_without_images().await?;
        for patient_id in candidates {
            // 70%的无影像受试者获得回填
            if !self.rng.gen_bool(0.7) {
                continue;
            }

            let image_count = self.rng.gen_range(1..=max_images_per_patient);
            for _ in 0..image_count {
                let source = image_files
                    .choose(&mut self.rng)
                    .expect("image file list is not empty");

                match self
                    .import_synthetic_image(patient_id, source, sites, profiles, site_by_patient)
                    .await
                {
                    Ok(()) => report.images_processed += 1,
                    Err(e) => {
                        error!("Error backfilling image for patient {}: {}", patient_id, e);
                        report.images_errored += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn import_synthetic_image(
        &mut self,
        patient_id: i32,
        source: &Path,
        sites: &[Site],
        profiles: &HashMap<i32, QualityProfile>,
        site_by_patient: &mut HashMap<i32, i32>,
    ) -> Result<()> {
        let site_id = self.site_for_patient(patient_id, sites, site_by_patient);
        let (quality, anatomy, over_illuminated) = self.sample_metadata(profiles, site_id)?;
        let eye_side = if self.rng.gen_bool(0.5) {
            EyeSide::Left
        } else {
            EyeSide::Right
        };

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("synthetic.png");
        let data = tokio::fs::read(source).await?;
        let stored_name = self.files.save(filename, &data).await?;

        self.store
            .create_image(&NewImage {
                patient_id,
                site_id: Some(site_id),
                eye_side,
                quality_score: quality,
                anatomy_score: anatomy,
                over_illuminated,
                image_path: stored_name,
                acquisition_date: Some(self.random_recent_timestamp()),
            })
            .await?;
        Ok(())
    }

    /// 受试者的站点：首次均匀随机选取，本次运行内复用
    fn site_for_patient(
        &mut self,
        patient_id: i32,
        sites: &[Site],
        site_by_patient: &mut HashMap<i32, i32>,
    ) -> i32 {
        let rng = &mut self.rng;
        *site_by_patient
            .entry(patient_id)
            .or_insert_with(|| sites.choose(rng).expect("site list is not empty").id)
    }

    /// 按站点画像采样影像元数据
    fn sample_metadata(
        &mut self,
        profiles: &HashMap<i32, QualityProfile>,
        site_id: i32,
    ) -> Result<(Option<QualityScore>, Option<AnatomyScore>, bool)> {
        let profile = profiles
            .get(&site_id)
            .copied()
            .ok_or_else(|| RetinaError::Import(format!("站点{}没有分配质量画像", site_id)))?;

        let quality = WeightedChoice::new(&profile.quality_weights())?.draw(&mut self.rng);
        let anatomy = WeightedChoice::new(&profile.anatomy_weights())?.draw(&mut self.rng);
        let over_illuminated = self.rng.gen_bool(profile.over_illumination_rate());
        Ok((quality, anatomy, over_illuminated))
    }

    /// 过去365天内的随机采集时间
    fn random_recent_timestamp(&mut self) -> DateTime<Utc> {
        let seconds_back = self.rng.gen_range(0..365 * 24 * 3600_i64);
        Utc::now() - Duration::seconds(seconds_back)
    }
}

/// 列出目录中的候选影像文件（jpg/jpeg/png）
async fn list_image_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    async fn write_file(dir: &TempDir, name: &str) {
        tokio::fs::write(dir.path().join(name), b"not real pixels")
            .await
            .unwrap();
    }

    async fn seeded_run(seed: u64) -> (MemoryStore, TempDir, ImportReport) {
        let store = MemoryStore::new();
        let images = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();

        write_file(&images, "RS-1_left.jpg").await;
        write_file(&images, "RS-1_right.jpg").await;
        write_file(&images, "RS-2_left.png").await;
        write_file(&images, "broken_name.jpg").await;
        write_file(&images, "notes.txt").await;

        let csv = images.path().join("patients.csv");
        tokio::fs::write(
            &csv,
            "subject_id,date_of_birth,sex\nRS-1,1960-05-20,Female\nRS-2,1972-09-03,Male\n",
        )
        .await
        .unwrap();

        let files = FileStore::new(uploads.path(), None);
        let config = ImportConfig {
            csv_file: Some(csv),
            images_folder: images.path().to_path_buf(),
            site_count: 3,
            min_patients: 10,
            max_images_per_patient: 2,
        };

        let mut pipeline = ImportPipeline::new(&store, &files, StdRng::seed_from_u64(seed));
        let report = pipeline.run(&config).await.unwrap();
        (store, uploads, report)
    }

    #[tokio::test]
    async fn test_full_run_structure() {
        let (store, uploads, report) = seeded_run(11).await;

        assert_eq!(report.patients.created, 2);
        assert_eq!(report.sites_created, 3);
        assert_eq!(report.patients_generated, 8);
        // broken_name.jpg身份提取失败计为错误，notes.txt被扩展名过滤直接跳过
        assert_eq!(report.images_errored, 1);

        // CSV受试者获得了真实影像
        let images = store.images();
        assert!(images.iter().any(|img| img.patient_id == 1));
        assert!(images.iter().any(|img| img.patient_id == 2));

        // 每张影像都指向存在的站点，且文件已落盘
        let site_ids: Vec<i32> = store.sites().iter().map(|s| s.id).collect();
        for image in &images {
            let site_id = image.site_id.expect("imported image has a site");
            assert!(site_ids.contains(&site_id));
            assert!(uploads.path().join(&image.image_path).exists());
            assert!(image.acquisition_date.is_some());
        }

        // 同一受试者的影像全部归属同一站点
        let mut seen: HashMap<i32, i32> = HashMap::new();
        for image in &images {
            let site_id = image.site_id.unwrap();
            assert_eq!(*seen.entry(image.patient_id).or_insert(site_id), site_id);
        }

        assert_eq!(
            report.images_processed,
            images.len(),
            "processed counter matches created records"
        );
    }

    #[tokio::test]
    async fn test_generated_patients_offset_and_backfill_bounds() {
        let (store, _uploads, _report) = seeded_run(23).await;

        // 生成的受试者ID位于最大ID加偏移之后
        let generated: Vec<i32> = store
            .patients()
            .iter()
            .map(|p| p.id)
            .filter(|id| *id > 2)
            .collect();
        assert_eq!(generated.len(), 8);
        assert!(generated.iter().all(|id| *id >= 2 + GENERATED_ID_OFFSET));

        // 回填影像数不超过配置上限
        let mut per_patient: HashMap<i32, usize> = HashMap::new();
        for image in store.images() {
            if image.patient_id > 2 {
                *per_patient.entry(image.patient_id).or_insert(0) += 1;
            }
        }
        assert!(per_patient.values().all(|count| (1..=2).contains(count)));
    }

    #[tokio::test]
    async fn test_existing_sites_are_reused() {
        let store = MemoryStore::new();
        store
            .create_site(&NewSite {
                name: "Central Eye Clinic".to_string(),
                location: None,
            })
            .await
            .unwrap();

        let images = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();
        let files = FileStore::new(uploads.path(), None);
        let config = ImportConfig {
            csv_file: None,
            images_folder: images.path().to_path_buf(),
            site_count: 3,
            min_patients: 0,
            max_images_per_patient: 2,
        };

        let mut pipeline = ImportPipeline::new(&store, &files, StdRng::seed_from_u64(5));
        let report = pipeline.run(&config).await.unwrap();

        assert_eq!(report.sites_created, 2);
        let sites = store.sites();
        assert_eq!(sites.len(), 3);

        // 站点名称唯一
        let names: HashSet<String> = sites.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_patient_counts_as_error() {
        let store = MemoryStore::new();
        let images = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();

        // 影像引用不存在的受试者99
        write_file(&images, "RS-99_left.jpg").await;

        let files = FileStore::new(uploads.path(), None);
        let config = ImportConfig {
            csv_file: None,
            images_folder: images.path().to_path_buf(),
            site_count: 1,
            min_patients: 0,
            max_images_per_patient: 0,
        };

        let mut pipeline = ImportPipeline::new(&store, &files, StdRng::seed_from_u64(3));
        let report = pipeline.run(&config).await.unwrap();

        assert_eq!(report.images_processed, 0);
        assert_eq!(report.images_errored, 1);
        assert!(store.images().is_empty());
    }
}
