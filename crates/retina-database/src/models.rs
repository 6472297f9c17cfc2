//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use retina_core::models::*;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库受试者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: i32,
    pub birth_date: NaiveDate,
    pub sex: String, // 存储为字符串，转换为Sex枚举
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            birth_date: db_patient.birth_date,
            sex: Sex::parse(&db_patient.sex).unwrap_or(Sex::Other),
            created_at: db_patient.created_at,
            modified_at: db_patient.modified_at,
        }
    }
}

/// 数据库站点表
#[derive(Debug, FromRow)]
pub struct DbSite {
    pub id: i32,
    pub name: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<DbSite> for Site {
    fn from(db_site: DbSite) -> Self {
        Site {
            id: db_site.id,
            name: db_site.name,
            location: db_site.location,
            created_at: db_site.created_at,
            modified_at: db_site.modified_at,
        }
    }
}

/// 数据库影像表
#[derive(Debug, FromRow)]
pub struct DbImage {
    pub id: i32,
    pub patient_id: i32,
    pub site_id: Option<i32>,
    pub eye_side: String,
    pub quality_score: Option<String>, // 存储为字符串，NULL表示未评分
    pub anatomy_score: Option<String>,
    pub over_illuminated: bool,
    pub image_path: String,
    pub acquisition_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<DbImage> for Image {
    fn from(db_image: DbImage) -> Self {
        Image {
            id: db_image.id,
            patient_id: db_image.patient_id,
            site_id: db_image.site_id,
            // 枚举列由Schema约束，无法解析的值视为数据损坏，回退到Left
            eye_side: EyeSide::parse(&db_image.eye_side).unwrap_or(EyeSide::Left),
            quality_score: db_image.quality_score.as_deref().and_then(QualityScore::parse),
            anatomy_score: db_image.anatomy_score.as_deref().and_then(AnatomyScore::parse),
            over_illuminated: db_image.over_illuminated,
            image_path: db_image.image_path,
            acquisition_date: db_image.acquisition_date,
            created_at: db_image.created_at,
            modified_at: db_image.modified_at,
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新受试者插入模型
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub birth_date: NaiveDate,
    pub sex: Sex,
}

/// 新站点插入模型
#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub location: Option<String>,
}

/// 新影像插入模型
#[derive(Debug, Clone)]
pub struct NewImage {
    pub patient_id: i32,
    pub site_id: Option<i32>,
    pub eye_side: EyeSide,
    pub quality_score: Option<QualityScore>,
    pub anatomy_score: Option<AnatomyScore>,
    pub over_illuminated: bool,
    pub image_path: String,
    pub acquisition_date: Option<DateTime<Utc>>,
}

// 更新模型 - 仅更新Some字段

/// 受试者部分更新模型
#[derive(Debug, Clone, Default)]
pub struct PatientUpdate {
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
}

/// 站点部分更新模型
#[derive(Debug, Clone, Default)]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub location: Option<Option<String>>,
}

/// 影像部分更新模型
#[derive(Debug, Clone, Default)]
pub struct ImageUpdate {
    pub eye_side: Option<EyeSide>,
    pub quality_score: Option<Option<QualityScore>>,
    pub anatomy_score: Option<Option<AnatomyScore>>,
    pub site_id: Option<Option<i32>>,
    pub over_illuminated: Option<bool>,
    pub acquisition_date: Option<Option<DateTime<Utc>>>,
}
