//! 核心数据模型定义

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 性别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Other => "Other",
        }
    }

    /// 严格解析，用于表单验证
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Male" => Some(Sex::Male),
            "Female" => Some(Sex::Female),
            "Other" => Some(Sex::Other),
            _ => None,
        }
    }

    /// 自由文本映射，无法识别的值归为Other
    pub fn from_free_text(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Sex::Male,
            "female" | "f" => Sex::Female,
            _ => Sex::Other,
        }
    }
}

/// 眼别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeSide::Left => "LEFT",
            EyeSide::Right => "RIGHT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LEFT" => Some(EyeSide::Left),
            "RIGHT" => Some(EyeSide::Right),
            _ => None,
        }
    }
}

/// 影像质量评分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityScore {
    Low,
    Acceptable,
    High,
}

impl QualityScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityScore::Low => "LOW",
            QualityScore::Acceptable => "ACCEPTABLE",
            QualityScore::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(QualityScore::Low),
            "ACCEPTABLE" => Some(QualityScore::Acceptable),
            "HIGH" => Some(QualityScore::High),
            _ => None,
        }
    }
}

/// 解剖结构评分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnatomyScore {
    Poor,
    Acceptable,
    Good,
}

impl AnatomyScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnatomyScore::Poor => "POOR",
            AnatomyScore::Acceptable => "ACCEPTABLE",
            AnatomyScore::Good => "GOOD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "POOR" => Some(AnatomyScore::Poor),
            "ACCEPTABLE" => Some(AnatomyScore::Acceptable),
            "GOOD" => Some(AnatomyScore::Good),
            _ => None,
        }
    }
}

/// 受试者基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i32,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Patient {
    /// 当前年龄（整年），出生日期在未来时为0
    pub fn age(&self) -> i32 {
        self.age_on(Utc::now().date_naive())
    }

    /// 指定日期的年龄
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        let mut years = today.year() - self.birth_date.year();
        if (today.month(), today.day()) < (self.birth_date.month(), self.birth_date.day()) {
            years -= 1;
        }
        years.max(0)
    }
}

/// 采集站点信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i32,
    pub name: String, // 站点名称唯一，作为自然键
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// 视网膜影像信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i32,
    pub patient_id: i32,
    pub site_id: Option<i32>,
    pub eye_side: EyeSide,
    pub quality_score: Option<QualityScore>,
    pub anatomy_score: Option<AnatomyScore>,
    pub over_illuminated: bool,
    pub image_path: String,
    pub acquisition_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}
