//! 表单数据验证
//!
//! 一次性枚举所有问题，调用方可完整展示给用户。

use chrono::{NaiveDate, Utc};
use retina_core::models::{AnatomyScore, EyeSide, QualityScore, Sex};

/// 验证受试者表单数据
pub fn validate_patient_form(birth_date: Option<&str>, sex: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();

    match birth_date {
        None | Some("") => errors.push("Birth date is required".to_string()),
        Some(raw) => {
            if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
                errors.push("Birth date must be in YYYY-MM-DD format".to_string());
            }
        }
    }

    match sex {
        None | Some("") => errors.push("Sex is required".to_string()),
        Some(raw) => {
            if Sex::parse(raw).is_none() {
                errors.push("Sex must be one of: Male, Female, Other".to_string());
            }
        }
    }

    errors
}

/// 验证影像表单数据
pub fn validate_image_form(
    eye_side: Option<&str>,
    quality_score: Option<&str>,
    anatomy_score: Option<&str>,
    acquisition_date: Option<&str>,
) -> Vec<String> {
    let mut errors = Vec::new();

    match eye_side {
        None | Some("") => errors.push("Eye side is required".to_string()),
        Some(raw) => {
            if EyeSide::parse(raw).is_none() {
                errors.push("Eye side must be one of: LEFT, RIGHT".to_string());
            }
        }
    }

    if let Some(raw) = quality_score {
        if !raw.is_empty() && QualityScore::parse(raw).is_none() {
            errors.push("Quality score must be one of: LOW, ACCEPTABLE, HIGH".to_string());
        }
    }

    if let Some(raw) = anatomy_score {
        if !raw.is_empty() && AnatomyScore::parse(raw).is_none() {
            errors.push("Anatomy score must be one of: POOR, ACCEPTABLE, GOOD".to_string());
        }
    }

    if let Some(raw) = acquisition_date {
        if !raw.is_empty() {
            match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => {
                    if date > Utc::now().date_naive() {
                        errors.push("Acquisition date cannot be in the future".to_string());
                    }
                }
                Err(_) => {
                    errors.push("Acquisition date must be in YYYY-MM-DD format".to_string());
                }
            }
        }
    }

    errors
}
