//! CSV受试者导入
//!
//! 每行一名受试者，列为subject_id（可带字母前缀）、date_of_birth
//! （YYYY-MM-DD）、sex（自由文本）。单行失败只记录和计数，不会中断
//! 整个批次。

use crate::store::ImportStore;
use chrono::NaiveDate;
use retina_core::models::Sex;
use retina_core::{Result, RetinaError};
use retina_database::{NewPatient, PatientUpdate};
use std::path::Path;
use tracing::{error, info};

/// 受试者导入计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatientImportCounts {
    pub created: usize,
    pub updated: usize,
    pub errored: usize,
}

/// 解析受试者编号，剥离"RS-"之类的文本前缀
pub fn parse_subject_id(raw: &str) -> Result<i32> {
    let raw = raw.trim();
    let digits = match raw.rsplit_once('-') {
        Some((_, digits)) => digits,
        None => raw,
    };
    digits
        .parse()
        .map_err(|_| RetinaError::Import(format!("无法解析受试者编号: {}", raw)))
}

/// 从CSV文件导入受试者
///
/// 编号已存在则更新，不存在则以该编号创建。返回{created, updated,
/// errored}计数。
pub async fn import_patients<S: ImportStore + ?Sized>(
    store: &S,
    csv_path: &Path,
) -> Result<PatientImportCounts> {
    let content = tokio::fs::read_to_string(csv_path).await?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| RetinaError::Import("CSV文件为空".to_string()))?;
    let columns = parse_header(header)?;

    let mut counts = PatientImportCounts::default();

    for line in lines {
        match import_row(store, &columns, line).await {
            Ok(RowOutcome::Created(id)) => {
                info!("Created patient: ID={}", id);
                counts.created += 1;
            }
            Ok(RowOutcome::Updated(id)) => {
                info!("Updated patient: ID={}", id);
                counts.updated += 1;
            }
            Err(e) => {
                error!("Error processing patient row '{}': {}", line, e);
                counts.errored += 1;
            }
        }
    }

    info!(
        "Patient import completed: {} created, {} updated, {} errors",
        counts.created, counts.updated, counts.errored
    );
    Ok(counts)
}

enum RowOutcome {
    Created(i32),
    Updated(i32),
}

struct ColumnIndexes {
    subject_id: usize,
    date_of_birth: usize,
    sex: usize,
}

fn parse_header(header: &str) -> Result<ColumnIndexes> {
    let names: Vec<&str> = header.split(',').map(str::trim).collect();
    let find = |name: &str| {
        names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| RetinaError::Import(format!("CSV缺少必需列: {}", name)))
    };

    Ok(ColumnIndexes {
        subject_id: find("subject_id")?,
        date_of_birth: find("date_of_birth")?,
        sex: find("sex")?,
    })
}

async fn import_row<S: ImportStore + ?Sized>(
    store: &S,
    columns: &ColumnIndexes,
    line: &str,
) -> Result<RowOutcome> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let field = |index: usize| {
        fields
            .get(index)
            .copied()
            .ok_or_else(|| RetinaError::Import(format!("行字段不足: {}", line)))
    };

    let patient_id = parse_subject_id(field(columns.subject_id)?)?;
    let birth_date = NaiveDate::parse_from_str(field(columns.date_of_birth)?, "%Y-%m-%d")
        .map_err(|e| RetinaError::Import(format!("无法解析出生日期: {}", e)))?;
    let sex = Sex::from_free_text(field(columns.sex)?);

    if store.get_patient(patient_id).await?.is_some() {
        store
            .update_patient(
                patient_id,
                &PatientUpdate {
                    birth_date: Some(birth_date),
                    sex: Some(sex),
                },
            )
            .await?;
        Ok(RowOutcome::Updated(patient_id))
    } else {
        store
            .create_patient_with_id(patient_id, &NewPatient { birth_date, sex })
            .await?;
        Ok(RowOutcome::Created(patient_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use tempfile::TempDir;

    async fn write_csv(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("patients.csv");
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[test]
    fn test_parse_subject_id() {
        assert_eq!(parse_subject_id("RS-7").unwrap(), 7);
        assert_eq!(parse_subject_id("42").unwrap(), 42);
        assert_eq!(parse_subject_id(" RS-305 ").unwrap(), 305);
        assert!(parse_subject_id("RS-abc").is_err());
    }

    #[tokio::test]
    async fn test_import_creates_then_updates() {
        let store = MemoryStore::new();
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "subject_id,date_of_birth,sex\nRS-7,1990-01-15,Male\n",
        )
        .await;

        let counts = import_patients(&store, &path).await.unwrap();
        assert_eq!(counts.created, 1);
        assert_eq!(counts.updated, 0);
        assert_eq!(counts.errored, 0);

        let patient = store.get_patient(7).await.unwrap().unwrap();
        assert_eq!(
            patient.birth_date,
            NaiveDate::from_ymd_opt(1990, 1, 15).unwrap()
        );
        assert_eq!(patient.sex, Sex::Male);

        // 重复导入同一行：更新而不是新建
        let counts = import_patients(&store, &path).await.unwrap();
        assert_eq!(counts.created, 0);
        assert_eq!(counts.updated, 1);
        assert_eq!(store.patient_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_row_does_not_abort_batch() {
        let store = MemoryStore::new();
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "subject_id,date_of_birth,sex\n\
             RS-1,1980-03-02,Female\n\
             RS-2,not-a-date,Male\n\
             RS-3,1975-11-30,Unspecified\n",
        )
        .await;

        let counts = import_patients(&store, &path).await.unwrap();
        assert_eq!(counts.created, 2);
        assert_eq!(counts.errored, 1);
        // 无法识别的性别归为Other
        assert_eq!(store.get_patient(3).await.unwrap().unwrap().sex, Sex::Other);
    }

    #[tokio::test]
    async fn test_missing_column_is_an_error() {
        let store = MemoryStore::new();
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "subject_id,sex\nRS-1,Male\n").await;

        assert!(import_patients(&store, &path).await.is_err());
    }
}
