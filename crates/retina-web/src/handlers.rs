//! HTTP处理器

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use retina_core::models::{AnatomyScore, EyeSide, Patient, QualityScore, Sex, Site};
use retina_core::RetinaError;
use retina_database::{
    DatabaseQueries, ImageUpdate, NewImage, NewPatient, NewSite, PatientUpdate, SiteUpdate,
};
use retina_storage::illumination::{is_over_illuminated, DEFAULT_THRESHOLD};
use retina_storage::FileStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::server::AppState;
use crate::validation::{validate_image_form, validate_patient_form};

/// API错误包装，负责映射HTTP状态码
#[derive(Debug)]
pub struct ApiError(pub RetinaError);

impl From<RetinaError> for ApiError {
    fn from(e: RetinaError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            RetinaError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": true, "message": message, "status": 404 })),
            )
                .into_response(),
            RetinaError::Validation(messages) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": true, "messages": messages, "status": 400 })),
            )
                .into_response(),
            other => {
                error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": true, "message": other.to_string(), "status": 500 })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Retina Web API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

// ========== 受试者处理器 ==========

/// 受试者表单
#[derive(Debug, Deserialize)]
pub struct PatientForm {
    pub birth_date: Option<String>,
    pub sex: Option<String>,
}

/// 受试者响应，附带派生年龄
#[derive(Debug, Serialize)]
pub struct PatientResponse {
    pub id: i32,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub age: i32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<Patient> for PatientResponse {
    fn from(patient: Patient) -> Self {
        let age = patient.age();
        Self {
            id: patient.id,
            birth_date: patient.birth_date,
            sex: patient.sex,
            age,
            created_at: patient.created_at,
            modified_at: patient.modified_at,
        }
    }
}

fn parse_patient_form(form: &PatientForm) -> ApiResult<(NaiveDate, Sex)> {
    let errors = validate_patient_form(form.birth_date.as_deref(), form.sex.as_deref());
    if !errors.is_empty() {
        return Err(ApiError(RetinaError::Validation(errors)));
    }

    // 验证通过后解析不会失败
    let birth_date = NaiveDate::parse_from_str(form.birth_date.as_deref().unwrap_or(""), "%Y-%m-%d")
        .map_err(|e| ApiError(RetinaError::Internal(e.to_string())))?;
    let sex = Sex::parse(form.sex.as_deref().unwrap_or(""))
        .ok_or_else(|| ApiError(RetinaError::Internal("sex parse after validation".into())))?;
    Ok((birth_date, sex))
}

pub async fn list_patients(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let patients = queries.list_patients().await?;
    let response: Vec<PatientResponse> = patients.into_iter().map(PatientResponse::from).collect();
    Ok(Json(response))
}

pub async fn create_patient(
    State(state): State<AppState>,
    Json(form): Json<PatientForm>,
) -> ApiResult<impl IntoResponse> {
    let (birth_date, sex) = parse_patient_form(&form)?;

    let queries = DatabaseQueries::new(&state.pool);
    let patient = queries.create_patient(&NewPatient { birth_date, sex }).await?;
    info!("Patient created successfully, ID: {}", patient.id);
    Ok((StatusCode::CREATED, Json(PatientResponse::from(patient))))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let patient = queries
        .get_patient(id)
        .await?
        .ok_or_else(|| not_found("Patient", id))?;
    Ok(Json(PatientResponse::from(patient)))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(form): Json<PatientForm>,
) -> ApiResult<impl IntoResponse> {
    let (birth_date, sex) = parse_patient_form(&form)?;

    let queries = DatabaseQueries::new(&state.pool);
    let patient = queries
        .update_patient(
            id,
            &PatientUpdate {
                birth_date: Some(birth_date),
                sex: Some(sex),
            },
        )
        .await?;
    info!("Patient {} updated successfully", id);
    Ok(Json(PatientResponse::from(patient)))
}

/// 删除受试者，连同其影像记录和存储文件
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let images = queries.list_images_for_patient(id).await?;

    queries.delete_patient(id).await?;

    // 数据库记录已级联删除，这里清理文件工件
    for image in images {
        remove_stored(&state.files, &image.image_path).await;
    }

    info!("Patient {} deleted successfully", id);
    Ok(StatusCode::NO_CONTENT)
}

// ========== 站点处理器 ==========

/// 站点表单
#[derive(Debug, Deserialize)]
pub struct SiteForm {
    pub name: Option<String>,
    pub location: Option<String>,
}

pub async fn list_sites(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let sites = queries.list_sites().await?;
    Ok(Json(sites))
}

pub async fn create_site(
    State(state): State<AppState>,
    Json(form): Json<SiteForm>,
) -> ApiResult<impl IntoResponse> {
    let name = match form.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(ApiError(RetinaError::validation("Site name is required"))),
    };

    let queries = DatabaseQueries::new(&state.pool);
    if queries.get_site_by_name(&name).await?.is_some() {
        return Err(ApiError(RetinaError::validation(format!(
            "Site with name '{}' already exists",
            name
        ))));
    }

    let site = queries
        .create_site(&NewSite {
            name,
            location: form.location.filter(|l| !l.trim().is_empty()),
        })
        .await?;
    info!("Site created successfully, ID: {}", site.id);
    Ok((StatusCode::CREATED, Json(site)))
}

pub async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let site = queries
        .get_site(id)
        .await?
        .ok_or_else(|| not_found("Site", id))?;
    Ok(Json(site))
}

pub async fn update_site(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(form): Json<SiteForm>,
) -> ApiResult<impl IntoResponse> {
    let update = SiteUpdate {
        name: form.name.filter(|n| !n.trim().is_empty()),
        location: form.location.map(|l| {
            let trimmed = l.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        }),
    };

    let queries = DatabaseQueries::new(&state.pool);
    let site = queries.update_site(id, &update).await?;
    info!("Site {} updated successfully", id);
    Ok(Json(site))
}

pub async fn delete_site(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    queries.delete_site(id).await?;
    info!("Site {} deleted successfully", id);
    Ok(StatusCode::NO_CONTENT)
}

// ========== 影像处理器 ==========

/// 影像响应，附带站点名称与位置
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: i32,
    pub patient_id: i32,
    pub eye_side: EyeSide,
    pub quality_score: Option<QualityScore>,
    pub anatomy_score: Option<AnatomyScore>,
    pub site_id: Option<i32>,
    pub site_name: Option<String>,
    pub site_location: Option<String>,
    pub over_illuminated: bool,
    pub image_path: String,
    pub acquisition_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ImageResponse {
    fn new(image: retina_core::models::Image, site: Option<Site>) -> Self {
        Self {
            id: image.id,
            patient_id: image.patient_id,
            eye_side: image.eye_side,
            quality_score: image.quality_score,
            anatomy_score: image.anatomy_score,
            site_id: image.site_id,
            site_name: site.as_ref().map(|s| s.name.clone()),
            site_location: site.and_then(|s| s.location),
            over_illuminated: image.over_illuminated,
            image_path: image.image_path,
            acquisition_date: image.acquisition_date,
            created_at: image.created_at,
            modified_at: image.modified_at,
        }
    }
}

async fn with_site(
    queries: &DatabaseQueries<'_>,
    image: retina_core::models::Image,
) -> ApiResult<ImageResponse> {
    let site = match image.site_id {
        Some(site_id) => queries.get_site(site_id).await?,
        None => None,
    };
    Ok(ImageResponse::new(image, site))
}

pub async fn list_patient_images(
    State(state): State<AppState>,
    Path(patient_id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    queries
        .get_patient(patient_id)
        .await?
        .ok_or_else(|| not_found("Patient", patient_id))?;

    let images = queries.list_images_for_patient(patient_id).await?;
    let mut response = Vec::with_capacity(images.len());
    for image in images {
        response.push(with_site(&queries, image).await?);
    }
    Ok(Json(response))
}

/// 上传表单收集结果
#[derive(Debug, Default)]
struct UploadForm {
    eye_side: Option<String>,
    quality_score: Option<String>,
    anatomy_score: Option<String>,
    site_id: Option<String>,
    site_name: Option<String>,
    site_location: Option<String>,
    acquisition_date: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

async fn collect_upload_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(RetinaError::validation(format!("Malformed multipart body: {}", e))))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image_file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError(RetinaError::validation(format!("Failed to read upload: {}", e)))
                })?;
                form.file = Some((filename, data.to_vec()));
            }
            other => {
                let value = field.text().await.map_err(|e| {
                    ApiError(RetinaError::validation(format!("Failed to read field: {}", e)))
                })?;
                match other {
                    "eye_side" => form.eye_side = Some(value),
                    "quality_score" => form.quality_score = Some(value),
                    "anatomy_score" => form.anatomy_score = Some(value),
                    "site_id" => form.site_id = Some(value),
                    "site_name" => form.site_name = Some(value),
                    "site_location" => form.site_location = Some(value),
                    "acquisition_date" => form.acquisition_date = Some(value),
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}

/// 解析站点选择：优先现有站点ID，否则按名称查找或创建
async fn resolve_site(
    queries: &DatabaseQueries<'_>,
    site_id: Option<&str>,
    site_name: Option<&str>,
    site_location: Option<&str>,
) -> ApiResult<Option<i32>> {
    if let Some(raw) = site_id.filter(|raw| !raw.is_empty() && *raw != "custom") {
        let id: i32 = raw
            .parse()
            .map_err(|_| ApiError(RetinaError::validation("Site id must be a number")))?;
        queries
            .get_site(id)
            .await?
            .ok_or_else(|| not_found("Site", id))?;
        return Ok(Some(id));
    }

    if let Some(name) = site_name.filter(|name| !name.trim().is_empty()) {
        let site = queries.find_or_create_site(name.trim(), site_location).await?;
        return Ok(Some(site.id));
    }

    Ok(None)
}

fn parse_acquisition_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.filter(|raw| !raw.is_empty())
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// 保存上传文件并执行过曝扫描，扫描失败时回收已落盘的文件
async fn store_scanned(files: &FileStore, filename: &str, data: &[u8]) -> ApiResult<(String, bool)> {
    let stored_name = files.save(filename, data).await?;

    // 像素扫描是CPU密集操作，移出异步运行时
    let stored_path = files.path_of(&stored_name);
    let scanned =
        tokio::task::spawn_blocking(move || is_over_illuminated(&stored_path, DEFAULT_THRESHOLD))
            .await
            .map_err(|e| RetinaError::Internal(e.to_string()))
            .and_then(|result| result);

    match scanned {
        Ok(over_illuminated) => Ok((stored_name, over_illuminated)),
        Err(e) => {
            remove_stored(files, &stored_name).await;
            Err(e.into())
        }
    }
}

async fn remove_stored(files: &FileStore, stored_name: &str) {
    if let Err(e) = files.delete(stored_name).await {
        warn!("Failed to remove stored file {}: {}", stored_name, e);
    }
}

pub async fn upload_image(
    State(state): State<AppState>,
    Path(patient_id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    queries
        .get_patient(patient_id)
        .await?
        .ok_or_else(|| not_found("Patient", patient_id))?;

    let form = collect_upload_form(multipart).await?;

    let errors = validate_image_form(
        form.eye_side.as_deref(),
        form.quality_score.as_deref(),
        form.anatomy_score.as_deref(),
        form.acquisition_date.as_deref(),
    );
    if !errors.is_empty() {
        return Err(ApiError(RetinaError::Validation(errors)));
    }

    let (filename, data) = form
        .file
        .filter(|(_, data)| !data.is_empty())
        .ok_or_else(|| ApiError(RetinaError::validation("No image was provided")))?;

    let site_id = resolve_site(
        &queries,
        form.site_id.as_deref(),
        form.site_name.as_deref(),
        form.site_location.as_deref(),
    )
    .await?;

    let (stored_name, over_illuminated) = store_scanned(&state.files, &filename, &data).await?;

    let created = queries
        .create_image(&NewImage {
            patient_id,
            site_id,
            // 验证通过后解析不会失败
            eye_side: form
                .eye_side
                .as_deref()
                .and_then(EyeSide::parse)
                .unwrap_or(EyeSide::Left),
            quality_score: form.quality_score.as_deref().and_then(QualityScore::parse),
            anatomy_score: form.anatomy_score.as_deref().and_then(AnatomyScore::parse),
            over_illuminated,
            image_path: stored_name.clone(),
            acquisition_date: parse_acquisition_date(form.acquisition_date.as_deref())
                .or_else(|| Some(Utc::now())),
        })
        .await;

    let image = match created {
        Ok(image) => image,
        Err(e) => {
            // 入库失败时不留下孤儿文件
            remove_stored(&state.files, &stored_name).await;
            return Err(e.into());
        }
    };

    info!(
        "Image uploaded successfully for patient {}, image ID: {}",
        patient_id, image.id
    );
    let response = with_site(&queries, image).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let image = queries
        .get_image(id)
        .await?
        .ok_or_else(|| not_found("Image", id))?;
    Ok(Json(with_site(&queries, image).await?))
}

/// 影像更新表单
#[derive(Debug, Deserialize, Default)]
pub struct ImageForm {
    pub eye_side: Option<String>,
    pub quality_score: Option<String>,
    pub anatomy_score: Option<String>,
    pub site_id: Option<String>,
    pub site_name: Option<String>,
    pub site_location: Option<String>,
    pub acquisition_date: Option<String>,
}

/// 构造部分更新模型
///
/// 缺省字段维持原值；评分字段提交空字符串表示清除为未评分。
fn image_update_from_form(form: &ImageForm, site_id: Option<i32>) -> ImageUpdate {
    ImageUpdate {
        eye_side: form.eye_side.as_deref().and_then(EyeSide::parse),
        quality_score: form.quality_score.as_deref().map(QualityScore::parse),
        anatomy_score: form.anatomy_score.as_deref().map(AnatomyScore::parse),
        site_id: site_id.map(Some),
        over_illuminated: None,
        acquisition_date: parse_acquisition_date(form.acquisition_date.as_deref()).map(Some),
    }
}

pub async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(form): Json<ImageForm>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let existing = queries
        .get_image(id)
        .await?
        .ok_or_else(|| not_found("Image", id))?;

    // 未提交眼别时保留现值
    let errors = validate_image_form(
        form.eye_side.as_deref().or(Some(existing.eye_side.as_str())),
        form.quality_score.as_deref(),
        form.anatomy_score.as_deref(),
        form.acquisition_date.as_deref(),
    );
    if !errors.is_empty() {
        return Err(ApiError(RetinaError::Validation(errors)));
    }

    let site_id = resolve_site(
        &queries,
        form.site_id.as_deref(),
        form.site_name.as_deref(),
        form.site_location.as_deref(),
    )
    .await?;

    let update = image_update_from_form(&form, site_id);
    let image = queries.update_image(id, &update).await?;
    info!("Image {} updated successfully", id);
    Ok(Json(with_site(&queries, image).await?))
}

/// 删除影像记录及其存储文件
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<impl IntoResponse> {
    let queries = DatabaseQueries::new(&state.pool);
    let image = queries
        .get_image(id)
        .await?
        .ok_or_else(|| not_found("Image", id))?;

    queries.delete_image(id).await?;
    remove_stored(&state.files, &image.image_path).await;

    info!("Image {} deleted successfully", id);
    Ok(StatusCode::NO_CONTENT)
}

fn not_found(entity: &str, id: i32) -> ApiError {
    ApiError(RetinaError::NotFound(format!(
        "{} with ID {} not found",
        entity, id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_update_fields_keep_current_values() {
        let update = image_update_from_form(&ImageForm::default(), None);
        assert_eq!(update.eye_side, None);
        assert_eq!(update.quality_score, None);
        assert_eq!(update.anatomy_score, None);
        assert_eq!(update.site_id, None);
        assert_eq!(update.acquisition_date, None);
    }

    #[test]
    fn test_empty_score_fields_clear_ratings() {
        let form = ImageForm {
            quality_score: Some(String::new()),
            anatomy_score: Some(String::new()),
            ..ImageForm::default()
        };
        let update = image_update_from_form(&form, None);
        assert_eq!(update.quality_score, Some(None));
        assert_eq!(update.anatomy_score, Some(None));
    }

    #[test]
    fn test_submitted_update_fields_are_applied() {
        let form = ImageForm {
            eye_side: Some("RIGHT".to_string()),
            quality_score: Some("HIGH".to_string()),
            anatomy_score: Some("GOOD".to_string()),
            acquisition_date: Some("2024-03-01".to_string()),
            ..ImageForm::default()
        };
        let update = image_update_from_form(&form, Some(4));
        assert_eq!(update.eye_side, Some(EyeSide::Right));
        assert_eq!(update.quality_score, Some(Some(QualityScore::High)));
        assert_eq!(update.anatomy_score, Some(Some(AnatomyScore::Good)));
        assert_eq!(update.site_id, Some(Some(4)));
        assert!(matches!(update.acquisition_date, Some(Some(_))));
    }

    #[tokio::test]
    async fn test_failed_scan_removes_stored_file() {
        let upload = TempDir::new().unwrap();
        let files = FileStore::new(upload.path(), None);

        let result = store_scanned(&files, "scan.png", b"not an image").await;
        assert!(result.is_err());

        // 扫描失败后上传目录不留下孤儿文件
        let mut entries = tokio::fs::read_dir(upload.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_scan_keeps_stored_file() {
        let upload = TempDir::new().unwrap();
        let files = FileStore::new(upload.path(), None);

        // 最小的1x1黑色PNG
        let png: &[u8] = &[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
            0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x78,
            0x9C, 0x63, 0x60, 0x60, 0x60, 0x00, 0x00, 0x00, 0x04, 0x00, 0x01, 0xF6, 0x17, 0x38,
            0x55, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ];

        let (stored_name, over_illuminated) = store_scanned(&files, "scan.png", png).await.unwrap();
        assert!(!over_illuminated);
        assert!(files.exists(&stored_name));
    }
}
