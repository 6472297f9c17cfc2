//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use retina_core::{Image, Patient, Result, RetinaError, Site};

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    ///
    /// 级联策略是显式声明的：删除受试者会级联删除其影像，
    /// 删除站点只会将影像的site_id置空。
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建受试者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id SERIAL PRIMARY KEY,
                birth_date DATE NOT NULL,
                sex VARCHAR(10) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                modified_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| RetinaError::Database(e.to_string()))?;

        // 创建站点表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS sites (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                location VARCHAR(255),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                modified_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| RetinaError::Database(e.to_string()))?;

        // 创建影像表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS images (
                id SERIAL PRIMARY KEY,
                patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
                site_id INTEGER REFERENCES sites(id) ON DELETE SET NULL,
                eye_side VARCHAR(5) NOT NULL,
                quality_score VARCHAR(10),
                anatomy_score VARCHAR(10),
                over_illuminated BOOLEAN NOT NULL DEFAULT FALSE,
                image_path VARCHAR(255) NOT NULL,
                acquisition_date TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                modified_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| RetinaError::Database(e.to_string()))?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_images_patient_id ON images(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_images_site_id ON images(site_id)",
            "CREATE INDEX IF NOT EXISTS idx_sites_name ON sites(name)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| RetinaError::Database(e.to_string()))?;
        }

        Ok(())
    }

    // ========== 受试者相关操作 ==========

    /// 创建新受试者（ID由数据库生成）
    pub async fn create_patient(&self, patient: &NewPatient) -> Result<Patient> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbPatient>(r#"
            INSERT INTO patients (birth_date, sex)
            VALUES ($1, $2)
            RETURNING *
        "#)
        .bind(patient.birth_date)
        .bind(patient.sex.as_str())
        .fetch_one(pool)
        .await
        .map(Patient::from)
        .map_err(|e| RetinaError::Database(e.to_string()))
    }

    /// 以指定ID创建受试者（批量导入使用）
    pub async fn create_patient_with_id(&self, id: i32, patient: &NewPatient) -> Result<Patient> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbPatient>(r#"
            INSERT INTO patients (id, birth_date, sex)
            VALUES ($1, $2, $3)
            RETURNING *
        "#)
        .bind(id)
        .bind(patient.birth_date)
        .bind(patient.sex.as_str())
        .fetch_one(pool)
        .await
        .map(Patient::from)
        .map_err(|e| RetinaError::Database(e.to_string()))
    }

    /// 根据ID查找受试者
    pub async fn get_patient(&self, id: i32) -> Result<Option<Patient>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 获取所有受试者（最新创建在前）
    pub async fn list_patients(&self) -> Result<Vec<Patient>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients ORDER BY created_at DESC, id DESC"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    /// 更新受试者信息
    pub async fn update_patient(&self, id: i32, update: &PatientUpdate) -> Result<Patient> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatient>(r#"
            UPDATE patients
            SET birth_date = COALESCE($2, birth_date),
                sex = COALESCE($3, sex),
                modified_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(id)
        .bind(update.birth_date)
        .bind(update.sex.map(|s| s.as_str()))
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        result
            .map(Patient::from)
            .ok_or_else(|| RetinaError::NotFound(format!("Patient with ID {} not found", id)))
    }

    /// 删除受试者（影像随之级联删除）
    pub async fn delete_patient(&self, id: i32) -> Result<()> {
        let pool = self.pool.pool();

        let affected = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| RetinaError::Database(e.to_string()))?
            .rows_affected();

        if affected == 0 {
            return Err(RetinaError::NotFound(format!("Patient with ID {} not found", id)));
        }
        Ok(())
    }

    /// 受试者总数
    pub async fn count_patients(&self) -> Result<i64> {
        let pool = self.pool.pool();

        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM patients")
            .fetch_one(pool)
            .await
            .map_err(|e| RetinaError::Database(e.to_string()))
    }

    /// 当前最大受试者ID
    pub async fn max_patient_id(&self) -> Result<Option<i32>> {
        let pool = self.pool.pool();

        sqlx::query_scalar::<_, Option<i32>>("SELECT MAX(id) FROM patients")
            .fetch_one(pool)
            .await
            .map_err(|e| RetinaError::Database(e.to_string()))
    }

    // ========== 站点相关操作 ==========

    /// 创建新站点
    pub async fn create_site(&self, site: &NewSite) -> Result<Site> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbSite>(r#"
            INSERT INTO sites (name, location)
            VALUES ($1, $2)
            RETURNING *
        "#)
        .bind(&site.name)
        .bind(&site.location)
        .fetch_one(pool)
        .await
        .map(Site::from)
        .map_err(|e| RetinaError::Database(e.to_string()))
    }

    /// 根据ID查找站点
    pub async fn get_site(&self, id: i32) -> Result<Option<Site>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbSite>(
            "SELECT * FROM sites WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(result.map(Site::from))
    }

    /// 根据名称查找站点（名称为自然键，区分大小写）
    pub async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbSite>(
            "SELECT * FROM sites WHERE name = $1"
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(result.map(Site::from))
    }

    /// 获取所有站点（按名称升序）
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbSite>(
            "SELECT * FROM sites ORDER BY name"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Site::from).collect())
    }

    /// 按名称查找站点，不存在则创建
    pub async fn find_or_create_site(&self, name: &str, location: Option<&str>) -> Result<Site> {
        if let Some(site) = self.get_site_by_name(name).await? {
            return Ok(site);
        }
        self.create_site(&NewSite {
            name: name.to_string(),
            location: location.map(|l| l.to_string()),
        })
        .await
    }

    /// 更新站点信息
    pub async fn update_site(&self, id: i32, update: &SiteUpdate) -> Result<Site> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbSite>(r#"
            UPDATE sites
            SET name = COALESCE($2, name),
                location = CASE WHEN $3 THEN $4 ELSE location END,
                modified_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(id)
        .bind(&update.name)
        .bind(update.location.is_some())
        .bind(update.location.clone().flatten())
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        result
            .map(Site::from)
            .ok_or_else(|| RetinaError::NotFound(format!("Site with ID {} not found", id)))
    }

    /// 删除站点（影像的site_id置空，不级联删除）
    pub async fn delete_site(&self, id: i32) -> Result<()> {
        let pool = self.pool.pool();

        let affected = sqlx::query("DELETE FROM sites WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| RetinaError::Database(e.to_string()))?
            .rows_affected();

        if affected == 0 {
            return Err(RetinaError::NotFound(format!("Site with ID {} not found", id)));
        }
        Ok(())
    }

    // ========== 影像相关操作 ==========

    /// 创建新影像记录
    pub async fn create_image(&self, image: &NewImage) -> Result<Image> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbImage>(r#"
            INSERT INTO images (patient_id, site_id, eye_side, quality_score,
                                anatomy_score, over_illuminated, image_path, acquisition_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#)
        .bind(image.patient_id)
        .bind(image.site_id)
        .bind(image.eye_side.as_str())
        .bind(image.quality_score.map(|s| s.as_str()))
        .bind(image.anatomy_score.map(|s| s.as_str()))
        .bind(image.over_illuminated)
        .bind(&image.image_path)
        .bind(image.acquisition_date)
        .fetch_one(pool)
        .await
        .map(Image::from)
        .map_err(|e| RetinaError::Database(e.to_string()))
    }

    /// 根据ID查找影像
    pub async fn get_image(&self, id: i32) -> Result<Option<Image>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbImage>(
            "SELECT * FROM images WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(result.map(Image::from))
    }

    /// 获取受试者的所有影像（采集时间倒序）
    pub async fn list_images_for_patient(&self, patient_id: i32) -> Result<Vec<Image>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbImage>(
            "SELECT * FROM images WHERE patient_id = $1 ORDER BY acquisition_date DESC NULLS LAST, id DESC"
        )
        .bind(patient_id)
        .fetch_all(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Image::from).collect())
    }

    /// 获取全部影像（统计聚合使用）
    pub async fn list_images(&self) -> Result<Vec<Image>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbImage>(
            "SELECT * FROM images ORDER BY id"
        )
        .fetch_all(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Image::from).collect())
    }

    /// 更新影像元数据
    pub async fn update_image(&self, id: i32, update: &ImageUpdate) -> Result<Image> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbImage>(r#"
            UPDATE images
            SET eye_side = COALESCE($2, eye_side),
                quality_score = CASE WHEN $3 THEN $4 ELSE quality_score END,
                anatomy_score = CASE WHEN $5 THEN $6 ELSE anatomy_score END,
                site_id = CASE WHEN $7 THEN $8 ELSE site_id END,
                over_illuminated = COALESCE($9, over_illuminated),
                acquisition_date = CASE WHEN $10 THEN $11 ELSE acquisition_date END,
                modified_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(id)
        .bind(update.eye_side.map(|s| s.as_str()))
        .bind(update.quality_score.is_some())
        .bind(update.quality_score.flatten().map(|s| s.as_str()))
        .bind(update.anatomy_score.is_some())
        .bind(update.anatomy_score.flatten().map(|s| s.as_str()))
        .bind(update.site_id.is_some())
        .bind(update.site_id.flatten())
        .bind(update.over_illuminated)
        .bind(update.acquisition_date.is_some())
        .bind(update.acquisition_date.flatten())
        .fetch_optional(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))?;

        result
            .map(Image::from)
            .ok_or_else(|| RetinaError::NotFound(format!("Image with ID {} not found", id)))
    }

    /// 删除影像记录
    pub async fn delete_image(&self, id: i32) -> Result<()> {
        let pool = self.pool.pool();

        let affected = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| RetinaError::Database(e.to_string()))?
            .rows_affected();

        if affected == 0 {
            return Err(RetinaError::NotFound(format!("Image with ID {} not found", id)));
        }
        Ok(())
    }

    /// 没有任何影像的受试者ID（导入回填使用）
    pub async fn patient_ids_without_images(&self) -> Result<Vec<i32>> {
        let pool = self.pool.pool();

        sqlx::query_scalar::<_, i32>(r#"
            SELECT p.id FROM patients p
            LEFT JOIN images i ON i.patient_id = p.id
            WHERE i.id IS NULL
            ORDER BY p.id
        "#)
        .fetch_all(pool)
        .await
        .map_err(|e| RetinaError::Database(e.to_string()))
    }
}
