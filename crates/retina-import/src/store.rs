//! 导入流水线的存储接口
//!
//! 以trait形式显式传递存储依赖，测试中可用内存实现替换数据库。

use async_trait::async_trait;
use retina_core::models::{Image, Patient, Site};
use retina_core::Result;
use retina_database::{DatabaseQueries, NewImage, NewPatient, NewSite, PatientUpdate};

/// 导入流水线消费的存储操作
#[async_trait]
pub trait ImportStore: Send + Sync {
    async fn get_patient(&self, id: i32) -> Result<Option<Patient>>;
    async fn create_patient_with_id(&self, id: i32, patient: &NewPatient) -> Result<Patient>;
    async fn update_patient(&self, id: i32, update: &PatientUpdate) -> Result<Patient>;
    async fn count_patients(&self) -> Result<i64>;
    async fn max_patient_id(&self) -> Result<Option<i32>>;
    async fn list_sites(&self) -> Result<Vec<Site>>;
    async fn create_site(&self, site: &NewSite) -> Result<Site>;
    async fn patient_ids_without_images(&self) -> Result<Vec<i32>>;
    async fn create_image(&self, image: &NewImage) -> Result<Image>;
}

#[async_trait]
impl ImportStore for DatabaseQueries<'_> {
    async fn get_patient(&self, id: i32) -> Result<Option<Patient>> {
        DatabaseQueries::get_patient(self, id).await
    }

    async fn create_patient_with_id(&self, id: i32, patient: &NewPatient) -> Result<Patient> {
        DatabaseQueries::create_patient_with_id(self, id, patient).await
    }

    async fn update_patient(&self, id: i32, update: &PatientUpdate) -> Result<Patient> {
        DatabaseQueries::update_patient(self, id, update).await
    }

    async fn count_patients(&self) -> Result<i64> {
        DatabaseQueries::count_patients(self).await
    }

    async fn max_patient_id(&self) -> Result<Option<i32>> {
        DatabaseQueries::max_patient_id(self).await
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        DatabaseQueries::list_sites(self).await
    }

    async fn create_site(&self, site: &NewSite) -> Result<Site> {
        DatabaseQueries::create_site(self, site).await
    }

    async fn patient_ids_without_images(&self) -> Result<Vec<i32>> {
        DatabaseQueries::patient_ids_without_images(self).await
    }

    async fn create_image(&self, image: &NewImage) -> Result<Image> {
        DatabaseQueries::create_image(self, image).await
    }
}
