//! 测试用内存存储实现

use crate::store::ImportStore;
use async_trait::async_trait;
use chrono::Utc;
use retina_core::models::{Image, Patient, Site};
use retina_core::{Result, RetinaError};
use retina_database::{NewImage, NewPatient, NewSite, PatientUpdate};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    patients: BTreeMap<i32, Patient>,
    sites: Vec<Site>,
    images: Vec<Image>,
    next_site_id: i32,
    next_image_id: i32,
}

/// 内存版ImportStore
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_site_id: 1,
                next_image_id: 1,
                ..Inner::default()
            }),
        }
    }

    pub fn patient_count(&self) -> usize {
        self.inner.lock().unwrap().patients.len()
    }

    pub fn sites(&self) -> Vec<Site> {
        self.inner.lock().unwrap().sites.clone()
    }

    pub fn images(&self) -> Vec<Image> {
        self.inner.lock().unwrap().images.clone()
    }

    pub fn patients(&self) -> Vec<Patient> {
        self.inner.lock().unwrap().patients.values().cloned().collect()
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn get_patient(&self, id: i32) -> Result<Option<Patient>> {
        Ok(self.inner.lock().unwrap().patients.get(&id).cloned())
    }

    async fn create_patient_with_id(&self, id: i32, patient: &NewPatient) -> Result<Patient> {
        let mut inner = self.inner.lock().unwrap();
        if inner.patients.contains_key(&id) {
            return Err(RetinaError::Database(format!("duplicate patient id {}", id)));
        }
        let now = Utc::now();
        let created = Patient {
            id,
            birth_date: patient.birth_date,
            sex: patient.sex,
            created_at: now,
            modified_at: now,
        };
        inner.patients.insert(id, created.clone());
        Ok(created)
    }

    async fn update_patient(&self, id: i32, update: &PatientUpdate) -> Result<Patient> {
        let mut inner = self.inner.lock().unwrap();
        let patient = inner
            .patients
            .get_mut(&id)
            .ok_or_else(|| RetinaError::NotFound(format!("Patient with ID {} not found", id)))?;
        if let Some(birth_date) = update.birth_date {
            patient.birth_date = birth_date;
        }
        if let Some(sex) = update.sex {
            patient.sex = sex;
        }
        patient.modified_at = Utc::now();
        Ok(patient.clone())
    }

    async fn count_patients(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().patients.len() as i64)
    }

    async fn max_patient_id(&self) -> Result<Option<i32>> {
        Ok(self.inner.lock().unwrap().patients.keys().max().copied())
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut sites = self.inner.lock().unwrap().sites.clone();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    async fn create_site(&self, site: &NewSite) -> Result<Site> {
        let mut inner = self.inner.lock().unwrap();
        if inner.sites.iter().any(|s| s.name == site.name) {
            return Err(RetinaError::Database(format!("duplicate site name {}", site.name)));
        }
        let now = Utc::now();
        let created = Site {
            id: inner.next_site_id,
            name: site.name.clone(),
            location: site.location.clone(),
            created_at: now,
            modified_at: now,
        };
        inner.next_site_id += 1;
        inner.sites.push(created.clone());
        Ok(created)
    }

    async fn patient_ids_without_images(&self) -> Result<Vec<i32>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .patients
            .keys()
            .filter(|id| !inner.images.iter().any(|img| img.patient_id == **id))
            .copied()
            .collect())
    }

    async fn create_image(&self, image: &NewImage) -> Result<Image> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let created = Image {
            id: inner.next_image_id,
            patient_id: image.patient_id,
            site_id: image.site_id,
            eye_side: image.eye_side,
            quality_score: image.quality_score,
            anatomy_score: image.anatomy_score,
            over_illuminated: image.over_illuminated,
            image_path: image.image_path.clone(),
            acquisition_date: image.acquisition_date,
            created_at: now,
            modified_at: now,
        };
        inner.next_image_id += 1;
        inner.images.push(created.clone());
        Ok(created)
    }
}
