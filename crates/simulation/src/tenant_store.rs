//! In-memory tenant store.

use async_trait::async_trait;
use certchain_core::{StoreError, TenantStore};
use certchain_types::{
    Certificate, CertificateId, CertificateStatus, LedgerAssetId, Student, StudentId,
    SubmissionSignature,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Tables {
    students: HashMap<StudentId, Student>,
    certificates: HashMap<CertificateId, Certificate>,
}

/// Tenant store backed by hash maps.
///
/// Enforces the per-tenant unique certificate number and conditional status
/// updates the same way a relational store with constraints would.
pub struct MemoryTenantStore {
    name: String,
    tables: Mutex<Tables>,
    closed: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryTenantStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Mutex::new(Tables::default()),
            closed: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Builder: seed students.
    pub fn with_students(self, students: impl IntoIterator<Item = Student>) -> Self {
        for student in students {
            self.add_student(student);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_student(&self, student: Student) {
        self.tables.lock().students.insert(student.id.clone(), student);
    }

    /// Snapshot of all certificate rows, oldest first.
    pub fn certificates(&self) -> Vec<Certificate> {
        let mut rows: Vec<_> = self.tables.lock().certificates.values().cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reopen after [`TenantStore::close`].
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} is down", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn find_student(&self, id: &StudentId) -> Result<Option<Student>, StoreError> {
        self.check()?;
        Ok(self.tables.lock().students.get(id).cloned())
    }

    async fn find_active_certificate(
        &self,
        student: &StudentId,
        badge_title: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .certificates
            .values()
            .find(|c| {
                &c.student_id == student && c.badge_title == badge_title && c.status.blocks_reissue()
            })
            .cloned())
    }

    async fn count_certificates(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.tables.lock().certificates.len() as u64)
    }

    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock();
        if tables
            .certificates
            .values()
            .any(|c| c.certificate_number == certificate.certificate_number)
        {
            return Err(StoreError::UniqueViolation(format!(
                "certificate_number {}",
                certificate.certificate_number
            )));
        }
        if tables.certificates.contains_key(&certificate.id) {
            return Err(StoreError::UniqueViolation(format!("id {}", certificate.id)));
        }
        tables.certificates.insert(certificate.id, certificate);
        Ok(())
    }

    async fn get_certificate(&self, id: CertificateId) -> Result<Option<Certificate>, StoreError> {
        self.check()?;
        Ok(self.tables.lock().certificates.get(&id).cloned())
    }

    async fn find_by_asset(
        &self,
        asset_id: &LedgerAssetId,
    ) -> Result<Option<Certificate>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .certificates
            .values()
            .find(|c| c.ledger_asset_id.as_ref() == Some(asset_id))
            .cloned())
    }

    async fn find_by_submission(
        &self,
        signature: &SubmissionSignature,
    ) -> Result<Option<Certificate>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .certificates
            .values()
            .find(|c| c.submission_signature.as_ref() == Some(signature))
            .cloned())
    }

    async fn pending_with_submission(&self) -> Result<Vec<Certificate>, StoreError> {
        self.check()?;
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .certificates
            .values()
            .filter(|c| c.status == CertificateStatus::Pending && c.submission_signature.is_some())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn update_certificate(
        &self,
        certificate: &Certificate,
        expected: CertificateStatus,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock();
        let current = tables
            .certificates
            .get_mut(&certificate.id)
            .ok_or_else(|| StoreError::StaleState(format!("{} does not exist", certificate.id)))?;
        if current.status != expected {
            return Err(StoreError::StaleState(format!(
                "{} is {}, expected {}",
                certificate.id, current.status, expected
            )));
        }
        *current = certificate.clone();
        Ok(())
    }
}
