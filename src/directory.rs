//! Read-mostly cache of the department directory.
//!
//! Resolution runs against an immutable snapshot, so per-request routing is
//! pure CPU work over a small in-memory set. Refreshes build a complete new
//! snapshot and swap it in whole; readers never observe a partially updated
//! directory and never block on a refresh in progress.
//!
//! An empty directory is a deployment fault, caught once at startup by
//! [`DepartmentDirectory::load`]. A later refresh that comes back empty (or
//! fails outright) keeps the previous snapshot serving.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::Department;
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Startup-time configuration fault: nothing to route to.
    #[error("no departments configured; seed the directory before serving traffic")]
    NoDepartmentsConfigured,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// One consistent view of the directory.
#[derive(Debug)]
pub struct DirectorySnapshot {
    /// In ascending id order, as the geo-resolver expects.
    pub departments: Vec<Department>,

    /// The designated default: the `is_default` department, else the lowest
    /// id. Guaranteed present by construction.
    pub default_department_id: i64,
}

/// Shared handle to the current directory snapshot.
#[derive(Clone, Default)]
pub struct DepartmentDirectory {
    inner: Arc<RwLock<Option<Arc<DirectorySnapshot>>>>,
}

impl DepartmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial load. Fails with [`DirectoryError::NoDepartmentsConfigured`]
    /// when the store has no departments, so a misconfigured deployment is
    /// rejected before it takes traffic.
    pub async fn load(&self, storage: &Storage) -> Result<(), DirectoryError> {
        let snapshot = read_snapshot(storage).await?;
        debug!(
            departments = snapshot.departments.len(),
            default_department_id = snapshot.default_department_id,
            "department directory loaded"
        );
        self.swap(snapshot);
        Ok(())
    }

    /// Periodic refresh. Keeps the previous snapshot when the read fails or
    /// comes back empty.
    pub async fn refresh(&self, storage: &Storage) {
        match read_snapshot(storage).await {
            Ok(snapshot) => {
                debug!(
                    departments = snapshot.departments.len(),
                    "department directory refreshed"
                );
                self.swap(snapshot);
            }
            Err(err) => {
                warn!(error = %err, "department directory refresh failed; keeping previous snapshot");
            }
        }
    }

    /// The current snapshot, or `None` if the directory was never loaded.
    pub fn snapshot(&self) -> Option<Arc<DirectorySnapshot>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap(&self, snapshot: DirectorySnapshot) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
    }
}

async fn read_snapshot(storage: &Storage) -> Result<DirectorySnapshot, DirectoryError> {
    let departments = storage.select_departments().await?;

    let default_department_id = departments
        .iter()
        .find(|d| d.is_default)
        .or_else(|| departments.first())
        .map(|d| d.department_id)
        .ok_or(DirectoryError::NoDepartmentsConfigured)?;

    Ok(DirectorySnapshot {
        departments,
        default_department_id,
    })
}
