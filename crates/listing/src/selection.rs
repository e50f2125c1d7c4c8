use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{error, info};

use crate::{
    auth::Authorizer,
    collaborators::{DeleteOutcome, Repository},
    entity::ListEntity,
    error::ListingError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkDeleteReport {
    pub requested: usize,
    pub deleted: u64,
}

/// Ids selected for a bulk action.
#[derive(Debug, Clone)]
pub struct BulkSelectionManager<E: ListEntity> {
    selected: BTreeSet<E::Id>,
}

impl<E: ListEntity> Default for BulkSelectionManager<E> {
    fn default() -> Self {
        Self {
            selected: BTreeSet::new(),
        }
    }
}

impl<E: ListEntity> BulkSelectionManager<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, id: E::Id) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
    }

    pub fn select_all(&mut self, visible_ids: impl IntoIterator<Item = E::Id>) {
        self.selected.extend(visible_ids);
    }

    pub fn deselect(&mut self, id: E::Id) {
        self.selected.remove(&id);
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn count(&self) -> usize {
        self.selected.len()
    }

    pub fn contains(&self, id: E::Id) -> bool {
        self.selected.contains(&id)
    }

    pub fn ids(&self) -> Vec<E::Id> {
        self.selected.iter().copied().collect()
    }

    /// Deletes every selected row or none of them.
    ///
    /// On success the selection is cleared. When some ids no longer exist
    /// the store deletes nothing; those ids are dropped from the selection
    /// and reported in [`ListingError::BulkDeleteRejected`].
    pub async fn bulk_delete<R>(
        &mut self,
        repository: &R,
        authz: &Authorizer,
    ) -> Result<BulkDeleteReport, ListingError>
    where
        R: Repository<E> + ?Sized,
    {
        authz.require(E::GRANTS.delete)?;

        let ids = self.ids();
        if ids.is_empty() {
            return Ok(BulkDeleteReport {
                requested: 0,
                deleted: 0,
            });
        }

        let outcome = repository.delete_by_ids(&ids).await.map_err(|source| {
            error!(entity = E::NAME, error = %source, "bulk delete failed");
            ListingError::persistence(format!("failed to delete selected {}", E::NAME), source)
        })?;

        match outcome {
            DeleteOutcome::Deleted(deleted) => {
                info!(
                    entity = E::NAME,
                    actor = %authz.actor().name,
                    requested = ids.len(),
                    deleted,
                    "bulk delete applied"
                );
                self.clear();
                Ok(BulkDeleteReport {
                    requested: ids.len(),
                    deleted,
                })
            }
            DeleteOutcome::Missing(missing) => {
                for id in &missing {
                    self.selected.remove(id);
                }
                Err(ListingError::BulkDeleteRejected {
                    entity: E::NAME,
                    missing: missing.iter().map(ToString::to_string).collect(),
                })
            }
        }
    }
}
