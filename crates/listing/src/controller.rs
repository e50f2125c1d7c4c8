use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::{
    auth::Authorizer,
    collaborators::{
        DeleteOutcome, EditableRepository, FileStore, LookupSource, NotificationLevel,
        NotificationSink, Repository, TracingNotifier,
    },
    editing::{RecordEditingSession, UploadedFile},
    entity::{EditableEntity, Exportable, ListEntity},
    error::ListingError,
    gateway::{Artifact, ExportFormat, Formatter, ImportExportGateway, ImportReport, RowImporter},
    lookup::LookupCache,
    query::{ListQuery, ListQueryState, PageRequest, PagedResult},
    selection::{BulkDeleteReport, BulkSelectionManager},
};

pub const DEFAULT_PAGINATION_OPTIONS: &[u32] = &[10, 25, 50, 100];

/// State and actions of one index screen for one request.
pub struct ListQueryController<E: ListEntity, R> {
    state: ListQueryState,
    scope: Option<i64>,
    selection: BulkSelectionManager<E>,
    editing: RecordEditingSession<E>,
    lookups: LookupCache,
    pagination_options: Vec<u32>,
    authz: Authorizer,
    repository: R,
    notifier: Arc<dyn NotificationSink>,
    files: Option<Arc<dyn FileStore>>,
}

impl<E: ListEntity, R: Repository<E>> ListQueryController<E, R> {
    pub fn new(repository: R, authz: Authorizer) -> Self {
        Self {
            state: ListQueryState::new(E::DEFAULT_PAGE_SIZE),
            scope: None,
            selection: BulkSelectionManager::new(),
            editing: RecordEditingSession::new(),
            lookups: LookupCache::default(),
            pagination_options: DEFAULT_PAGINATION_OPTIONS.to_vec(),
            authz,
            repository,
            notifier: Arc::new(TracingNotifier),
            files: None,
        }
    }

    /// Restores state decoded from a query string.
    pub fn with_state(mut self, state: ListQueryState) -> Self {
        self.state = state;
        self
    }

    pub fn with_pagination_options(mut self, options: Vec<u32>) -> Self {
        let options: Vec<u32> = options.into_iter().filter(|n| *n > 0).collect();
        if !options.is_empty() {
            self.pagination_options = options;
        }
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_scope(mut self, scope: i64) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Loads the lookup lists the entity declares. Requires the access grant.
    pub async fn mount(&mut self, source: &dyn LookupSource) -> Result<(), ListingError> {
        self.authz.require(E::GRANTS.access)?;
        self.lookups = LookupCache::load(source, E::LOOKUPS).await?;
        Ok(())
    }

    pub fn state(&self) -> &ListQueryState {
        &self.state
    }

    pub fn scope(&self) -> Option<i64> {
        self.scope
    }

    pub fn lookups(&self) -> &LookupCache {
        &self.lookups
    }

    pub fn pagination_options(&self) -> &[u32] {
        &self.pagination_options
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authz
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn on_search_changed(&mut self, text: impl Into<String>) {
        self.state.set_search(text.into());
    }

    pub fn on_page_size_changed(&mut self, page_size: u32) -> Result<(), ListingError> {
        if page_size == 0 {
            return Err(ListingError::InvalidPageSize);
        }
        self.state.set_page_size(page_size);
        Ok(())
    }

    /// Same field flips the direction; a new field starts descending.
    pub fn on_sort_requested(&mut self, field: &str) -> Result<(), ListingError> {
        let Some(field) = E::ORDERABLE.iter().find(|candidate| **candidate == field) else {
            return Err(ListingError::InvalidSortField {
                entity: E::NAME,
                field: field.to_string(),
            });
        };
        let direction = if self.state.sort_field() == *field {
            self.state.sort_direction().flipped()
        } else {
            crate::query::SortDirection::Desc
        };
        self.state.set_sort(field, direction);
        Ok(())
    }

    pub fn go_to_page(&mut self, page: u32) {
        self.state.set_page(page);
    }

    pub fn refresh(&mut self) {
        self.state.set_page(1);
    }

    /// Points the list at another parent record and starts from page 1.
    pub fn set_scope(&mut self, scope: i64) {
        self.scope = Some(scope);
        self.state.set_page(1);
        self.selection.clear();
    }

    pub fn list_query(&self) -> ListQuery {
        let search = self.state.search().trim();
        ListQuery {
            search: (!search.is_empty()).then(|| search.to_string()),
            sort_field: self.state.sort_field().to_string(),
            sort_direction: self.state.sort_direction(),
            scope: self.scope,
        }
    }

    pub async fn fetch_page(&self) -> Result<PagedResult<E>, ListingError> {
        self.authz.require(E::GRANTS.access)?;
        let query = self.list_query();
        let page = PageRequest {
            page: self.state.current_page(),
            page_size: self.state.page_size(),
        };
        debug!(entity = E::NAME, ?query, page = page.page, page_size = page.page_size, "fetching page");
        self.repository
            .query_page(&query, page)
            .await
            .map_err(|source| {
                error!(entity = E::NAME, error = %source, "list query failed");
                ListingError::persistence(format!("failed to list {}", E::NAME), source)
            })
    }

    pub fn selection(&self) -> &BulkSelectionManager<E> {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut BulkSelectionManager<E> {
        &mut self.selection
    }

    pub fn selected_count(&self) -> usize {
        self.selection.count()
    }

    pub fn reset_selected(&mut self) {
        self.selection.clear();
    }

    pub async fn delete_selected(&mut self) -> Result<BulkDeleteReport, ListingError> {
        let result = self.selection.bulk_delete(&self.repository, &self.authz).await;
        match &result {
            Ok(report) if report.deleted > 0 => self.notifier.notify(
                NotificationLevel::Success,
                &format!("{} {} deleted successfully.", report.deleted, E::NAME),
            ),
            Ok(_) | Err(ListingError::Forbidden { .. }) => {}
            Err(err) => self.notifier.notify(NotificationLevel::Error, &err.to_string()),
        }
        result
    }

    pub async fn delete(&mut self, id: E::Id) -> Result<(), ListingError> {
        self.authz.require(E::GRANTS.delete)?;
        let outcome = self.repository.delete_by_ids(&[id]).await.map_err(|source| {
            let err = ListingError::persistence(format!("failed to delete {} {id}", E::LABEL), source);
            self.notifier.notify(NotificationLevel::Error, &err.to_string());
            err
        })?;
        match outcome {
            DeleteOutcome::Deleted(_) => {
                info!(entity = E::NAME, %id, actor = %self.authz.actor().name, "record deleted");
                self.selection.deselect(id);
                self.notifier.notify(
                    NotificationLevel::Success,
                    &format!("{} deleted successfully.", E::LABEL),
                );
                Ok(())
            }
            DeleteOutcome::Missing(_) => Err(ListingError::NotFound {
                entity: E::NAME,
                id: id.to_string(),
            }),
        }
    }

    pub fn editing(&self) -> &RecordEditingSession<E> {
        &self.editing
    }

    pub async fn open_view(&mut self, id: E::Id) -> Result<E, ListingError> {
        self.editing.open_view(id, &self.repository, &self.authz).await
    }

    pub async fn open_edit(&mut self, id: E::Id) -> Result<E, ListingError> {
        self.editing.open_edit(id, &self.repository, &self.authz).await
    }

    pub fn close_modal(&mut self) {
        self.editing.close();
    }

    pub fn gateway(&self) -> ImportExportGateway<E> {
        ImportExportGateway::new(self.authz.clone())
    }

    pub fn open_import(&mut self) -> Result<(), ListingError> {
        self.gateway().open_import()?;
        self.editing.close();
        Ok(())
    }

    pub async fn import_from(
        &self,
        bytes: &[u8],
        importer: &dyn RowImporter,
    ) -> Result<ImportReport, ListingError> {
        self.gateway()
            .import_from(bytes, importer, self.notifier.as_ref())
            .await
    }

    /// Exports the rows matching the current search, sort and scope.
    pub async fn export_all(
        &self,
        format: ExportFormat,
        formatter: &dyn Formatter,
    ) -> Result<Artifact, ListingError>
    where
        E: Exportable,
    {
        self.gateway()
            .export_all(&self.repository, &self.list_query(), format, formatter)
            .await
    }
}

impl<E: EditableEntity, R: EditableRepository<E>> ListQueryController<E, R> {
    pub async fn submit_edit(
        &mut self,
        fields: &Map<String, Value>,
        image: Option<UploadedFile>,
    ) -> Result<E, ListingError> {
        self.editing
            .submit_edit(
                fields,
                image,
                &self.repository,
                self.files.as_deref(),
                &self.authz,
                self.notifier.as_ref(),
            )
            .await
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
