//! Reusable list-view controller for back-office index screens.
//!
//! Every index screen follows the same flow: search, sort and paginate one
//! entity table, select rows for bulk actions, open a row for viewing or
//! editing, and import or export the table. The pieces are:
//!
//! - [`ListQueryController`] owns the query state and composes the rest.
//! - [`BulkSelectionManager`] tracks selected ids for bulk deletes.
//! - [`RecordEditingSession`] is the view/edit modal state machine.
//! - [`ImportExportGateway`] hands files to import/export collaborators.
//!
//! Storage, authorization, file storage, formatting and notifications are
//! collaborators behind the traits in [`collaborators`] and [`auth`].

pub mod auth;
pub mod collaborators;
pub mod controller;
pub mod editing;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod lookup;
pub mod query;
pub mod selection;
pub mod validation;

pub use auth::{Actor, AuthorizationOracle, Authorizer, StaticPolicy};
pub use collaborators::{
    DeleteOutcome, EditableRepository, FileStore, LookupSource, Notification, NotificationLevel,
    NotificationLog, NotificationSink, Repository, TracingNotifier,
};
pub use controller::ListQueryController;
pub use editing::{slugify, RecordEditingSession, SessionState, UploadedFile};
pub use entity::{EditableEntity, Exportable, Grants, ListEntity};
pub use error::ListingError;
pub use gateway::{
    Artifact, ExportFormat, ExportTable, Formatter, ImportExportGateway, ImportReport,
    RowFailure, RowImporter, RowOutcome, RowStatus,
};
pub use lookup::{LookupCache, LookupCategory};
pub use query::{ListQuery, ListQueryState, PageRequest, PagedResult, SortDirection};
pub use selection::{BulkDeleteReport, BulkSelectionManager};
pub use validation::{Rule, RuleSet, ValidationErrors};
