use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    auth::Authorizer,
    collaborators::{NotificationLevel, NotificationSink, Repository},
    entity::{Exportable, ListEntity},
    error::ListingError,
    query::ListQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Spreadsheet,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Spreadsheet => "csv",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Spreadsheet => "text/csv; charset=utf-8",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "spreadsheet" | "csv" | "excel" => Some(Self::Spreadsheet),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub trait Formatter: Send + Sync {
    fn to_spreadsheet(&self, table: &ExportTable) -> anyhow::Result<Vec<u8>>;
    fn to_pdf(&self, table: &ExportTable) -> anyhow::Result<Vec<u8>>;
}

/// A downloadable export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Imported,
    Rejected(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOutcome {
    /// 1-based data row, not counting the header.
    pub row: usize,
    pub status: RowStatus,
}

#[async_trait]
pub trait RowImporter: Send + Sync {
    /// Parses and persists each row independently. An `Err` means the file
    /// as a whole could not be read.
    async fn parse_and_persist(&self, bytes: &[u8]) -> anyhow::Result<Vec<RowOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub failed: Vec<RowFailure>,
}

impl ImportReport {
    pub fn from_outcomes(outcomes: Vec<RowOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome.status {
                RowStatus::Imported => report.imported += 1,
                RowStatus::Rejected(errors) => report.failed.push(RowFailure {
                    row: outcome.row,
                    errors,
                }),
            }
        }
        report
    }
}

/// Import and export entry points of one index screen.
pub struct ImportExportGateway<E: ListEntity> {
    authz: Authorizer,
    _entity: PhantomData<fn() -> E>,
}

impl<E: ListEntity> ImportExportGateway<E> {
    pub fn new(authz: Authorizer) -> Self {
        Self {
            authz,
            _entity: PhantomData,
        }
    }

    /// Gate for showing the import dialog.
    pub fn open_import(&self) -> Result<(), ListingError> {
        self.authz.require(E::GRANTS.import)
    }

    pub async fn import_from(
        &self,
        bytes: &[u8],
        importer: &dyn RowImporter,
        notifier: &dyn NotificationSink,
    ) -> Result<ImportReport, ListingError> {
        self.authz.require(E::GRANTS.import)?;
        if bytes.is_empty() {
            return Err(ListingError::EmptyImportFile);
        }

        let outcomes = match importer.parse_and_persist(bytes).await {
            Ok(outcomes) => outcomes,
            Err(source) => {
                error!(entity = E::NAME, error = %source, "import failed");
                let err =
                    ListingError::persistence(format!("{} import failed", E::LABEL), source);
                notifier.notify(NotificationLevel::Error, &err.to_string());
                return Err(err);
            }
        };
        let report = ImportReport::from_outcomes(outcomes);
        info!(
            entity = E::NAME,
            actor = %self.authz.actor().name,
            imported = report.imported,
            failed = report.failed.len(),
            "import finished"
        );

        if report.failed.is_empty() {
            notifier.notify(
                NotificationLevel::Success,
                &format!("{} {} imported successfully.", report.imported, E::NAME),
            );
        } else {
            notifier.notify(
                NotificationLevel::Warning,
                &format!(
                    "{} {} imported, {} rows rejected.",
                    report.imported,
                    E::NAME,
                    report.failed.len()
                ),
            );
        }
        Ok(report)
    }

    /// Exports every row matching `query`, ignoring pagination.
    pub async fn export_all<R>(
        &self,
        repository: &R,
        query: &ListQuery,
        format: ExportFormat,
        formatter: &dyn Formatter,
    ) -> Result<Artifact, ListingError>
    where
        E: Exportable,
        R: Repository<E> + ?Sized,
    {
        self.authz.require(E::GRANTS.export)?;
        let rows = repository.query_all(query).await.map_err(|source| {
            ListingError::persistence(format!("failed to read {} for export", E::NAME), source)
        })?;

        let table = ExportTable {
            title: E::NAME.to_string(),
            headers: E::EXPORT_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: rows.iter().map(Exportable::export_row).collect(),
        };
        let bytes = match format {
            ExportFormat::Spreadsheet => formatter.to_spreadsheet(&table),
            ExportFormat::Pdf => formatter.to_pdf(&table),
        }
        .map_err(|source| {
            ListingError::persistence(format!("failed to render {} export", E::NAME), source)
        })?;
        info!(entity = E::NAME, rows = table.rows.len(), format = ?format, "export rendered");

        Ok(Artifact {
            file_name: format!("{}.{}", E::NAME, format.extension()),
            content_type: format.content_type(),
            bytes,
        })
    }
}
