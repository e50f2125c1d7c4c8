use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    entity::{EditableEntity, ListEntity},
    lookup::LookupCategory,
    query::{ListQuery, PageRequest, PagedResult},
};

/// Result of an all-or-nothing delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome<Id> {
    /// Every requested row was deleted.
    Deleted(u64),
    /// Some ids did not resolve; nothing was deleted.
    Missing(Vec<Id>),
}

impl<Id> DeleteOutcome<Id> {
    pub fn map_ids<T>(self, f: impl FnMut(Id) -> T) -> DeleteOutcome<T> {
        match self {
            Self::Deleted(count) => DeleteOutcome::Deleted(count),
            Self::Missing(ids) => DeleteOutcome::Missing(ids.into_iter().map(f).collect()),
        }
    }
}

#[async_trait]
pub trait Repository<E: ListEntity>: Send + Sync {
    async fn find_by_id(&self, id: E::Id) -> anyhow::Result<Option<E>>;

    /// Deletes all of `ids` in one transaction, or none of them.
    async fn delete_by_ids(&self, ids: &[E::Id]) -> anyhow::Result<DeleteOutcome<E::Id>>;

    async fn query_page(&self, query: &ListQuery, page: PageRequest)
        -> anyhow::Result<PagedResult<E>>;

    /// Same filter and ordering as [`Repository::query_page`], without paging.
    async fn query_all(&self, query: &ListQuery) -> anyhow::Result<Vec<E>>;
}

#[async_trait]
pub trait EditableRepository<E: EditableEntity>: Repository<E> {
    async fn save(&self, entity: &E) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores `bytes` as `folder/name` and returns the stored location.
    async fn store_as(&self, folder: &str, name: &str, bytes: &[u8]) -> anyhow::Result<String>;
}

#[async_trait]
pub trait LookupSource: Send + Sync {
    async fn lookup(&self, category: LookupCategory) -> anyhow::Result<BTreeMap<i64, String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Fire-and-forget user feedback.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);
}

/// Collects notifications so a request handler can return them.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationSink for NotificationLog {
    fn notify(&self, level: NotificationLevel, message: &str) {
        let entry = Notification {
            level,
            message: message.to_string(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Success | NotificationLevel::Info => info!(%message, "notification"),
            NotificationLevel::Warning => warn!(%message, "notification"),
            NotificationLevel::Error => error!(%message, "notification"),
        }
    }
}
