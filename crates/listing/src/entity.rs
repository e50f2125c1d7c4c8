use std::{fmt, hash::Hash};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    lookup::LookupCategory,
    validation::{RuleSet, ValidationErrors},
};

/// Grant names checked before each operation of an index screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grants {
    pub access: &'static str,
    pub show: &'static str,
    pub edit: &'static str,
    pub delete: &'static str,
    pub import: &'static str,
    pub export: &'static str,
}

/// Static per-entity configuration of an index screen.
pub trait ListEntity: Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Plural, lowercase name used in file names and messages ("products").
    const NAME: &'static str;
    /// Singular display label ("Product").
    const LABEL: &'static str;
    const ORDERABLE: &'static [&'static str];
    const SEARCHABLE: &'static [&'static str];
    const GRANTS: Grants;
    const DEFAULT_PAGE_SIZE: u32;
    const LOOKUPS: &'static [LookupCategory] = &[];

    fn id(&self) -> Self::Id;
}

pub trait EditableEntity: ListEntity {
    /// Folder of the file store that receives uploaded images.
    const UPLOAD_FOLDER: &'static str;

    fn rules() -> RuleSet;

    /// Current values in the shape accepted by [`EditableEntity::apply_fields`].
    /// Submitted edits are merged over these before validation.
    fn form_fields(&self) -> Map<String, Value>;

    /// Copies already validated fields onto the entity.
    fn apply_fields(&mut self, fields: &Map<String, Value>) -> Result<(), ValidationErrors>;

    /// Name that uploaded image files are slugged from.
    fn display_name(&self) -> &str;

    fn set_image(&mut self, file_name: String);

    fn touch(&mut self, now: DateTime<Utc>);
}

pub trait Exportable: ListEntity {
    const EXPORT_HEADERS: &'static [&'static str];

    fn export_row(&self) -> Vec<String>;
}
