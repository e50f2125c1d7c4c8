use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::{
    auth::Authorizer,
    collaborators::{EditableRepository, FileStore, NotificationLevel, NotificationSink, Repository},
    entity::{EditableEntity, ListEntity},
    error::ListingError,
    validation::ValidationErrors,
};

pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased extension of the original file name.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState<E> {
    #[default]
    Closed,
    Viewing(E),
    Editing(E),
}

/// The record behind the view/edit modal of an index screen.
#[derive(Debug, Clone)]
pub struct RecordEditingSession<E: ListEntity> {
    state: SessionState<E>,
    validation_errors: ValidationErrors,
}

impl<E: ListEntity> Default for RecordEditingSession<E> {
    fn default() -> Self {
        Self {
            state: SessionState::Closed,
            validation_errors: ValidationErrors::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModalFlags {
    pub show_modal: bool,
    pub edit_modal: bool,
}

impl<E: ListEntity> RecordEditingSession<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState<E> {
        &self.state
    }

    pub fn entity(&self) -> Option<&E> {
        match &self.state {
            SessionState::Closed => None,
            SessionState::Viewing(entity) | SessionState::Editing(entity) => Some(entity),
        }
    }

    pub fn modal_flags(&self) -> ModalFlags {
        ModalFlags {
            show_modal: matches!(self.state, SessionState::Viewing(_)),
            edit_modal: matches!(self.state, SessionState::Editing(_)),
        }
    }

    pub fn validation_errors(&self) -> &ValidationErrors {
        &self.validation_errors
    }

    pub async fn open_view<R>(
        &mut self,
        id: E::Id,
        repository: &R,
        authz: &Authorizer,
    ) -> Result<E, ListingError>
    where
        R: Repository<E> + ?Sized,
    {
        authz.require(E::GRANTS.show)?;
        let entity = load(repository, id).await?;
        self.state = SessionState::Viewing(entity.clone());
        Ok(entity)
    }

    pub async fn open_edit<R>(
        &mut self,
        id: E::Id,
        repository: &R,
        authz: &Authorizer,
    ) -> Result<E, ListingError>
    where
        R: Repository<E> + ?Sized,
    {
        authz.require(E::GRANTS.edit)?;
        self.validation_errors.clear();
        let entity = load(repository, id).await?;
        self.state = SessionState::Editing(entity.clone());
        Ok(entity)
    }

    /// Closes the modal, discarding the record and its validation errors.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.validation_errors.clear();
    }
}

impl<E: EditableEntity> RecordEditingSession<E> {
    /// Validates and persists the open record.
    ///
    /// `fields` are laid over the record's current form values, so a field
    /// the caller leaves out keeps its stored value.
    ///
    /// Validation failures keep the session in `Editing` with
    /// [`RecordEditingSession::validation_errors`] filled in and nothing
    /// persisted. Storage failures also keep the session open and raise an
    /// error notification.
    pub async fn submit_edit<R>(
        &mut self,
        fields: &Map<String, Value>,
        image: Option<UploadedFile>,
        repository: &R,
        files: Option<&dyn FileStore>,
        authz: &Authorizer,
        notifier: &dyn NotificationSink,
    ) -> Result<E, ListingError>
    where
        R: EditableRepository<E> + ?Sized,
    {
        authz.require(E::GRANTS.edit)?;
        let SessionState::Editing(current) = &self.state else {
            return Err(ListingError::NoActiveEdit);
        };
        let mut entity = current.clone();
        let mut form = entity.form_fields();
        form.extend(fields.iter().map(|(name, value)| (name.clone(), value.clone())));

        let mut errors = E::rules().validate(&form).err().unwrap_or_default();
        let image = image.filter(|file| !file.is_empty());
        let extension = match &image {
            Some(file) => match file.extension() {
                Some(ext) => Some(ext),
                None => {
                    errors.add(IMAGE_FIELD, "The image must have a file extension.");
                    None
                }
            },
            None => None,
        };
        if errors.is_empty() {
            if let Err(apply_errors) = entity.apply_fields(&form) {
                errors.merge(apply_errors);
            }
        }
        if !errors.is_empty() {
            debug!(entity = E::NAME, fields = ?errors.field_names(), "edit rejected by validation");
            self.validation_errors = errors.clone();
            return Err(ListingError::ValidationFailed(errors));
        }
        self.validation_errors.clear();

        if let (Some(file), Some(extension)) = (image, extension) {
            let file_name = image_file_name(entity.display_name(), &entity.id(), &extension);
            let stored = match files {
                Some(store) => store
                    .store_as(E::UPLOAD_FOLDER, &file_name, &file.bytes)
                    .await
                    .map(|_| ())
                    .map_err(|source| {
                        ListingError::persistence(format!("failed to store {file_name}"), source)
                    }),
                None => Err(ListingError::persistence(
                    "image uploads are not configured",
                    anyhow::anyhow!("no file store attached"),
                )),
            };
            if let Err(err) = stored {
                error!(entity = E::NAME, error = %err, "image upload failed");
                notifier.notify(NotificationLevel::Error, &err.to_string());
                return Err(err);
            }
            entity.set_image(file_name);
        }

        entity.touch(Utc::now());
        if let Err(source) = repository.save(&entity).await {
            error!(entity = E::NAME, id = %entity.id(), error = %source, "failed to save record");
            let err = ListingError::persistence(format!("{} could not be saved.", E::LABEL), source);
            notifier.notify(NotificationLevel::Error, &err.to_string());
            return Err(err);
        }

        self.state = SessionState::Closed;
        notifier.notify(
            NotificationLevel::Success,
            &format!("{} updated successfully.", E::LABEL),
        );
        Ok(entity)
    }
}

async fn load<E, R>(repository: &R, id: E::Id) -> Result<E, ListingError>
where
    E: ListEntity,
    R: Repository<E> + ?Sized,
{
    repository
        .find_by_id(id)
        .await
        .map_err(|source| ListingError::persistence(format!("failed to load {} {id}", E::LABEL), source))?
        .ok_or_else(|| ListingError::NotFound {
            entity: E::NAME,
            id: id.to_string(),
        })
}

/// `slug(name).ext`, falling back to `id.ext` when the name has no
/// slug-able characters.
pub fn image_file_name(name: &str, id: &dyn std::fmt::Display, extension: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        format!("{id}.{extension}")
    } else {
        format!("{slug}.{extension}")
    }
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Red Office--Chair (XL) "), "red-office-chair-xl");
        assert_eq!(slugify("Café au lait"), "caf-au-lait");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn image_name_uses_slug_and_lowercased_extension() {
        let upload = UploadedFile::new("Photo.JPG", vec![1]);
        let ext = upload.extension().expect("extension");
        assert_eq!(image_file_name("Red Chair", &7, &ext), "red-chair.jpg");
        assert_eq!(image_file_name("???", &7, &ext), "7.jpg");
    }

    #[test]
    fn upload_without_extension_has_none() {
        assert_eq!(UploadedFile::new("README", vec![1]).extension(), None);
        assert_eq!(UploadedFile::new("a.b/c", vec![1]).extension(), None);
    }
}
