use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::{FromRequest, Multipart, Request};
use bytes::Bytes;

use crate::{
    error::ApiError,
    storage::{MediaKind, MediaRef, MediaStore},
};

/// Multipart field carrying the single uploaded file.
pub const FILE_FIELD: &str = "file";

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Text fields plus at most one file, read fully into memory.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    pub file: Option<UploadItem>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart) -> Result<Self, ApiError> {
        let mut form = MultipartForm::default();
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed form data: {e}")))?
        {
            let Some(name) = field.name().map(|s| s.to_string()) else {
                continue;
            };
            if name == FILE_FIELD {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::PayloadTooLarge(format!("Upload rejected: {e}")))?;
                form.file = Some(UploadItem { body, content_type });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed field {name}: {e}")))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    #[cfg(test)]
    pub fn from_fields(pairs: &[(&str, &str)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            file: None,
        }
    }

    /// Trimmed, non-empty text value.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// All named fields, or "Please add all fields".
    pub fn require<const N: usize>(&self, names: [&str; N]) -> Result<[&str; N], ApiError> {
        let mut out = [""; N];
        for (slot, name) in out.iter_mut().zip(names) {
            *slot = self
                .text(name)
                .ok_or_else(|| ApiError::bad_request("Please add all fields"))?;
        }
        Ok(out)
    }
}

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mp = Multipart::from_request(req, state).await?;
        Self::read(mp).await
    }
}

pub async fn store_upload(
    storage: &dyn MediaStore,
    kind: MediaKind,
    item: UploadItem,
) -> Result<MediaRef, ApiError> {
    if item.body.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if item.body.len() > kind.max_bytes() {
        return Err(ApiError::PayloadTooLarge(format!(
            "File exceeds the {} MB limit",
            kind.max_bytes() / (1024 * 1024)
        )));
    }
    if !kind.accepts(&item.content_type) {
        return Err(ApiError::bad_request(format!(
            "Unsupported file type {}",
            item.content_type
        )));
    }
    let media = storage.upload(kind, item.body, &item.content_type).await?;
    Ok(media)
}
