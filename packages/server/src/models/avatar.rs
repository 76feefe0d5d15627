use serde::{Deserialize, Serialize};

use crate::avatar::AvatarRecord;
use crate::error::AppError;
use crate::imaging::{Mask, ResizeSpec};

/// Response DTO for an avatar. Blob ids are never exposed; both links are
/// derived from the avatar id.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AvatarResponse {
    /// Avatar id (32 hex characters).
    #[schema(example = "d41d8cd98f00b204e9800998ecf8427e")]
    pub id: String,
    /// Link to the uncropped original image.
    #[schema(example = "api/v1/file/d41d8cd98f00b204e9800998ecf8427e/raw")]
    pub url_origin: String,
    /// Link to the thumbnail.
    #[schema(example = "api/v1/file/d41d8cd98f00b204e9800998ecf8427e")]
    pub url_thumb: String,
}

impl AvatarResponse {
    pub fn from_record(record: &AvatarRecord, url_prefix: &str) -> Self {
        let url_thumb = format!("{url_prefix}{}", record.id);
        Self {
            id: record.id.clone(),
            url_origin: format!("{url_thumb}/raw"),
            url_thumb,
        }
    }
}

/// Body of a mask change, and of the optional `config` part of an upload.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct MaskRequest {
    /// Crop rectangle `[x0, y0, x1, y1]` in pixels of the original image.
    #[schema(example = json!([70, 15, 250, 130]))]
    pub mask: Option<Vec<i64>>,
}

impl MaskRequest {
    pub fn to_mask(&self) -> Result<Option<Mask>, AppError> {
        self.mask
            .as_deref()
            .map(Mask::from_slice)
            .transpose()
            .map_err(|e| AppError::Validation(e.to_string()))
    }

    /// Like [`Self::to_mask`], but the mask must be present.
    pub fn require_mask(&self) -> Result<Mask, AppError> {
        self.to_mask()?
            .ok_or_else(|| AppError::Validation("\"mask\" is required".into()))
    }
}

/// Optional resize parameters of an image read: `w` and `h` together, or
/// `s` alone.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResizeQuery {
    /// Target width; requires `h`.
    pub w: Option<String>,
    /// Target height; requires `w`.
    pub h: Option<String>,
    /// Bounding square size, aspect ratio kept.
    pub s: Option<String>,
}

impl ResizeQuery {
    /// `None` when no resize was asked for. Only the shape of the query is
    /// checked here; the lifecycle bounds the dimensions.
    pub fn to_spec(&self) -> Result<Option<ResizeSpec>, AppError> {
        let spec = match (&self.w, &self.h, &self.s) {
            (None, None, None) => return Ok(None),
            (Some(w), Some(h), _) => {
                let height = parse_dimension("h", h)?;
                let width = parse_dimension("w", w)?;
                ResizeSpec::Exact { width, height }
            }
            (_, _, Some(s)) => ResizeSpec::Fit(parse_dimension("s", s)?),
            _ => return Err(AppError::Validation("incorrect query parameters".into())),
        };
        Ok(Some(spec))
    }
}

fn parse_dimension(name: &str, value: &str) -> Result<u32, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Validation(format!("\"{name}\" parameter should be an integer")))
}
