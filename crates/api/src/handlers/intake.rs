//! Image sources for a submission.
//!
//! Network fetches go through the shared `reqwest` client (short timeout)
//! and are capped at `MAX_UPLOAD_BYTES` both by the declared
//! `Content-Length` and by the bytes actually streamed.

use std::str::FromStr;

use advex_core::imaging::SourceImage;
use advex_core::orchestrator::SubmissionError;

use crate::state::AppState;

/// The `source` field of a submission form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Noise,
    Upload,
    Url,
    Random,
}

impl FromStr for ImageSource {
    type Err = SubmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noise" => Ok(Self::Noise),
            "upload" => Ok(Self::Upload),
            "url" => Ok(Self::Url),
            "random" => Ok(Self::Random),
            other => Err(SubmissionError::Validation(format!(
                "Unknown image source '{other}'"
            ))),
        }
    }
}

/// Turn the form's image fields into a [`SourceImage`], fetching if needed.
pub async fn resolve(
    state: &AppState,
    source: ImageSource,
    upload: Option<Vec<u8>>,
    image_url: Option<String>,
) -> Result<SourceImage, SubmissionError> {
    let max = state.config.max_upload_bytes;

    match source {
        ImageSource::Noise => Ok(SourceImage::Noise),
        ImageSource::Upload => {
            let bytes = upload.ok_or_else(|| {
                SubmissionError::Validation("Missing 'image' file for upload source".into())
            })?;
            if bytes.len() > max {
                return Err(too_large(max));
            }
            Ok(SourceImage::Encoded(bytes))
        }
        ImageSource::Url => {
            let url = image_url
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| {
                    SubmissionError::Validation("Missing 'image_url' for url source".into())
                })?;
            fetch(&state.http, url.trim(), max).await.map(SourceImage::Encoded)
        }
        ImageSource::Random => fetch(&state.http, &state.config.random_image_url, max)
            .await
            .map(SourceImage::Encoded),
    }
}

/// GET `url`, refusing bodies over `max` bytes.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    max: usize,
) -> Result<Vec<u8>, SubmissionError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| SubmissionError::ImageLoad(e.to_string()))?;

    if response
        .content_length()
        .is_some_and(|len| len > max as u64)
    {
        return Err(too_large(max));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| SubmissionError::ImageLoad(e.to_string()))?
    {
        if body.len() + chunk.len() > max {
            return Err(too_large(max));
        }
        body.extend_from_slice(&chunk);
    }

    tracing::debug!(url, bytes = body.len(), "Fetched image");
    Ok(body)
}

fn too_large(max: usize) -> SubmissionError {
    SubmissionError::ImageLoad(format!("Image is larger than {max} bytes"))
}
