//! Keep/reject policy for fetched images.

use std::fmt;
use std::io::Cursor;

use image::ImageReader;
use serde::Serialize;

use crate::config::HarvestConfig;
use crate::error::DecodeError;
use crate::extract::ImageCandidate;

/// Why a candidate was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    TooSmallBytes,
    TooSmallDimensions,
    ExcludedPattern,
    /// The image could not be fetched or decoded.
    FetchError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooSmallBytes => "too-small-bytes",
            RejectReason::TooSmallDimensions => "too-small-dimensions",
            RejectReason::ExcludedPattern => "excluded-pattern",
            RejectReason::FetchError => "fetch-error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the filter for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Accepted,
    Rejected {
        reason: RejectReason,
        detail: String,
    },
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accepted)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            FilterDecision::Accepted => None,
            FilterDecision::Rejected { reason, .. } => Some(*reason),
        }
    }

    fn reject(reason: RejectReason, detail: impl Into<String>) -> Self {
        FilterDecision::Rejected {
            reason,
            detail: detail.into(),
        }
    }
}

/// Fetched image content for one candidate.
///
/// Dimensions are read from the image header on first use and cached.
pub struct ImageBytes {
    data: Vec<u8>,
    dimensions: Option<(u32, u32)>,
}

impl ImageBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            dimensions: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Pixel width and height, decoding only the header.
    pub fn dimensions(&mut self) -> Result<(u32, u32), DecodeError> {
        if let Some(dims) = self.dimensions {
            return Ok(dims);
        }
        let dims = ImageReader::new(Cursor::new(self.data.as_slice()))
            .with_guessed_format()
            .map_err(|e| DecodeError(image::ImageError::IoError(e)))?
            .into_dimensions()?;
        self.dimensions = Some(dims);
        Ok(dims)
    }
}

/// Thresholds and exclusion patterns applied to every candidate.
#[derive(Debug, Clone)]
pub struct ImageFilter {
    min_bytes: u64,
    min_width: u32,
    min_height: u32,
    /// Lowercased.
    exclusion_patterns: Vec<String>,
}

impl ImageFilter {
    pub fn new(min_bytes: u64, min_width: u32, min_height: u32, patterns: &[String]) -> Self {
        Self {
            min_bytes,
            min_width,
            min_height,
            exclusion_patterns: patterns
                .iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.min_bytes,
            config.min_width,
            config.min_height,
            &config.exclusion_patterns,
        )
    }

    /// Apply byte size, then dimensions, then exclusion patterns; the first
    /// failing rule decides.
    pub fn decide(&self, candidate: &ImageCandidate, image: &mut ImageBytes) -> FilterDecision {
        if image.len() < self.min_bytes {
            return FilterDecision::reject(
                RejectReason::TooSmallBytes,
                format!("{} bytes < {}", image.len(), self.min_bytes),
            );
        }

        match image.dimensions() {
            Ok((width, height)) if width < self.min_width || height < self.min_height => {
                return FilterDecision::reject(
                    RejectReason::TooSmallDimensions,
                    format!(
                        "{}x{} < {}x{}",
                        width, height, self.min_width, self.min_height
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => return FilterDecision::reject(RejectReason::FetchError, e.to_string()),
        }

        if let Some(pattern) = self.matching_pattern(candidate) {
            return FilterDecision::reject(
                RejectReason::ExcludedPattern,
                format!("matches {:?}", pattern),
            );
        }

        FilterDecision::Accepted
    }

    /// First exclusion pattern found in the filename or URL path.
    pub fn matching_pattern(&self, candidate: &ImageCandidate) -> Option<&str> {
        let filename = candidate.original_filename.to_lowercase();
        let path = candidate.url.path().to_lowercase();
        self.exclusion_patterns
            .iter()
            .find(|p| filename.contains(p.as_str()) || path.contains(p.as_str()))
            .map(|p| p.as_str())
    }
}
