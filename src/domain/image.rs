//! Image optimizer defaults applied at the edge.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Serialize;

use super::error::DomainError;

/// Compression preset sent in the optimizer request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl OptimizeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Display for OptimizeLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizeLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(DomainError::validation(
                "optimize",
                format!("expected `low`, `medium` or `high`, got `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JpegType {
    #[default]
    Auto,
    Baseline,
    Progressive,
}

impl JpegType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Baseline => "baseline",
            Self::Progressive => "progressive",
        }
    }
}

impl FromStr for JpegType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "baseline" => Ok(Self::Baseline),
            "progressive" => Ok(Self::Progressive),
            other => Err(DomainError::validation(
                "jpeg_type",
                format!("expected `auto`, `baseline` or `progressive`, got `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    #[default]
    Lanczos3,
    Lanczos2,
    Bicubic,
    Bilinear,
    Nearest,
}

impl ResizeFilter {
    pub const ALL: [ResizeFilter; 5] = [
        Self::Lanczos3,
        Self::Lanczos2,
        Self::Bicubic,
        Self::Bilinear,
        Self::Nearest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lanczos3 => "lanczos3",
            Self::Lanczos2 => "lanczos2",
            Self::Bicubic => "bicubic",
            Self::Bilinear => "bilinear",
            Self::Nearest => "nearest",
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|filter| filter.as_str() == wanted)
            .ok_or_else(|| {
                DomainError::validation("resize_filter", format!("unknown filter `{wanted}`"))
            })
    }
}

/// Output quality in percent, 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: Self = Self(85);

    pub fn new(field: &'static str, value: u64) -> Result<Self, DomainError> {
        match u8::try_from(value) {
            Ok(value @ 1..=100) => Ok(Self(value)),
            _ => Err(DomainError::validation(
                field,
                format!("must be between 1 and 100, got {value}"),
            )),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}
