use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    ERR_INVALID_COMPRESSION, MAX_CONCURRENT_CAP, MAX_EXCLUDED_PATTERNS, MAX_PATTERN_LENGTH,
};
use crate::error::{AppError, Result};

/// Compression level for backup artifacts
///
/// HIGH trades CPU for smaller output, LOW the reverse. The zstd level each
/// maps to is internal to the artifact writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(AppError::Validation(ERR_INVALID_COMPRESSION.to_string())),
        }
    }

    pub fn zstd_level(&self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Medium => 9,
            Self::High => 19,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Settings payload as submitted by clients; validated into [`BackupSettings`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInput {
    pub compression: String,
    pub encryption: bool,
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    pub max_concurrent: i64,
}

impl SettingsInput {
    /// Validate the raw input into a typed settings record
    pub fn validate(&self) -> Result<BackupSettings> {
        let compression = CompressionLevel::parse(&self.compression)?;

        if self.max_concurrent < 1 {
            return Err(AppError::Validation(
                "maxConcurrent must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent > MAX_CONCURRENT_CAP as i64 {
            return Err(AppError::Validation(format!(
                "maxConcurrent must not exceed {}",
                MAX_CONCURRENT_CAP
            )));
        }

        if self.excluded_paths.len() > MAX_EXCLUDED_PATTERNS {
            return Err(AppError::Validation(format!(
                "At most {} excluded paths are allowed",
                MAX_EXCLUDED_PATTERNS
            )));
        }
        for pattern in &self.excluded_paths {
            validate_pattern(pattern).map_err(AppError::Validation)?;
        }

        Ok(BackupSettings {
            compression,
            encryption: self.encryption,
            excluded_paths: self.excluded_paths.clone(),
            max_concurrent: self.max_concurrent as u32,
        })
    }
}

/// Per-job settings, stored 1:1 with the backup and immutable once it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    pub compression: CompressionLevel,
    pub encryption: bool,
    pub excluded_paths: Vec<String>,
    pub max_concurrent: u32,
}

impl BackupSettings {
    /// Identity of the settings profile for concurrency accounting
    ///
    /// Jobs whose settings hash to the same key share one admission queue.
    pub fn profile_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.compression.as_str());
        hasher.update([self.encryption as u8]);
        hasher.update(self.max_concurrent.to_be_bytes());
        for pattern in &self.excluded_paths {
            hasher.update(pattern.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Returns true if the relative path matches any exclusion pattern
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.excluded_paths
            .iter()
            .any(|pattern| pattern_matches(pattern, rel_path))
    }
}

/// Validate a single exclusion pattern at the write boundary
pub fn validate_pattern(pattern: &str) -> std::result::Result<(), String> {
    if pattern.is_empty() {
        return Err("Excluded path pattern must not be empty".to_string());
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(format!(
            "Excluded path pattern exceeds {} characters",
            MAX_PATTERN_LENGTH
        ));
    }
    if pattern.starts_with('/') {
        return Err("Excluded path pattern must be relative".to_string());
    }
    if pattern.split('/').any(|segment| segment == "..") {
        return Err("Excluded path pattern must not contain ..".to_string());
    }
    if pattern.contains('\0') {
        return Err("Excluded path pattern contains an invalid character".to_string());
    }
    Ok(())
}

/// Match a path against an exclusion pattern
///
/// Patterns containing `*` are glob-matched over the whole relative path,
/// with `*` matching any run of characters including separators. Patterns
/// without `*` match as path prefixes ("drafts/" excludes the subtree).
fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern.contains('*') {
        wildcard_match(pattern.as_bytes(), path.as_bytes())
    } else {
        path == pattern.trim_end_matches('/')
            || path.starts_with(&format!("{}/", pattern.trim_end_matches('/')))
    }
}

/// Iterative wildcard matcher with single-star backtracking
fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            // Retry the last star against one more character
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
