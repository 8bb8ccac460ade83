//! Utility functions for deriving artifact file names

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Longest file stem produced by [`sanitize_file_stem`], in bytes
const MAX_STEM_BYTES: usize = 120;

/// Stem used when sanitizing leaves nothing
const FALLBACK_STEM: &str = "untitled";

/// Device names Windows reserves regardless of extension
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
    "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Turn a display name into a filesystem-safe file stem
///
/// Spaces become underscores; `:` `/` `\` and the characters `* ? " < > |` are
/// removed, as are control characters. Leading and trailing dots and whitespace
/// are trimmed and the result is capped at 120 bytes. Reserved device names such
/// as `CON` or `nul.txt` get an underscore after the device part. Never returns an empty string.
///
/// # Examples
///
/// ```
/// use book_relay::utils::sanitize_file_stem;
///
/// assert_eq!(sanitize_file_stem("A: B/C"), "A_BC");
/// assert_eq!(sanitize_file_stem("..."), "untitled");
/// ```
pub fn sanitize_file_stem(name: &str) -> String {
    let mapped: String = name
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            ':' | '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let trimmed = mapped.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let truncated = truncate_on_char_boundary(trimmed, MAX_STEM_BYTES);
    // truncation can expose a trailing dot again
    let truncated = truncated.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if truncated.is_empty() {
        FALLBACK_STEM.to_string()
    } else if let Some(device) = reserved_device(truncated) {
        format!("{device}_{}", &truncated[device.len()..])
    } else {
        truncated.to_string()
    }
}

/// Leading component of `stem` if it is a reserved device name
fn reserved_device(stem: &str) -> Option<&str> {
    let device = stem.split('.').next().unwrap_or(stem);
    RESERVED_STEMS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(device))
        .then_some(device)
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// First 8 hex characters of the SHA-256 of `name`
fn short_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

/// Assigns a distinct artifact path to every item of a batch
///
/// The first display name to claim a stem gets it unchanged. A different name
/// that sanitizes to an already claimed stem gets `-<hash>` appended, and a
/// repeated occurrence of the same name additionally gets its occurrence index.
/// Stems are compared case-insensitively, so `Dune` and `dune` never share a
/// file on case-insensitive filesystems.
#[derive(Debug)]
pub struct ArtifactNamer {
    output_dir: PathBuf,
    extension: String,
    used: HashSet<String>,
    occurrences: HashMap<String, usize>,
}

impl ArtifactNamer {
    /// Create a namer placing files in `output_dir` with the given extension
    pub fn new(output_dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
            used: HashSet::new(),
            occurrences: HashMap::new(),
        }
    }

    /// Directory artifacts are placed in
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path for the next item named `display_name`
    pub fn assign(&mut self, display_name: &str) -> PathBuf {
        let stem = sanitize_file_stem(display_name);
        let occurrence = {
            let count = self.occurrences.entry(display_name.to_string()).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };

        let mut candidate = if occurrence == 0 && !self.is_used(&stem) {
            stem.clone()
        } else if occurrence == 0 {
            format!("{stem}-{}", short_hash(display_name))
        } else {
            format!("{stem}-{}-{occurrence}", short_hash(display_name))
        };

        let mut bump = 1;
        while self.is_used(&candidate) {
            candidate = format!("{stem}-{}-{occurrence}-{bump}", short_hash(display_name));
            bump += 1;
        }

        if candidate != stem {
            tracing::debug!(name = display_name, stem = %candidate, "artifact name disambiguated");
        }

        let path = self
            .output_dir
            .join(format!("{candidate}.{}", self.extension));
        self.used.insert(candidate.to_lowercase());
        path
    }

    fn is_used(&self, stem: &str) -> bool {
        self.used.contains(&stem.to_lowercase())
    }
}
