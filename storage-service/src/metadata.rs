// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem UUID and label discovery

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use storage_contracts::{MetadataTool, StorageError};
use tracing::{debug, error, warn};

/// Longest UUID or label kept, in characters.
pub const MAX_VALUE_CHARS: usize = 127;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub uuid: Option<String>,
    pub user_label: Option<String>,
}

impl Metadata {
    fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.user_label.is_none()
    }
}

/// Runs the identification tool, falling back to its on-disk cache.
#[derive(Clone)]
pub struct MetadataProbe {
    tool: Arc<dyn MetadataTool>,
    cache: PathBuf,
}

impl MetadataProbe {
    pub fn new(tool: Arc<dyn MetadataTool>, cache: PathBuf) -> Self {
        Self { tool, cache }
    }

    /// Identify `device`.
    ///
    /// Falls back to the cache file when the tool cannot run or prints
    /// nothing recognizable. The cache is consumed by the fallback.
    pub async fn probe(&self, device: &Path) -> Result<Metadata, StorageError> {
        match self.tool.identify(device, Some(&self.cache)).await {
            Ok(Some(line)) => {
                let metadata = parse_tokens(&line);
                if !metadata.is_empty() {
                    return Ok(metadata);
                }
                warn!("No UUID or LABEL reported for {}", device.display());
            }
            Ok(None) => warn!("Identification of {} produced no output", device.display()),
            Err(e) => error!("Error identifying {}: {}", device.display(), e.message),
        }

        self.from_cache(device).await
    }

    /// `LABEL` of `device` without touching the cache.
    pub async fn label_of(&self, device: &Path) -> Option<String> {
        match self.tool.identify(device, None).await {
            Ok(Some(line)) => parse_tokens(&line).user_label,
            Ok(None) => None,
            Err(e) => {
                debug!("No label for {}: {}", device.display(), e.message);
                None
            }
        }
    }

    async fn from_cache(&self, device: &Path) -> Result<Metadata, StorageError> {
        let content = tokio::fs::read(&self.cache).await;

        // The cache is single use, and is removed even when unreadable.
        if let Err(e) = tokio::fs::remove_file(&self.cache).await {
            debug!("Removing {}: {e}", self.cache.display());
        }

        let content = content.map_err(|e| {
            StorageError::io(format!(
                "cannot identify {}: cache {} unavailable: {e}",
                device.display(),
                self.cache.display()
            ))
        })?;
        let content = String::from_utf8_lossy(&content);

        let metadata = parse_tokens(cache_entry(&content, device));
        if metadata.is_empty() {
            return Err(StorageError::io(format!(
                "cannot identify {}: cache {} has no usable entry",
                device.display(),
                self.cache.display()
            )));
        }
        Ok(metadata)
    }
}

/// The cache line describing `device`, or the whole cache when none does.
fn cache_entry<'a>(content: &'a str, device: &Path) -> &'a str {
    let device = device.to_string_lossy();
    content
        .lines()
        .find(|line| line.starts_with(device.as_ref()))
        .unwrap_or(content)
}

/// Extract `UUID="..."` and `LABEL="..."` from an identification line.
pub fn parse_tokens(line: &str) -> Metadata {
    let tokens = tokenize(line);
    let value = |key: &str| {
        tokens
            .get(key)
            .filter(|v| !v.is_empty())
            .map(|v| v.chars().take(MAX_VALUE_CHARS).collect::<String>())
    };

    Metadata {
        uuid: value("UUID"),
        user_label: value("LABEL"),
    }
}

fn tokenize(line: &str) -> HashMap<&str, &str> {
    let mut tokens = HashMap::new();
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        rest = &rest[key_end..];

        let Some(after_eq) = rest.strip_prefix('=') else {
            rest = rest.trim_start();
            continue;
        };

        let (value, remainder) = if let Some(quoted) = after_eq.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            let end = after_eq
                .find(char::is_whitespace)
                .unwrap_or(after_eq.len());
            (&after_eq[..end], &after_eq[end..])
        };

        tokens.entry(key).or_insert(value);
        rest = remainder.trim_start();
    }

    tokens
}
