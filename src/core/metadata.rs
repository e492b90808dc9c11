//! Bounded header scan that pulls `**Field:** value` lines out of a file.

use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KbError, Result};
use crate::infra::config::MetadataConfig;
use crate::infra::io::read_head_lines;

/// A marker on one of these first lines does not end the header
pub(crate) const MIN_HEADER_LINES: usize = 3;

/// Values found in a file header. Unset fields were not present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFields {
    pub version: Option<String>,
    pub ref_id: Option<String>,
    pub category: Option<String>,
    pub purpose: Option<String>,
    /// Configured fields beyond the four well-known ones
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub other: IndexMap<String, String>,
}

impl HeaderFields {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "version" => self.version = Some(value),
            "ref_id" => self.ref_id = Some(value),
            "category" => self.category = Some(value),
            "purpose" => self.purpose = Some(value),
            _ => {
                self.other.insert(name.to_string(), value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.ref_id.is_none()
            && self.category.is_none()
            && self.purpose.is_none()
            && self.other.is_empty()
    }
}

pub struct MetadataExtractor {
    max_lines: usize,
    end_marker: String,
    patterns: Vec<(String, Regex)>,
}

impl MetadataExtractor {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let patterns = config
            .fields
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern)
                    .map(|re| (name.clone(), re))
                    .map_err(|e| KbError::pattern(pattern, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_lines: config.max_lines,
            end_marker: config.header_end_marker.clone(),
            patterns,
        })
    }

    /// Unreadable files yield empty fields.
    pub fn extract(&self, path: &Path) -> HeaderFields {
        match read_head_lines(path, self.max_lines) {
            Ok(lines) => self.scan(lines.iter().map(String::as_str)),
            Err(err) => {
                debug!(path = %path.display(), %err, "header not readable");
                HeaderFields::default()
            }
        }
    }

    pub fn extract_from_str(&self, content: &str) -> HeaderFields {
        self.scan(content.lines().take(self.max_lines))
    }

    fn scan<'a>(&self, lines: impl Iterator<Item = &'a str>) -> HeaderFields {
        let mut fields = HeaderFields::default();

        for (index, raw) in lines.enumerate() {
            let line = raw.trim();

            for (name, re) in &self.patterns {
                if let Some(value) = re
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim())
                    .filter(|v| !v.is_empty())
                {
                    fields.set(name, value.to_string());
                }
            }

            if line == self.end_marker && index + 1 > MIN_HEADER_LINES {
                break;
            }
        }

        fields
    }
}
