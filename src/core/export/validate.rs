//! Checks applied to every caller-selected path before it is read.

use std::path::{Component, Path};

/// Outcome of validating one relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    /// Normalized, forward-slash relative path
    Valid(String),
    Rejected(String),
}

pub trait PathValidator: Send + Sync {
    fn validate(&self, rel: &str) -> PathVerdict;
}

/// Accepts plain relative paths with an allowed extension.
#[derive(Debug, Clone)]
pub struct RelativePathValidator {
    allowed_extensions: Vec<String>,
}

impl RelativePathValidator {
    pub fn new(allowed_extensions: &[String]) -> Self {
        Self {
            allowed_extensions: allowed_extensions.to_vec(),
        }
    }
}

impl PathValidator for RelativePathValidator {
    fn validate(&self, rel: &str) -> PathVerdict {
        let reject = |reason: &str| PathVerdict::Rejected(reason.to_string());

        if rel.trim().is_empty() {
            return reject("empty path");
        }
        if rel.chars().any(char::is_control) {
            return reject("control character in path");
        }

        let path = Path::new(rel);
        if path.is_absolute() || rel.starts_with('/') || rel.starts_with('\\') {
            return reject("path must be relative");
        }

        let mut parts: Vec<String> = Vec::new();
        for c in path.components() {
            match c {
                Component::ParentDir => return reject("path escapes the base directory"),
                Component::CurDir => {}
                Component::Prefix(_) | Component::RootDir => {
                    return reject("path must be relative");
                }
                Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            }
        }
        if parts.is_empty() {
            return reject("empty path");
        }

        let normalized = parts.join("/");
        if !self.allowed_extensions.is_empty()
            && !self
                .allowed_extensions
                .iter()
                .any(|ext| normalized.ends_with(ext.as_str()))
        {
            return reject("extension not allowed");
        }

        PathVerdict::Valid(normalized)
    }
}
