use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Source language, derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Java,
    Scala,
    Kotlin,
    Groovy,
    Other,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "java" => Language::Java,
            "scala" | "sc" => Language::Scala,
            "kt" | "kts" => Language::Kotlin,
            "groovy" => Language::Groovy,
            _ => Language::Other,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Other)
    }

    pub fn is_java(self) -> bool {
        self == Language::Java
    }

    /// A compiled source language that is not Java.
    ///
    /// Its presence in a project is what makes the primary-language worker
    /// necessary.
    pub fn is_non_java_source(self) -> bool {
        matches!(self, Language::Scala | Language::Kotlin | Language::Groovy)
    }
}

/// A file named by a request, classified once when it is constructed.
///
/// On the wire this is just the path string. The language is recomputed
/// from the path on deserialization and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "PathBuf", into = "PathBuf")]
pub struct SourceFile {
    path: PathBuf,
    language: Language,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let language = Language::from_path(&path);
        Self { path, language }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_java(&self) -> bool {
        self.language.is_java()
    }
}

impl From<PathBuf> for SourceFile {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<SourceFile> for PathBuf {
    fn from(file: SourceFile) -> Self {
        file.path
    }
}
