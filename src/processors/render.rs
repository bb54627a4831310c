//! Output document generation

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::models::Language;
use crate::processors::pdf::document_key;

/// Consumes translated pages in order and writes one document per language
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Write `pages` for `language` and return the output path
    async fn render(
        &self,
        language: Language,
        source: &Path,
        pages: &[(u32, String)],
        output_dir: &Path,
    ) -> std::io::Result<PathBuf>;
}

/// UTF-8 text file with a title line and per-page headers.
/// Output depends only on its inputs.
#[derive(Debug, Clone, Default)]
pub struct PlainTextRenderer;

impl PlainTextRenderer {
    /// `<stem>-<path hash>_<language>.txt`
    pub fn output_path(language: Language, source: &Path, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}_{}.txt", document_key(source), language.name()))
    }

    pub fn format(language: Language, source: &Path, pages: &[(u32, String)]) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut out = String::new();
        let _ = writeln!(out, "{} ({} Translation)", stem, capitalize(language.name()));
        for (page, text) in pages {
            let _ = write!(out, "\n--- Page {} ---\n{}\n", page, text.trim());
        }
        out
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl DocumentRenderer for PlainTextRenderer {
    async fn render(
        &self,
        language: Language,
        source: &Path,
        pages: &[(u32, String)],
        output_dir: &Path,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir).await?;
        let path = Self::output_path(language, source, output_dir);
        tokio::fs::write(&path, Self::format(language, source, pages)).await?;

        info!("Saved {} output: {} ({} pages)", language, path.display(), pages.len());
        Ok(path)
    }
}
