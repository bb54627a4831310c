//! Page OCR through poppler and tesseract

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

use crate::core::config::PipelineConfig;
use crate::core::errors::OcrError;

/// Recognized text of one page
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPage {
    pub text: String,
    /// Mean word confidence in `0.0..=1.0`
    pub confidence: f64,
}

/// Anything that can turn PDF pages into text
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn page_count(&self, pdf: &Path) -> Result<u32, OcrError>;

    /// Recognize one page, 1-indexed
    async fn recognize(&self, pdf: &Path, page: u32) -> Result<OcrPage, OcrError>;
}

/// `pdftoppm` to rasterize, `tesseract` to read
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    dpi: u32,
    languages: String,
    psm: u32,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(dpi: u32, languages: impl Into<String>) -> Self {
        Self {
            dpi,
            languages: languages.into(),
            psm: 6,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.ocr_dpi, config.ocr_languages.clone())
    }

    /// Page segmentation mode (6 = uniform block of text)
    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = psm;
        self
    }

    async fn run_tool(&self, tool: &str, args: &[&str]) -> Result<Vec<u8>, OcrError> {
        let future = Command::new(tool).args(args).kill_on_drop(true).output();

        let output = tokio::select! {
            result = future => result.map_err(|e| OcrError::ToolFailed {
                tool: tool.to_string(),
                message: format!("could not run: {}", e),
            })?,
            _ = tokio::time::sleep(self.timeout) => {
                return Err(OcrError::ToolFailed {
                    tool: tool.to_string(),
                    message: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {}", tool, stderr.trim());
            return Err(OcrError::ToolFailed {
                tool: tool.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn page_count(&self, pdf: &Path) -> Result<u32, OcrError> {
        let pdf = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || super::pdf::page_count(&pdf))
            .await
            .map_err(|e| OcrError::ToolFailed {
                tool: "lopdf".to_string(),
                message: e.to_string(),
            })?
    }

    async fn recognize(&self, pdf: &Path, page: u32) -> Result<OcrPage, OcrError> {
        let workdir = tempfile::TempDir::new()?;
        let prefix = workdir.path().join("page");
        let image = workdir.path().join("page.png");
        let page_arg = page.to_string();
        let dpi_arg = self.dpi.to_string();
        let psm_arg = self.psm.to_string();

        self.run_tool(
            "pdftoppm",
            &[
                "-f",
                &page_arg,
                "-l",
                &page_arg,
                "-r",
                &dpi_arg,
                "-png",
                "-singlefile",
                &pdf.to_string_lossy(),
                &prefix.to_string_lossy(),
            ],
        )
        .await?;

        let tsv = self
            .run_tool(
                "tesseract",
                &[
                    &image.to_string_lossy(),
                    "stdout",
                    "-l",
                    &self.languages,
                    "--psm",
                    &psm_arg,
                    "tsv",
                ],
            )
            .await?;

        let result = parse_tsv(&String::from_utf8_lossy(&tsv));
        debug!(
            "OCR page {}: {} chars, confidence {:.2}",
            page,
            result.text.chars().count(),
            result.confidence
        );
        Ok(result)
    }
}

/// Rebuild text and mean word confidence from tesseract's TSV output.
///
/// Words on one line are joined by spaces, lines by newlines, and a blank
/// line separates paragraphs.
pub fn parse_tsv(tsv: &str) -> OcrPage {
    let mut text = String::new();
    let mut current_line: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0;
    let mut conf_count = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let field = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let line = (field(2), field(3), field(4));
        match current_line {
            Some(prev) if prev == line => text.push(' '),
            Some(prev) if (prev.0, prev.1) == (line.0, line.1) => text.push('\n'),
            Some(_) => text.push_str("\n\n"),
            None => {}
        }
        current_line = Some(line);
        text.push_str(word);

        if let Ok(conf) = cols[10].parse::<f64>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
    }

    let confidence = if conf_count == 0 {
        0.0
    } else {
        (conf_sum / conf_count as f64 / 100.0).clamp(0.0, 1.0)
    };

    OcrPage { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, par: u32, line: u32, conf: f64, text: &str) -> String {
        format!("5\t1\t{}\t{}\t{}\t1\t0\t0\t10\t10\t{}\t{}", block, par, line, conf, text)
    }

    #[test]
    fn test_parse_tsv_rebuilds_layout() {
        let rows = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t".to_string(),
            word(1, 1, 1, 90.0, "धर्मक्षेत्रे"),
            word(1, 1, 1, 80.0, "कुरुक्षेत्रे"),
            word(1, 1, 2, 70.0, "समवेता"),
            word(2, 1, 1, 100.0, "॥१॥"),
        ];
        let page = parse_tsv(&rows.join("\n"));

        assert_eq!(page.text, "धर्मक्षेत्रे कुरुक्षेत्रे\nसमवेता\n\n॥१॥");
        assert!((page.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_ignores_negative_confidence() {
        let rows = [
            HEADER.to_string(),
            word(1, 1, 1, -1.0, "x"),
            word(1, 1, 1, 60.0, "y"),
        ];
        let page = parse_tsv(&rows.join("\n"));
        assert_eq!(page.text, "x y");
        assert!((page.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_empty_page() {
        let page = parse_tsv(HEADER);
        assert_eq!(page.text, "");
        assert_eq!(page.confidence, 0.0);
    }
}
