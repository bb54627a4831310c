//! Collaborators around the pipeline: PDF input, OCR and output documents

pub mod ocr;
pub mod pdf;
pub mod render;

pub use ocr::{OcrEngine, OcrPage, TesseractOcr};
pub use render::{DocumentRenderer, PlainTextRenderer};
