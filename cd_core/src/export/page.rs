//! Page (PDF) export: the compiled sheet set, one page per sheet.

use typst_pdf::PdfOptions;

use crate::errors::{CdError, CdResult};
use crate::model::ProjectModel;

use super::document;
use super::verify::FormatSummary;

pub(super) fn write_pdf(model: &ProjectModel) -> CdResult<Vec<u8>> {
    let document = document::compile(model, "page")?;
    typst_pdf::pdf(&document, &PdfOptions::default()).map_err(|errors| {
        let msgs: Vec<String> = errors.iter().map(|e| e.message.to_string()).collect();
        CdError::export("page", format!("PDF rendering failed: {}", msgs.join("; ")))
    })
}

/// Extract the page text and read the summary markers back
pub(super) fn read_summary(pdf: &[u8]) -> CdResult<FormatSummary> {
    let text = pdf_extract::extract_text_from_mem(pdf)
        .map_err(|e| CdError::export("page", format!("text extraction failed: {}", e)))?;
    Ok(document::summarize_markers(&text))
}
