//! Raster (PNG) export: one image per sheet, rendered from the same Typst
//! document as the page export. The sheet's summary marker travels in a
//! `tEXt` chunk since pixels cannot be read back.

use std::io::Cursor;

use typst::layout::PagedDocument;

use crate::config::RASTER_DPI_RANGE;
use crate::errors::{CdError, CdResult};
use crate::model::ProjectModel;

use super::document;
use super::verify::FormatSummary;

/// tEXt keyword holding the summary marker
pub const SUMMARY_KEYWORD: &str = "planset:summary";

fn encode(pixmap_data: &[u8], width: u32, height: u32, marker: &str) -> CdResult<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .add_text_chunk(SUMMARY_KEYWORD.to_string(), marker.to_string())
            .map_err(|e| CdError::export("raster", e.to_string()))?;
        let mut writer = encoder
            .write_header()
            .map_err(|e| CdError::export("raster", e.to_string()))?;
        writer
            .write_image_data(pixmap_data)
            .map_err(|e| CdError::export("raster", e.to_string()))?;
    }
    Ok(out)
}

/// PNG bytes per sheet, in sheet order
pub(super) fn write_pngs(model: &ProjectModel) -> CdResult<Vec<(String, Vec<u8>)>> {
    let dpi = model.config.export.raster_dpi;
    if !RASTER_DPI_RANGE.contains(&dpi) {
        return Err(CdError::export(
            "raster",
            format!(
                "{} dpi is outside {}..={}",
                dpi,
                RASTER_DPI_RANGE.start(),
                RASTER_DPI_RANGE.end()
            ),
        ));
    }
    let document: PagedDocument = document::compile(model, "raster")?;
    if document.pages.len() != model.sheet_count() {
        return Err(CdError::export(
            "raster",
            format!("{} pages rendered for {} sheets", document.pages.len(), model.sheet_count()),
        ));
    }
    let pixel_per_pt = dpi as f32 / 72.0;
    model
        .sheets
        .sheets
        .iter()
        .zip(&document.pages)
        .map(|(sheet, page)| {
            let pixmap = typst_render::render(page, pixel_per_pt);
            let marker = document::summary_marker(model, sheet);
            let bytes = encode(pixmap.data(), pixmap.width(), pixmap.height(), &marker)?;
            Ok((sheet.number.clone(), bytes))
        })
        .collect()
}

/// Read the summary chunk of one PNG
fn read_marker(bytes: &[u8]) -> CdResult<String> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let reader = decoder
        .read_info()
        .map_err(|e| CdError::export("raster", e.to_string()))?;
    reader
        .info()
        .uncompressed_latin1_text
        .iter()
        .find(|chunk| chunk.keyword == SUMMARY_KEYWORD)
        .map(|chunk| chunk.text.clone())
        .ok_or_else(|| CdError::export("raster", "image has no summary chunk"))
}

pub(super) fn read_summary(images: &[&[u8]]) -> CdResult<FormatSummary> {
    let mut text = String::new();
    for bytes in images {
        text.push_str(&read_marker(bytes)?);
        text.push('\n');
    }
    Ok(document::summarize_markers(&text))
}
