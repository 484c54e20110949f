use base64::{Engine, engine::general_purpose::STANDARD};
use common::error::{AppError, Res};
use serde::{Deserialize, Serialize};

/// Largest accepted image once decoded.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_MIME_TYPE: &str = "image/png";

/// Table returned by the extraction provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Validated image ready to be sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Base64 without any data URL prefix.
    pub data: String,
    pub mime_type: String,
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL.
///
/// An explicit `mime_type` wins over the one in the data URL.
pub fn validate_image(image: &str, mime_type: Option<&str>) -> Res<ImagePayload> {
    let image = image.trim();
    if image.is_empty() {
        return Err(AppError::BadRequest("Image is required".to_string()));
    }

    let (url_mime, data) = split_data_url(image);

    // 4 base64 characters per 3 bytes
    if data.len() > MAX_IMAGE_BYTES.div_ceil(3) * 4 {
        return Err(AppError::BadRequest("Image too large (max 8MB)".to_string()));
    }

    let decoded = STANDARD
        .decode(data)
        .map_err(|_| AppError::BadRequest("Invalid image format".to_string()))?;
    if decoded.is_empty() {
        return Err(AppError::BadRequest("Image is required".to_string()));
    }
    if decoded.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest("Image too large (max 8MB)".to_string()));
    }

    let mime_type = mime_type
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .or(url_mime)
        .unwrap_or(DEFAULT_MIME_TYPE);
    if !mime_type.starts_with("image/") {
        return Err(AppError::BadRequest(format!(
            "Unsupported image type: {}",
            mime_type
        )));
    }

    Ok(ImagePayload {
        data: data.to_string(),
        mime_type: mime_type.to_string(),
    })
}

fn split_data_url(image: &str) -> (Option<&str>, &str) {
    let Some(rest) = image.strip_prefix("data:") else {
        return (None, image);
    };
    match rest.split_once(";base64,") {
        Some((mime, data)) => (Some(mime).filter(|mime| !mime.is_empty()), data),
        None => (None, image),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableQuality {
    pub total_rows: usize,
    pub total_columns: usize,
    pub total_cells: usize,
    pub empty_cells: usize,
    /// Percentage of non-empty cells, two decimals.
    pub completeness: f64,
    /// Every row has as many cells as there are headers.
    pub consistent_columns: bool,
    pub quality: QualityGrade,
}

pub fn analyze_quality(table: &TableData) -> TableQuality {
    let total_rows = table.rows.len();
    let total_columns = table.headers.len();
    let total_cells = total_rows * total_columns;
    let empty_cells = table
        .rows
        .iter()
        .flatten()
        .filter(|cell| cell.is_empty())
        .count();

    let completeness = if total_cells == 0 {
        0.0
    } else {
        let filled = total_cells.saturating_sub(empty_cells) as f64;
        (filled / total_cells as f64 * 10_000.0).round() / 100.0
    };

    let quality = if completeness > 90.0 {
        QualityGrade::High
    } else if completeness > 70.0 {
        QualityGrade::Medium
    } else {
        QualityGrade::Low
    };

    TableQuality {
        total_rows,
        total_columns,
        total_cells,
        empty_cells,
        completeness,
        consistent_columns: table.rows.iter().all(|row| row.len() == total_columns),
        quality,
    }
}

pub fn to_markdown(table: &TableData) -> String {
    let line = |cells: &[String]| {
        let cells: Vec<String> = cells.iter().map(|cell| cell.replace('|', "\\|")).collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(table.rows.len() + 2);
    lines.push(line(&table.headers));
    lines.push(format!(
        "| {} |",
        vec!["---"; table.headers.len()].join(" | ")
    ));
    lines.extend(table.rows.iter().map(|row| line(row)));
    lines.join("\n")
}

pub fn to_csv(table: &TableData) -> String {
    let line = |cells: &[String]| {
        cells
            .iter()
            .map(|cell| escape_csv(cell))
            .collect::<Vec<_>>()
            .join(",")
    };

    std::iter::once(line(&table.headers))
        .chain(table.rows.iter().map(|row| line(row)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
