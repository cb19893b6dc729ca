//! Text extraction for uploaded documents (PDF, plain text, CSV).
//!
//! Files are dispatched by filename extension. Extraction is pipeline-layer:
//! callers supply a name and raw bytes; this module returns plain UTF-8 text.
//! Unsupported extensions are not an error: they yield [`Extracted::Unsupported`]
//! and the ingestion pipeline skips them.

use thiserror::Error;

/// Document kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
    Csv,
}

impl FileKind {
    /// Detect the kind from a filename's extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = std::path::Path::new(name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "txt" => Some(FileKind::Text),
            "csv" => Some(FileKind::Csv),
            _ => None,
        }
    }
}

/// Extraction error. The pipeline reports the file and moves on.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("text file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of extracting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text(String),
    Unsupported,
}

/// Extract plain text from a named file's bytes.
pub fn extract_text(name: &str, bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let text = match FileKind::from_name(name) {
        Some(FileKind::Pdf) => extract_pdf(bytes)?,
        Some(FileKind::Text) => String::from_utf8(bytes.to_vec())?,
        Some(FileKind::Csv) => extract_csv(bytes)?,
        None => return Ok(Extracted::Unsupported),
    };
    Ok(Extracted::Text(text))
}

/// Concatenate the text of every page. Pages without extractable text
/// contribute nothing.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.concat())
}

/// Render a CSV table as flat aligned text: a header line, then one line per
/// record prefixed with its zero-based row number. Short records are padded
/// with empty cells.
fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    if headers.is_empty() && rows.is_empty() {
        return Ok(String::new());
    }

    let columns = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);

    let index_width = rows.len().saturating_sub(1).to_string().len();
    let mut widths = vec![0usize; columns];
    for (col, width) in widths.iter_mut().enumerate() {
        let header_len = headers.get(col).map(|h| h.chars().count()).unwrap_or(0);
        let cell_len = rows
            .iter()
            .map(|r| r.get(col).map(|c| c.chars().count()).unwrap_or(0))
            .max()
            .unwrap_or(0);
        *width = header_len.max(cell_len);
    }

    let render_line = |label: &str, cells: &[String]| -> String {
        let mut line = format!("{:>width$}", label, width = index_width);
        for (col, width) in widths.iter().enumerate() {
            let cell = cells.get(col).map(String::as_str).unwrap_or("");
            line.push_str("  ");
            line.push_str(&format!("{:>width$}", cell, width = width));
        }
        line.trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_line("", &headers));
    for (i, row) in rows.iter().enumerate() {
        lines.push(render_line(&i.to_string(), row));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(e: Extracted) -> String {
        match e {
            Extracted::Text(t) => t,
            Extracted::Unsupported => panic!("expected text"),
        }
    }

    #[test]
    fn detects_kinds_case_insensitively() {
        assert_eq!(FileKind::from_name("a.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_name("notes.txt"), Some(FileKind::Text));
        assert_eq!(FileKind::from_name("dir/table.Csv"), Some(FileKind::Csv));
        assert_eq!(FileKind::from_name("image.png"), None);
        assert_eq!(FileKind::from_name("README"), None);
    }

    #[test]
    fn unsupported_extension_is_skipped() {
        let out = extract_text("slides.pptx", b"whatever").unwrap();
        assert_eq!(out, Extracted::Unsupported);
    }

    #[test]
    fn plain_text_passes_through() {
        let out = extract_text("notes.txt", "contract law ✓".as_bytes()).unwrap();
        assert_eq!(text(out), "contract law ✓");
    }

    #[test]
    fn invalid_utf8_returns_error() {
        let err = extract_text("bad.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ExtractError::Utf8(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text("broken.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    /// Single-page PDF drawing `phrase` in Helvetica.
    fn minimal_pdf(phrase: &str) -> Vec<u8> {
        let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
        let mut out = Vec::new();
        let mut offsets = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
        }
        let xref_start = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn pdf_page_text_is_extracted() {
        let out = text(extract_text("brief.pdf", &minimal_pdf("duty of care")).unwrap());
        assert!(out.contains("duty of care"), "extracted: {:?}", out);
    }

    #[test]
    fn csv_renders_aligned_table() {
        let csv = "name,age\nalice,30\nbob,4\n";
        let out = text(extract_text("people.csv", csv.as_bytes()).unwrap());
        assert_eq!(out, "    name  age\n0  alice   30\n1    bob    4");
    }

    #[test]
    fn csv_pads_short_records() {
        let csv = "a,b,c\n1\n";
        let out = text(extract_text("t.csv", csv.as_bytes()).unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "0  1");
    }

    #[test]
    fn empty_csv_is_empty_text() {
        let out = text(extract_text("empty.csv", b"").unwrap());
        assert_eq!(out, "");
    }
}
