//! PDF text extraction with per-page output

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Page;

/// Upper bound on a single fallback extraction
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Glyph names some PDF fonts leak into extracted text
const GLYPH_REPLACEMENTS: &[(&str, &str)] = &[
    ("uni2010", "-"),
    ("uni2011", "-"),
    ("uni2013", "-"),
    ("uni2014", "--"),
    ("uni2018", "'"),
    ("uni2019", "'"),
    ("uni201C", "\""),
    ("uni201D", "\""),
    ("uni2022", "* "),
    ("uni2026", "..."),
    ("uni00A0", " "),
    ("f_f_i", "ffi"),
    ("f_f_l", "ffl"),
    ("f_i", "fi"),
    ("f_l", "fl"),
];

/// Unicode punctuation and ligatures mapped to plain text
const CHAR_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2022}', "* "),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\0', ""),
];

fn inline_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\r\x0B]+").expect("static regex"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

/// Normalize extracted page text: glyph artefacts, ligatures, runs of whitespace
pub fn clean_page_text(text: &str) -> String {
    let mut result = text.to_string();

    for (glyph, replacement) in GLYPH_REPLACEMENTS {
        for pattern in [format!("({})", glyph), format!("<{}>", glyph)] {
            result = result.replace(&pattern, replacement);
        }
    }
    for (ch, replacement) in CHAR_REPLACEMENTS {
        result = result.replace(*ch, replacement);
    }

    let result = inline_whitespace().replace_all(&result, " ");
    let result = result
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    blank_lines()
        .replace_all(&result, "\n\n")
        .trim()
        .to_string()
}

/// PDF parser producing one [`Page`] per text-bearing page
pub struct PdfParser;

impl PdfParser {
    /// Parse a PDF file from disk
    pub fn parse_file(path: &Path) -> Result<Vec<Page>> {
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&filename, &data)
    }

    /// Parse PDF bytes. `filename` is only used for error messages.
    pub fn parse(filename: &str, data: &[u8]) -> Result<Vec<Page>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::document_parse(filename, format!("Failed to load PDF: {}", e)))?;

        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(raw) => {
                    let text = clean_page_text(&raw);
                    if !text.is_empty() {
                        pages.push(Page {
                            number: *page_number,
                            text,
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!("{}: no text on page {}: {}", filename, page_number, e);
                }
            }
        }

        if pages.is_empty() {
            tracing::warn!("{}: lopdf produced no text, trying pdf-extract", filename);
            pages = Self::extract_fallback(filename, data)?;
        }

        if pages.is_empty() {
            return Err(Error::document_parse(
                filename,
                "PDF appears to be image-based or has no extractable text",
            ));
        }

        Ok(pages)
    }

    /// Whole-file extraction via pdf-extract on a worker thread with a timeout.
    /// Form feeds in its output mark page breaks.
    fn extract_fallback(filename: &str, data: &[u8]) -> Result<Vec<Page>> {
        use std::sync::mpsc;

        let data = data.to_vec();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(pdf_extract::extract_text_from_mem(&data));
        });

        let text = match rx.recv_timeout(FALLBACK_TIMEOUT) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return Err(Error::document_parse(filename, format!("pdf-extract failed: {}", e)))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(Error::document_parse(filename, "PDF extraction timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(Error::document_parse(filename, "PDF extraction thread crashed"))
            }
        };

        Ok(text
            .split('\u{c}')
            .map(clean_page_text)
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(i, text)| Page {
                number: i as u32 + 1,
                text,
            })
            .collect())
    }
}
