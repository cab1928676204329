//! Plain-text extraction for uploaded documents.
//!
//! PDFs go through `pdf-extract`. DOCX and PPTX are ZIP containers of
//! OfficeOpenXML parts; their text runs are pulled out with `quick-xml`.
//! Scanned, image-only PDFs yield little or no text since no OCR is done.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

/// Most uncompressed XML read from one DOCX/PPTX container, across all parts.
pub const MAX_XML_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Txt,
    Pptx,
}

impl FileKind {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = std::path::Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();

        match extension.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "docx" => Some(FileKind::Docx),
            "txt" => Some(FileKind::Txt),
            "pptx" => Some(FileKind::Pptx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Txt => "txt",
            FileKind::Pptx => "pptx",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Document container is not a valid ZIP archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Document XML is malformed: {0}")]
    Xml(String),

    #[error("Document has no slides")]
    NoSlides,

    #[error("Document expands beyond {limit} bytes of XML")]
    TooLarge { limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracts trimmed plain text from a document of the given kind.
pub fn extract_text(kind: FileKind, bytes: &[u8]) -> Result<String, ExtractionError> {
    let text = match kind {
        FileKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?,
        FileKind::Docx => extract_docx(bytes)?,
        FileKind::Pptx => extract_pptx(bytes)?,
        FileKind::Txt => String::from_utf8_lossy(bytes).into_owned(),
    };

    Ok(text.trim().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut budget = MAX_XML_BYTES;
    let xml = read_part(&mut archive, "word/document.xml", &mut budget)?;
    xml_text(&xml, b"w:t", b"w:p")
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    // slide10.xml must come after slide2.xml
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();

    if slides.is_empty() {
        return Err(ExtractionError::NoSlides);
    }
    slides.sort_by_key(|(number, _)| *number);

    let mut budget = MAX_XML_BYTES;
    let mut texts = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_part(&mut archive, &name, &mut budget)?;
        let text = xml_text(&xml, b"a:t", b"a:p")?;
        if !text.trim().is_empty() {
            texts.push(text.trim().to_string());
        }
    }

    Ok(texts.join("\n\n"))
}

/// Reads one part, charging its uncompressed size against `budget`.
fn read_part(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    budget: &mut u64,
) -> Result<String, ExtractionError> {
    let too_large = ExtractionError::TooLarge { limit: MAX_XML_BYTES };
    let part = archive.by_name(name)?;

    // the declared size can lie, so the read itself is bounded too
    if part.size() > *budget {
        return Err(too_large);
    }

    let mut raw = Vec::new();
    part.take(*budget + 1).read_to_end(&mut raw)?;
    if raw.len() as u64 > *budget {
        return Err(too_large);
    }

    *budget -= raw.len() as u64;
    String::from_utf8(raw).map_err(|e| ExtractionError::Xml(e.to_string()))
}

/// Concatenates the character data of `text_tag` elements, ending each
/// `paragraph_tag` element with a newline.
fn xml_text(xml: &str, text_tag: &[u8], paragraph_tag: &[u8]) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| ExtractionError::Xml(e.to_string()))? {
            Event::Start(e) if e.name().as_ref() == text_tag => in_text = true,
            Event::End(e) if e.name().as_ref() == text_tag => in_text = false,
            Event::End(e) if e.name().as_ref() == paragraph_tag => out.push('\n'),
            Event::Empty(e) if e.name().as_ref() == paragraph_tag => out.push('\n'),
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| ExtractionError::Xml(e.to_string()))?;
                out.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}
