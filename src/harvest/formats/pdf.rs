//! Document information extraction for PDF files.
//!
//! The document is loaded with `lopdf`, which resolves the cross-reference
//! table or stream and unpacks compressed object streams. Three places are
//! read: the trailer's `/Info` dictionary, the catalog's `/Metadata` XMP
//! packet and every `/URI` entry (link actions).

use lopdf::{Document, Object};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::file_types::DOCUMENTS;
use crate::model::{ExtractionResult, MiscRecord};
use crate::parser::{unique, DataParser};
use crate::traits::{ExtractionError, MetadataExtractor};

/// Reference chains longer than this are treated as broken.
const MAX_REFERENCE_DEPTH: usize = 8;

static XMP_CREATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<dc:creator>(.*?)</dc:creator>").expect("valid regex"));

static XMP_LI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<rdf:li[^>]*>([^<]*)</rdf:li>").expect("valid regex"));

static XMP_TOOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(xmp:CreatorTool|pdf:Producer)>([^<]*)</").expect("valid regex")
});

/// Extracts authors, authoring software and referenced hosts from PDFs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl MetadataExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn handled_types(&self) -> &'static [&'static str] {
        DOCUMENTS
    }

    fn parse_data(
        &self,
        path: &Path,
        file_type: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError> {
        if !self.handles(file_type) {
            return Ok(None);
        }
        let data = std::fs::read(path)?;
        Ok(Some(parse_pdf(&data)?))
    }
}

#[derive(Debug, Default)]
struct DocumentInfo {
    authors: Vec<String>,
    creator: Option<String>,
    producer: Option<String>,
    created: Option<String>,
    uris: Vec<String>,
}

fn parse_pdf(data: &[u8]) -> Result<ExtractionResult, ExtractionError> {
    let header = &data[..data.len().min(1024)];
    if !header.windows(5).any(|w| w == b"%PDF-") {
        return Err(ExtractionError::InvalidContent("missing %PDF header".into()));
    }

    let doc = Document::load_mem(data)
        .map_err(|e| ExtractionError::InvalidContent(format!("unreadable PDF: {e}")))?;

    let mut info = DocumentInfo::default();
    read_info_dictionary(&doc, &mut info);
    if let Some(xmp) = metadata_packet(&doc) {
        read_xmp(&xmp, &mut info);
    }
    for object in doc.objects.values() {
        collect_uris(object, &mut info.uris);
    }
    info.uris = unique(info.uris);

    Ok(info.into_result())
}

/// Follows indirect references until a direct object is reached.
fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> Option<&'a Object> {
    for _ in 0..MAX_REFERENCE_DEPTH {
        match object {
            Object::Reference(id) => object = doc.get_object(*id).ok()?,
            direct => return Some(direct),
        }
    }
    None
}

fn text_value(doc: &Document, object: &Object) -> Option<String> {
    match resolve(doc, object)? {
        Object::String(bytes, _) => {
            let text = decode_text(bytes);
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

fn read_info_dictionary(doc: &Document, info: &mut DocumentInfo) {
    let Some(dict) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
    else {
        return;
    };
    let field = |key: &str| {
        dict.get(key.as_bytes())
            .ok()
            .and_then(|o| text_value(doc, o))
    };

    info.authors.extend(field("Author"));
    info.creator = field("Creator");
    info.producer = field("Producer");
    info.created = field("CreationDate");
}

/// The catalog's XMP packet, inflated if the stream is filtered.
fn metadata_packet(doc: &Document) -> Option<String> {
    let catalog = resolve(doc, doc.trailer.get(b"Root").ok()?)?.as_dict().ok()?;
    let stream = resolve(doc, catalog.get(b"Metadata").ok()?)?.as_stream().ok()?;
    let content = if stream.dict.get(b"Filter").is_ok() {
        stream.decompressed_content().ok()?
    } else {
        stream.content.clone()
    };
    Some(String::from_utf8_lossy(&content).into_owned())
}

fn read_xmp(xmp: &str, info: &mut DocumentInfo) {
    for block in XMP_CREATOR_RE.captures_iter(xmp) {
        for li in XMP_LI_RE.captures_iter(&block[1]) {
            let name = li[1].trim();
            if !name.is_empty() && !info.authors.iter().any(|a| a == name) {
                info.authors.push(name.to_string());
            }
        }
    }
    for tool in XMP_TOOL_RE.captures_iter(xmp) {
        let value = tool[2].trim().to_string();
        if value.is_empty() {
            continue;
        }
        if &tool[1] == "xmp:CreatorTool" {
            info.creator.get_or_insert(value);
        } else {
            info.producer.get_or_insert(value);
        }
    }
}

/// Walks direct dictionaries and arrays inside `object` for `/URI` strings.
///
/// Indirect objects are visited by the caller, so references are not followed.
fn collect_uris(object: &Object, uris: &mut Vec<String>) {
    match object {
        Object::Dictionary(dict) => {
            for (key, value) in dict.iter() {
                match value {
                    Object::String(bytes, _) if key.as_slice() == b"URI" => {
                        let uri = decode_text(bytes);
                        if !uri.is_empty() {
                            uris.push(uri);
                        }
                    }
                    nested => collect_uris(nested, uris),
                }
            }
        }
        Object::Array(items) => {
            for item in items {
                collect_uris(item, uris);
            }
        }
        _ => {}
    }
}

impl DocumentInfo {
    fn into_result(self) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        let mined = self
            .authors
            .iter()
            .chain(self.creator.iter())
            .chain(self.producer.iter())
            .chain(self.uris.iter());

        for text in mined {
            let parser = DataParser::new(text);
            result.emails.extend(parser.emails());
            result.hosts.extend(parser.hosts());
        }
        result.emails = unique(result.emails);
        result.hosts = unique(result.hosts);
        result.users = self.authors;

        if let Some(created) = self.created {
            result.misc.push(MiscRecord::Created(created));
        }
        if self.creator.is_some() || self.producer.is_some() {
            result.misc.push(MiscRecord::Software {
                creator: self.creator,
                producer: self.producer,
            });
        }
        result
    }
}

/// Decodes a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1.
fn decode_text(raw: &[u8]) -> String {
    let text = if let Some(body) = raw.strip_prefix(&[0xfe, 0xff]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        match std::str::from_utf8(raw) {
            Ok(s) => s.to_string(),
            Err(_) => raw.iter().map(|&b| b as char).collect(),
        }
    };
    text.replace('\0', "").trim().to_string()
}
