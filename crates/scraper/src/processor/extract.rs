//! Content-kind detection and text extraction

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::node::Node;
use scraper::{Html, Selector};
use std::io::{Cursor, Read};

use super::pdf;
use crate::models::ContentKind;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Largest `word/document.xml` we are willing to inflate
const MAX_DOCX_XML_BYTES: u64 = 64 * 1024 * 1024;

/// Header first, then URL extension, then magic bytes
pub fn detect_kind(content_type: Option<&str>, url: &str, bytes: &[u8]) -> Option<ContentKind> {
    from_content_type(content_type)
        .or_else(|| from_extension(url))
        .or_else(|| from_magic(bytes))
}

fn from_content_type(content_type: Option<&str>) -> Option<ContentKind> {
    let essence = content_type?
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/pdf" | "application/x-pdf" => Some(ContentKind::Pdf),
        DOCX_MIME => Some(ContentKind::Docx),
        "text/html" | "application/xhtml+xml" => Some(ContentKind::Html),
        "text/plain" => Some(ContentKind::Text),
        _ => None,
    }
}

fn from_extension(url: &str) -> Option<ContentKind> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };
    let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
    match ext {
        "pdf" => Some(ContentKind::Pdf),
        "docx" => Some(ContentKind::Docx),
        "html" | "htm" => Some(ContentKind::Html),
        "txt" => Some(ContentKind::Text),
        _ => None,
    }
}

fn from_magic(bytes: &[u8]) -> Option<ContentKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(ContentKind::Pdf);
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Some(ContentKind::Docx);
    }
    let head: Vec<u8> = bytes
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(32)
        .map(|b| b.to_ascii_lowercase())
        .collect();
    if head.starts_with(b"<!doctype html") || head.starts_with(b"<html") {
        return Some(ContentKind::Html);
    }
    None
}

/// Extract plain text for a detected kind
pub fn extract_text(kind: ContentKind, bytes: &[u8]) -> Result<String, String> {
    let text = match kind {
        ContentKind::Pdf => pdf::extract_text(bytes)?,
        ContentKind::Docx => docx_text(bytes)?,
        ContentKind::Html => html_text(&String::from_utf8_lossy(bytes)),
        ContentKind::Text => String::from_utf8_lossy(bytes).into_owned(),
        ContentKind::Metadata => return Err("metadata has no body to extract".to_string()),
    };
    if text.trim().is_empty() {
        return Err("no text extracted".to_string());
    }
    Ok(text)
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a zip archive: {}", e))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;

    let mut xml = Vec::new();
    entry
        .take(MAX_DOCX_XML_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| e.to_string())?;

    let mut reader = Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(false);
    let mut out = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| e.to_string())? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) if matches!(e.local_name().as_ref(), b"tab" | b"br") => out.push(' '),
            Event::Text(t) if in_text => {
                out.push_str(&t.unescape().map_err(|e| e.to_string())?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Elements whose text is never shown
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line of visible text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "title",
];

/// Visible text of an HTML page
pub fn html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => out.push('\n'),
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
                });
                if hidden {
                    continue;
                }
                out.push_str(text);
                out.push(' ');
            }
            _ => {}
        }
    }
    out
}

/// Contents of `<title>`, if any
pub fn html_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx(body_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detection_order() {
        // Header beats extension
        assert_eq!(
            detect_kind(Some("text/html; charset=utf-8"), "https://a.example/x.pdf", b""),
            Some(ContentKind::Html)
        );
        // Generic header falls through to extension
        assert_eq!(
            detect_kind(Some("application/octet-stream"), "https://a.example/x.PDF?dl=1", b""),
            Some(ContentKind::Pdf)
        );
        // Then magic bytes
        assert_eq!(
            detect_kind(None, "https://a.example/download", b"%PDF-1.7"),
            Some(ContentKind::Pdf)
        );
        assert_eq!(
            detect_kind(None, "https://a.example/page", b"\n  <!DOCTYPE html><html>"),
            Some(ContentKind::Html)
        );
        assert_eq!(detect_kind(None, "https://a.example/blob", b"\x00\x01"), None);
    }

    #[test]
    fn test_html_text() {
        let html = r#"<html><head><title>Laporan &amp; Data</title>
            <style>body { color: red }</style><script>var x = "<p>";</script></head>
            <body><!-- nav --><h1>Laporan</h1><p>Anggaran&nbsp;2023</p></body></html>"#;
        let text = extract_text(ContentKind::Html, html.as_bytes()).unwrap();
        let words: Vec<_> = text.split_whitespace().collect();
        assert_eq!(words, vec!["Laporan", "&", "Data", "Laporan", "Anggaran", "2023"]);
        assert_eq!(html_title(html).as_deref(), Some("Laporan & Data"));
    }

    #[test]
    fn test_html_entities_and_hidden_text() {
        let html = "<body><noscript>Aktifkan JavaScript</noscript>\
                    <p>Belanja &lt;modal&gt; &eacute;tat &#8211; &#x41;PBD</p></body>";
        let text = html_text(html);
        let words: Vec<_> = text.split_whitespace().collect();
        assert_eq!(words, vec!["Belanja", "<modal>", "état", "\u{2013}", "APBD"]);
        assert_eq!(html_title(html), None);
    }

    #[test]
    fn test_docx_text() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Nota</w:t></w:r><w:r><w:t xml:space="preserve"> Kesepahaman</w:t></w:r></w:p>
    <w:p><w:r><w:t>Pasal 1 &amp; 2</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text(ContentKind::Docx, &docx(xml)).unwrap();
        assert_eq!(text.trim(), "Nota Kesepahaman\nPasal 1 & 2");
    }

    #[test]
    fn test_empty_text_fails() {
        assert!(extract_text(ContentKind::Text, b"   \n ").is_err());
        assert!(extract_text(ContentKind::Docx, b"PK\x03\x04 broken").is_err());
        assert!(extract_text(ContentKind::Metadata, b"abc").is_err());
    }
}
