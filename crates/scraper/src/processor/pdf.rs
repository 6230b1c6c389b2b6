//! PDF text extraction through lopdf's content-stream text reader

use tracing::{debug, warn};

/// Extract text from an in-memory PDF, page by page
pub fn extract_text(bytes: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| format!("failed to load PDF: {}", e))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                if !page_text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Unreadable page content, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        return Err("no text content in PDF".to_string());
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// One-page PDF with a Courier font and the given content stream
    fn build_pdf(content: Vec<u8>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn shown_lines(lines: &[&str]) -> Vec<u8> {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        }
        operations.push(Operation::new("ET", vec![]));
        Content { operations }.encode().unwrap()
    }

    #[test]
    fn test_extract_text_from_generated_pdf() {
        let bytes = build_pdf(shown_lines(&["Peraturan Daerah ", "Nomor 5"]));
        let text = extract_text(&bytes).unwrap();
        assert!(text.contains("Peraturan Daerah Nomor 5"));
    }

    #[test]
    fn test_operators_on_one_line() {
        let stream = b"BT /F1 12 Tf 72 720 Td (Peraturan Daerah Nomor 5) Tj ET".to_vec();
        let text = extract_text(&build_pdf(stream)).unwrap();
        assert!(text.contains("Peraturan Daerah Nomor 5"));
    }

    #[test]
    fn test_page_without_text_is_rejected() {
        let stream = b"0 0 m 100 100 l S".to_vec();
        assert!(extract_text(&build_pdf(stream)).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(extract_text(b"%PDF-1.4 not really").is_err());
    }
}
