#![allow(dead_code)]

use std::{
    io::{Cursor, Write},
    path::Path,
    sync::Arc,
};

use anyhow::Result;
use rag_optimizer::{
    config::TaggingConfig,
    nlp::{ContextFactory, PipelineContext},
    pipeline::{
        Chunker, DocumentExtractor, DocumentManager, DocxExtractor, DocxOptions, Pipeline,
        PipelineConfig, Tagger, WordWindowChunker,
    },
};
use zip::{ZipWriter, write::SimpleFileOptions};

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><w:body>"#;
const DOCUMENT_CLOSE: &str = "</w:body></w:document>";

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn paragraph(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

pub fn image_paragraph(rel_id: &str) -> String {
    format!(r#"<w:p><w:r><w:drawing><a:blip r:embed="{rel_id}"/></w:drawing></w:r></w:p>"#)
}

pub fn table(rows: &[&[&str]]) -> String {
    let mut xml = String::from("<w:tbl>");
    for row in rows {
        xml.push_str("<w:tr>");
        for cell in *row {
            xml.push_str("<w:tc>");
            xml.push_str(&paragraph(cell));
            xml.push_str("</w:tc>");
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

/// Minimal package: body blocks plus optional `(rel id, media name, bytes)`.
pub fn docx_bytes(blocks: &[String], media: &[(&str, &str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file("word/document.xml", options)?;
    writer.write_all(DOCUMENT_OPEN.as_bytes())?;
    for block in blocks {
        writer.write_all(block.as_bytes())?;
    }
    writer.write_all(DOCUMENT_CLOSE.as_bytes())?;

    if !media.is_empty() {
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (rel_id, name, bytes) in media {
            rels.push_str(&format!(
                r#"<Relationship Id="{rel_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{name}"/>"#
            ));
            writer.start_file(format!("word/media/{name}"), options)?;
            writer.write_all(bytes)?;
        }
        rels.push_str("</Relationships>");
        writer.start_file("word/_rels/document.xml.rels", options)?;
        writer.write_all(rels.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}

pub fn write_docx(path: &Path, paragraphs: &[&str]) -> Result<()> {
    let blocks: Vec<String> = paragraphs.iter().map(|p| paragraph(p)).collect();
    std::fs::write(path, docx_bytes(&blocks, &[])?)?;
    Ok(())
}

pub fn png_bytes() -> Result<Vec<u8>> {
    let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 10, 10, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

pub fn default_tagger() -> Tagger {
    Tagger::new(Arc::new(TaggingConfig::default().normalized()))
}

pub fn default_factory() -> ContextFactory {
    Arc::new(|| PipelineContext::with_defaults(None))
}

/// Pipeline over `input` with the docx extractor unless one is supplied.
pub fn build_pipeline(
    config: PipelineConfig,
    extractor: Option<Arc<dyn DocumentExtractor>>,
    factory: ContextFactory,
) -> Result<Arc<Pipeline>> {
    let doc_manager = DocumentManager::new(&config.input_dir, &[".docx".to_string()])?;
    let extractor = extractor.unwrap_or_else(|| {
        Arc::new(DocxExtractor::new(doc_manager.file_repo(), config.docx)) as Arc<dyn DocumentExtractor>
    });
    let chunker: Arc<dyn Chunker> = Arc::new(WordWindowChunker::new());
    Ok(Arc::new(Pipeline::with_dependencies(
        config,
        doc_manager,
        chunker,
        extractor,
        default_tagger(),
        factory,
    )))
}

pub fn docx_options(ocr_images: bool) -> DocxOptions {
    DocxOptions {
        include_tables: true,
        ocr_images,
    }
}
