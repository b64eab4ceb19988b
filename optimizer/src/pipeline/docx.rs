use std::{
    collections::HashMap,
    io::{Cursor, Read},
    path::Path,
};

use anyhow::Result;
use quick_xml::{Reader, events::BytesStart, events::Event};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::{
    error::PipelineError,
    nlp::{OcrEngine, PreparedImage, prepare_image, recognize_with_fallback},
};

use super::types::ImageStats;

const DOCUMENT_PART: &str = "word/document.xml";
const RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";

/// Prefix of the inline marker wrapping OCR text.
pub const IMAGE_MARKER_PREFIX: &str = "[Image";

#[derive(Debug, Clone, Copy)]
pub struct DocxOptions {
    pub include_tables: bool,
    pub ocr_images: bool,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            include_tables: true,
            ocr_images: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocxText {
    pub text: String,
    pub images: ImageStats,
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph { text: String, images: Vec<String> },
    Table { rows: Vec<Vec<String>>, images: Vec<String> },
}

impl Block {
    fn images(&self) -> &[String] {
        match self {
            Block::Paragraph { images, .. } | Block::Table { images, .. } => images,
        }
    }
}

/// Reads body paragraphs and tables in document order. Embedded images are
/// recognised only when asked for and an engine is present; one bad image
/// never fails the document.
pub fn read_docx(
    bytes: &[u8],
    source: &Path,
    ocr: Option<&dyn OcrEngine>,
    options: DocxOptions,
) -> Result<DocxText, PipelineError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| PipelineError::ingestion(source, err))?;

    let document_xml = read_part(&mut archive, DOCUMENT_PART)
        .map_err(|err| PipelineError::ingestion(source, err))?
        .ok_or_else(|| PipelineError::ingestion(source, format!("missing {DOCUMENT_PART}")))?;
    let blocks = parse_blocks(&document_xml).map_err(|err| PipelineError::ingestion(source, err))?;

    let mut stats = ImageStats::default();
    let mut recognized: HashMap<(usize, usize), String> = HashMap::new();

    if options.ocr_images {
        let refs: Vec<(usize, usize, &str)> = blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| options.include_tables || matches!(block, Block::Paragraph { .. }))
            .flat_map(|(b, block)| {
                block
                    .images()
                    .iter()
                    .enumerate()
                    .map(move |(i, id)| (b, i, id.as_str()))
            })
            .collect();
        stats.seen = refs.len();

        if !refs.is_empty() {
            match ocr {
                Some(engine) => {
                    let targets = read_relationships(&mut archive).unwrap_or_else(|err| {
                        warn!(source = %source.display(), error = %err, "unreadable image relationships");
                        HashMap::new()
                    });
                    recognized = recognize_images(&mut archive, &targets, engine, &refs, &mut stats);
                }
                None => {
                    warn!(source = %source.display(), images = refs.len(), "image ocr requested without an engine");
                    stats.failed = refs.len();
                }
            }
        }
    }

    let mut lines: Vec<String> = Vec::new();
    for (b, block) in blocks.iter().enumerate() {
        match block {
            Block::Paragraph { text, .. } => lines.push(text.clone()),
            Block::Table { rows, .. } => {
                if !options.include_tables {
                    continue;
                }
                if let Some(table) = render_markdown_table(rows) {
                    lines.push(table);
                }
            }
        }
        for i in 0..block.images().len() {
            if let Some(text) = recognized.get(&(b, i)) {
                lines.push(format!("{IMAGE_MARKER_PREFIX} OCR: {text}]"));
            }
        }
    }

    debug!(
        source = %source.display(),
        blocks = blocks.len(),
        images = stats.seen,
        "docx parsed"
    );

    Ok(DocxText {
        text: lines.join("\n"),
        images: stats,
    })
}

fn recognize_images(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    targets: &HashMap<String, String>,
    engine: &dyn OcrEngine,
    refs: &[(usize, usize, &str)],
    stats: &mut ImageStats,
) -> HashMap<(usize, usize), String> {
    let mut prepared: Vec<PreparedImage> = Vec::new();
    let mut slots: Vec<(usize, usize)> = Vec::new();

    for (b, i, rel_id) in refs {
        let loaded = targets
            .get(*rel_id)
            .ok_or_else(|| format!("unknown image relationship {rel_id}"))
            .and_then(|target| {
                read_binary_part(archive, target)
                    .map_err(|err| err.to_string())?
                    .ok_or_else(|| format!("missing image part {target}"))
                    .map(|bytes| (target.clone(), bytes))
            })
            .map_err(|reason| PipelineError::ImageRecognition {
                image: rel_id.to_string(),
                reason,
            })
            .and_then(|(target, bytes)| prepare_image(&target, &bytes));

        match loaded {
            Ok(image) => {
                prepared.push(image);
                slots.push((*b, *i));
            }
            Err(err) => {
                warn!(error = %err, "skipping embedded image");
                stats.failed += 1;
            }
        }
    }

    let mut recognized = HashMap::new();
    for (slot, result) in slots.into_iter().zip(recognize_with_fallback(engine, &prepared)) {
        match result {
            Ok(text) => {
                stats.recognized += 1;
                if !text.is_empty() {
                    recognized.insert(slot, text);
                }
            }
            Err(err) => {
                warn!(error = %err, "image recognition failed");
                stats.failed += 1;
            }
        }
    }
    recognized
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>> {
    let Some(bytes) = read_binary_part(archive, name)? else {
        return Ok(None);
    };
    Ok(Some(String::from_utf8(bytes)?))
}

fn read_binary_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Maps relationship ids to archive paths of embedded parts.
fn read_relationships<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<HashMap<String, String>> {
    let Some(xml) = read_part(archive, RELATIONSHIPS_PART)? else {
        return Ok(HashMap::new());
    };

    let mut targets = HashMap::new();
    let mut reader = Reader::from_str(&xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attribute(&e, b"TargetMode").as_deref() == Some("External") {
                    continue;
                }
                if let (Some(id), Some(target)) = (attribute(&e, b"Id"), attribute(&e, b"Target")) {
                    targets.insert(id, resolve_target(&target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(targets)
}

fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    images: Vec<String>,
    cell: Option<String>,
}

fn parse_blocks(xml: &str) -> Result<Vec<Block>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut blocks = Vec::new();
    let mut table_depth = 0usize;
    let mut table = TableState::default();
    let mut paragraph: Option<(String, Vec<String>)> = None;
    let mut paragraph_depth = 0usize;
    let mut skip_depth = 0usize;
    let mut in_text = false;

    loop {
        let event = reader.read_event()?;
        let is_empty = matches!(event, Event::Empty(_));

        // Text boxes and VML fallbacks are not body text.
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) if matches!(e.name().as_ref(), b"w:txbxContent" | b"mc:Fallback") => {
                skip_depth = 1
            }
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"w:tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table = TableState::default();
                    }
                }
                b"w:tr" if table_depth == 1 => table.rows.push(Vec::new()),
                b"w:tc" if table_depth == 1 => {
                    table.cell = Some(String::new());
                    if is_empty {
                        close_cell(&mut table);
                    }
                }
                b"w:p" if table_depth == 0 => {
                    if is_empty {
                        if paragraph_depth == 0 {
                            blocks.push(Block::Paragraph {
                                text: String::new(),
                                images: Vec::new(),
                            });
                        }
                    } else {
                        if paragraph_depth == 0 {
                            paragraph = Some((String::new(), Vec::new()));
                        }
                        paragraph_depth += 1;
                    }
                }
                b"w:t" => in_text = !is_empty,
                b"w:tab" => push_text(&mut paragraph, &mut table, table_depth, "\t"),
                b"w:br" | b"w:cr" => push_text(&mut paragraph, &mut table, table_depth, "\n"),
                b"a:blip" => {
                    if let Some(id) = attribute(&e, b"r:embed") {
                        push_image(&mut paragraph, &mut table, table_depth, id);
                    }
                }
                b"v:imagedata" => {
                    if let Some(id) = attribute(&e, b"r:id") {
                        push_image(&mut paragraph, &mut table, table_depth, id);
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape()?;
                push_text(&mut paragraph, &mut table, table_depth, &text);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" if table_depth == 0 => {
                    paragraph_depth = paragraph_depth.saturating_sub(1);
                    if paragraph_depth == 0 {
                        if let Some((text, images)) = paragraph.take() {
                            blocks.push(Block::Paragraph { text, images });
                        }
                    }
                }
                b"w:p" => {
                    if let Some(cell) = table.cell.as_mut().filter(|c| !c.is_empty()) {
                        cell.push(' ');
                    }
                }
                b"w:tc" if table_depth == 1 => close_cell(&mut table),
                b"w:tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 {
                        let finished = std::mem::take(&mut table);
                        blocks.push(Block::Table {
                            rows: finished.rows,
                            images: finished.images,
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(blocks)
}

fn close_cell(table: &mut TableState) {
    if let Some(cell) = table.cell.take() {
        let text = cell.split_whitespace().collect::<Vec<_>>().join(" ");
        if let Some(row) = table.rows.last_mut() {
            row.push(text);
        }
    }
}

fn push_text(
    paragraph: &mut Option<(String, Vec<String>)>,
    table: &mut TableState,
    table_depth: usize,
    text: &str,
) {
    if table_depth > 0 {
        if let Some(cell) = table.cell.as_mut() {
            cell.push_str(text);
        }
    } else if let Some((buffer, _)) = paragraph.as_mut() {
        buffer.push_str(text);
    }
}

fn push_image(
    paragraph: &mut Option<(String, Vec<String>)>,
    table: &mut TableState,
    table_depth: usize,
    id: String,
) {
    if table_depth > 0 {
        table.images.push(id);
    } else if let Some((_, images)) = paragraph.as_mut() {
        images.push(id);
    }
}

/// First row is the header. Ragged rows are padded to the widest row.
fn render_markdown_table(rows: &[Vec<String>]) -> Option<String> {
    let width = rows.iter().map(Vec::len).max().filter(|w| *w > 0)?;
    let render_row = |row: &[String]| {
        let cells: Vec<String> = (0..width)
            .map(|i| row.get(i).map(|c| c.replace('|', "\\|")).unwrap_or_default())
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_row(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        lines.push(render_row(row));
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="w" xmlns:a="a" xmlns:r="r"><w:body>
<w:p><w:r><w:t>Intro</w:t><w:tab/><w:t xml:space="preserve"> text &amp; more</w:t></w:r></w:p>
<w:p/>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Role</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>Ana</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Owner|Lead</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:p><w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r><w:r><w:t>Caption</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn blocks_follow_document_order() {
        let blocks = parse_blocks(BODY).unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(
            blocks[0],
            Block::Paragraph {
                text: "Intro\t text & more".to_string(),
                images: vec![]
            }
        );
        assert_eq!(
            blocks[1],
            Block::Paragraph {
                text: String::new(),
                images: vec![]
            }
        );
        assert_eq!(
            blocks[2],
            Block::Table {
                rows: vec![
                    vec!["Name".to_string(), "Role".to_string()],
                    vec!["Ana".to_string(), "Owner|Lead".to_string()],
                ],
                images: vec![]
            }
        );
        assert_eq!(blocks[3].images(), ["rId5".to_string()]);
    }

    #[test]
    fn text_boxes_do_not_swallow_the_surrounding_paragraph() {
        let xml = r#"<w:document xmlns:w="w" xmlns:mc="mc" xmlns:wps="wps" xmlns:v="v"><w:body>
<w:p><w:r><w:t>Before box.</w:t></w:r><w:r><mc:AlternateContent><mc:Choice Requires="wps"><w:drawing><wps:txbx><w:txbxContent><w:p><w:r><w:t>Inside box.</w:t></w:r></w:p></w:txbxContent></wps:txbx></w:drawing></mc:Choice><mc:Fallback><w:pict><v:textbox><w:txbxContent><w:p><w:r><w:t>Inside box.</w:t></w:r></w:p></w:txbxContent></v:textbox></w:pict></mc:Fallback></mc:AlternateContent></w:r><w:r><w:t xml:space="preserve"> After box.</w:t></w:r></w:p>
<w:p><w:r><w:t>Next.</w:t></w:r></w:p>
</w:body></w:document>"#;
        let blocks = parse_blocks(xml).unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph {
                    text: "Before box. After box.".to_string(),
                    images: vec![]
                },
                Block::Paragraph {
                    text: "Next.".to_string(),
                    images: vec![]
                },
            ]
        );
    }

    #[test]
    fn tables_render_as_markdown() {
        let rows = vec![
            vec!["Name".to_string(), "Role".to_string()],
            vec!["Ana".to_string(), "Owner|Lead".to_string()],
            vec!["Bo".to_string()],
        ];
        assert_eq!(
            render_markdown_table(&rows).unwrap(),
            "| Name | Role |\n| --- | --- |\n| Ana | Owner\\|Lead |\n| Bo |  |"
        );
        assert!(render_markdown_table(&[]).is_none());
    }

    #[test]
    fn relationship_targets_resolve_inside_the_package() {
        assert_eq!(resolve_target("media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("../media/image2.png"), "media/image2.png");
        assert_eq!(resolve_target("/word/media/x.jpeg"), "word/media/x.jpeg");
    }

    #[test]
    fn garbage_bytes_are_an_ingestion_error() {
        let err = read_docx(b"not a zip", Path::new("bad.docx"), None, DocxOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "document_ingestion");
    }
}
