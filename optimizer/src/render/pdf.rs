use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lopdf::{
    Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use tracing::debug;

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 72;
const FONT_SIZE: i64 = 10;
const TITLE_SIZE: i64 = 16;
const LEADING: i64 = 12;
/// Courier advances 0.6 em per glyph, so 78 columns fill the text width.
const COLUMNS: usize = ((PAGE_WIDTH - 2 * MARGIN) * 10 / (FONT_SIZE * 6)) as usize;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

/// Lays out pretty-printed JSON as monospaced text on US-letter pages under
/// a `JSON Output: <name>` title.
pub fn render_json_pdf(json_text: &str, title: &str) -> Result<Vec<u8>> {
    let lines = wrap_lines(json_text, COLUMNS);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let title_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
            "F2" => title_font_id,
        },
    });

    // the title plus a blank spacer line take two rows of the first page
    let mut pages: Vec<Vec<String>> = Vec::new();
    let mut remaining = lines.as_slice();
    let mut capacity = LINES_PER_PAGE - 2;
    loop {
        let take = remaining.len().min(capacity);
        pages.push(remaining[..take].to_vec());
        remaining = &remaining[take..];
        capacity = LINES_PER_PAGE;
        if remaining.is_empty() {
            break;
        }
    }

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (index, page_lines) in pages.iter().enumerate() {
        let heading = (index == 0).then(|| format!("JSON Output: {}", ascii_only(title)));
        let page_id = add_page(&mut doc, pages_id, heading.as_deref(), page_lines)?;
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).context("failed to serialize pdf")?;
    debug!(title, pages = page_count, lines = lines.len(), "pdf rendered");
    Ok(bytes)
}

/// Renders off the async runtime and writes the file to `target`.
pub async fn write_json_pdf(json_text: String, title: String, target: PathBuf) -> Result<PathBuf> {
    let bytes = tokio::task::spawn_blocking(move || render_json_pdf(&json_text, &title))
        .await
        .context("pdf render task panicked")??;
    crate::storage::ensure_parent_dir(&target).await?;
    tokio::fs::write(&target, bytes)
        .await
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(target)
}

fn add_page(
    doc: &mut Document,
    parent: ObjectId,
    heading: Option<&str>,
    lines: &[String],
) -> Result<ObjectId> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut operations = vec![Operation::new("BT", vec![])];

    if let Some(heading) = heading {
        operations.push(Operation::new("Tf", vec!["F2".into(), TITLE_SIZE.into()]));
        operations.push(Operation::new("Td", vec![MARGIN.into(), top.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(heading)]));
        operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
        operations.push(Operation::new("TL", vec![LEADING.into()]));
        operations.push(Operation::new("T*", vec![]));
    } else {
        operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
        operations.push(Operation::new("TL", vec![LEADING.into()]));
        operations.push(Operation::new("Td", vec![MARGIN.into(), top.into()]));
    }

    for line in lines {
        operations.push(Operation::new("T*", vec![]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().context("failed to encode page content")?,
    ));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "Contents" => content_id,
    }))
}

/// Splits into lines no wider than `columns`, replacing characters the
/// standard Type1 fonts cannot show.
fn wrap_lines(text: &str, columns: usize) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let chars: Vec<char> = ascii_only(line).chars().collect();
        if chars.is_empty() {
            out.push(String::new());
            continue;
        }
        for piece in chars.chunks(columns) {
            out.push(piece.iter().collect());
        }
    }
    out
}

fn ascii_only(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' => ' ',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect()
}

/// Convenience for callers holding a path to the JSON artifact.
pub fn title_for(json_path: &Path) -> String {
    json_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_lines_wrap_and_non_ascii_is_replaced() {
        let text = format!("{}\n\n\"caf\u{e9}\"", "x".repeat(COLUMNS + 5));
        let lines = wrap_lines(&text, COLUMNS);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].len(), COLUMNS);
        assert_eq!(lines[1], "xxxxx");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "\"caf?\"");
    }

    #[test]
    fn output_paginates() {
        let json = (0..LINES_PER_PAGE * 2)
            .map(|i| format!("  \"line\": {i},"))
            .collect::<Vec<_>>()
            .join("\n");
        let bytes = render_json_pdf(&json, "policy.json").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }
}
