use std::{
    io::{Cursor, Write},
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, anyhow};
use image::ImageFormat;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Separator tesseract writes after every page of text output.
const PAGE_SEPARATOR: char = '\x0c';

/// An embedded image decoded and re-encoded as 8-bit RGB PNG.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub name: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes any supported raster format and normalises it to RGB8.
pub fn prepare_image(name: &str, bytes: &[u8]) -> Result<PreparedImage, PipelineError> {
    let failure = |reason: String| PipelineError::ImageRecognition {
        image: name.to_string(),
        reason,
    };

    let decoded = image::load_from_memory(bytes).map_err(|err| failure(err.to_string()))?;
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut png = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| failure(err.to_string()))?;

    Ok(PreparedImage {
        name: name.to_string(),
        png,
        width: rgb.width(),
        height: rgb.height(),
    })
}

pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &PreparedImage) -> Result<String>;

    /// One call for many images. Engines without a native batch mode
    /// recognise the images one by one.
    fn recognize_batch(&self, images: &[PreparedImage]) -> Result<Vec<String>> {
        images.iter().map(|image| self.recognize(image)).collect()
    }
}

/// Two-tier recognition: a single batch call first, then image-by-image
/// when the batch fails. Returns one entry per input image, in order.
pub fn recognize_with_fallback(
    engine: &dyn OcrEngine,
    images: &[PreparedImage],
) -> Vec<Result<String, PipelineError>> {
    if images.is_empty() {
        return Vec::new();
    }

    match engine.recognize_batch(images) {
        Ok(texts) if texts.len() == images.len() => {
            return texts.into_iter().map(|text| Ok(text.trim().to_string())).collect();
        }
        Ok(texts) => warn!(
            expected = images.len(),
            returned = texts.len(),
            "batch ocr returned a mismatched result count, retrying per image"
        ),
        Err(err) => warn!(error = %err, images = images.len(), "batch ocr failed, retrying per image"),
    }

    images
        .iter()
        .map(|image| {
            engine
                .recognize(image)
                .map(|text| text.trim().to_string())
                .map_err(|err| PipelineError::ImageRecognition {
                    image: image.name.clone(),
                    reason: format!("{err:#}"),
                })
        })
        .collect()
}

/// Shells out to the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(&self, input: &Path) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg(input)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .with_context(|| format!("failed to launch {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract exited with {}: {}", output.status, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &PreparedImage) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("rag-optimizer-ocr-")
            .suffix(".png")
            .tempfile()
            .context("failed to create temp image")?;
        file.write_all(&image.png)?;
        file.flush()?;

        let text = self.run(file.path())?;
        debug!(image = %image.name, chars = text.len(), "ocr recognised image");
        Ok(split_pages(&text, 1)
            .and_then(|mut pages| pages.pop())
            .unwrap_or_else(|| text.trim().to_string()))
    }

    fn recognize_batch(&self, images: &[PreparedImage]) -> Result<Vec<String>> {
        if images.len() == 1 {
            return Ok(vec![self.recognize(&images[0])?]);
        }

        let dir = tempfile::Builder::new()
            .prefix("rag-optimizer-ocr-")
            .tempdir()
            .context("failed to create temp dir")?;

        let mut listing = String::new();
        for (index, image) in images.iter().enumerate() {
            let path = dir.path().join(format!("image_{index:04}.png"));
            std::fs::write(&path, &image.png)
                .with_context(|| format!("failed to write {}", path.display()))?;
            listing.push_str(&path.to_string_lossy());
            listing.push('\n');
        }

        let list_path = dir.path().join("images.txt");
        std::fs::write(&list_path, listing)?;

        let output = self.run(&list_path)?;
        split_pages(&output, images.len()).ok_or_else(|| {
            anyhow!(
                "tesseract returned a page count that does not match {} images",
                images.len()
            )
        })
    }
}

fn split_pages(output: &str, expected: usize) -> Option<Vec<String>> {
    let mut pages: Vec<&str> = output.split(PAGE_SEPARATOR).collect();
    if pages.len() == expected + 1 && pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }
    (pages.len() == expected).then(|| pages.iter().map(|page| page.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn page_separated_output_splits_per_image() {
        let pages = split_pages("first page\n\x0csecond\n\x0c", 2).unwrap();
        assert_eq!(pages, vec!["first page", "second"]);
        assert!(split_pages("only one\x0c", 2).is_none());
    }

    struct BatchlessEngine {
        single_calls: AtomicUsize,
    }

    impl OcrEngine for BatchlessEngine {
        fn recognize(&self, image: &PreparedImage) -> Result<String> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            if image.name == "broken" {
                Err(anyhow!("unreadable"))
            } else {
                Ok(format!(" text of {} ", image.name))
            }
        }

        fn recognize_batch(&self, _images: &[PreparedImage]) -> Result<Vec<String>> {
            Err(anyhow!("batch mode unavailable"))
        }
    }

    fn image(name: &str) -> PreparedImage {
        PreparedImage {
            name: name.to_string(),
            png: Vec::new(),
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn failed_batch_falls_back_to_single_images() {
        let engine = BatchlessEngine {
            single_calls: AtomicUsize::new(0),
        };
        let results = recognize_with_fallback(&engine, &[image("a"), image("broken"), image("c")]);

        assert_eq!(engine.single_calls.load(Ordering::SeqCst), 3);
        assert_eq!(results[0].as_deref().unwrap(), "text of a");
        assert!(matches!(
            results[1],
            Err(PipelineError::ImageRecognition { .. })
        ));
        assert_eq!(results[2].as_deref().unwrap(), "text of c");
    }

    #[test]
    fn undecodable_bytes_are_an_image_error() {
        let err = prepare_image("image1.emf", b"not an image").unwrap_err();
        assert_eq!(err.kind(), "image_recognition");
    }
}
