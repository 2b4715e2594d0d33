//! OCR wrapper and player name extraction.
//!
//! The project primarily relies on `ocr-rs` (Rust PaddleOCR bindings), but the
//! pipeline only sees the [`TextRecognizer`] trait so any engine (or a fake in
//! tests) can be plugged in.

use anyhow::Result;

use crate::{Image, NameRegion};

/// OCR generally performs better on larger glyphs.
const MIN_OCR_HEIGHT: u32 = 80;

/// One piece of recognized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
}

impl TextSpan {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A text recognition engine: image in, zero or more spans out.
pub trait TextRecognizer {
    fn recognize(&self, image: Image) -> Result<Vec<TextSpan>>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&self, image: Image) -> Result<Vec<TextSpan>> {
        (**self).recognize(image)
    }
}

/// Recognizer that never finds text. Used when no OCR models are available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcr;

impl TextRecognizer for NoOcr {
    fn recognize(&self, _image: Image) -> Result<Vec<TextSpan>> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "paddle")]
pub use paddle::PaddleOcr;

#[cfg(feature = "paddle")]
mod paddle {
    use std::path::Path;

    use anyhow::{Context, Result};

    use super::{TextRecognizer, TextSpan};
    use crate::Image;

    pub struct PaddleOcr {
        engine: ocr_rs::OcrEngine,
    }

    impl PaddleOcr {
        /// Initialize the OCR engine with the given model paths.
        pub fn try_new(
            detection: impl AsRef<Path>,
            recognition: impl AsRef<Path>,
            charset: impl AsRef<Path>,
        ) -> Result<Self> {
            let thread_count = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);

            let engine = ocr_rs::OcrEngine::new(
                detection,
                recognition,
                charset,
                Some(ocr_rs::OcrEngineConfig {
                    backend: ocr_rs::Backend::CPU,
                    thread_count,
                    // Name labels are small handwritten-style text; High
                    // precision costs CPU but reads them noticeably better.
                    precision_mode: ocr_rs::PrecisionMode::High,
                    enable_parallel: thread_count > 1,
                    min_result_confidence: 0.5,
                    ..Default::default()
                }),
            )
            .context("failed to initialize OCR engine")?;

            Ok(Self { engine })
        }
    }

    impl TextRecognizer for PaddleOcr {
        fn recognize(&self, image: Image) -> Result<Vec<TextSpan>> {
            let image = ocr_rs::preprocess::rgb_to_image(&image.get_bytes(), image.width(), image.height());
            let results = self
                .engine
                .recognize(&image)
                .map_err(|err| anyhow::anyhow!("OCR recognition failed: {err}"))?;

            Ok(results.into_iter().map(|v| TextSpan::new(v.text)).collect())
        }
    }
}

/// Turns a name region into a best-effort player name.
pub struct NameExtractor<R> {
    recognizer: R,
}

impl<R: TextRecognizer> NameExtractor<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Recognize the player name in a region.
    ///
    /// Never fails: an empty region, an OCR error or blank text all mean "no name".
    pub fn extract(&self, region: &NameRegion) -> Option<String> {
        if region.image.is_empty() {
            tracing::debug!(seat = region.seat, "name region is empty");
            return None;
        }

        let spans = match self.recognize_upscaled(region.image) {
            Ok(spans) => spans,
            Err(err) => {
                tracing::debug!(seat = region.seat, "OCR failed: {err:#}");
                return None;
            }
        };

        let text = spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let text = text.trim();

        (!text.is_empty()).then(|| text.to_string())
    }

    fn recognize_upscaled(&self, image: Image) -> Result<Vec<TextSpan>> {
        if image.height() >= MIN_OCR_HEIGHT {
            return self.recognizer.recognize(image);
        }
        let upscaled = image.to_owned_image().resized_h(MIN_OCR_HEIGHT)?;
        self.recognizer.recognize(upscaled.as_image())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{OwnedImage, Rect};

    struct Fixed(Vec<&'static str>);

    impl TextRecognizer for Fixed {
        fn recognize(&self, _image: Image) -> Result<Vec<TextSpan>> {
            Ok(self.0.iter().map(|s| TextSpan::new(*s)).collect())
        }
    }

    struct Failing;

    impl TextRecognizer for Failing {
        fn recognize(&self, _image: Image) -> Result<Vec<TextSpan>> {
            anyhow::bail!("engine exploded")
        }
    }

    #[derive(Default)]
    struct HeightRecorder(Cell<u32>);

    impl TextRecognizer for HeightRecorder {
        fn recognize(&self, image: Image) -> Result<Vec<TextSpan>> {
            self.0.set(image.height());
            Ok(vec![])
        }
    }

    fn region(image: &OwnedImage) -> NameRegion<'_> {
        NameRegion {
            seat: 1,
            rect: Rect { x: 0, y: 0, w: image.width(), h: image.height() },
            image: image.as_image(),
        }
    }

    #[test]
    fn spans_are_joined_and_trimmed() {
        let img = OwnedImage::new(180, 38);
        let names = NameExtractor::new(Fixed(vec!["  Mary", "Jane  "]));
        assert_eq!(names.extract(&region(&img)).as_deref(), Some("Mary Jane"));
    }

    #[test]
    fn blank_text_is_no_name() {
        let img = OwnedImage::new(180, 38);
        assert_eq!(NameExtractor::new(Fixed(vec![])).extract(&region(&img)), None);
        assert_eq!(NameExtractor::new(Fixed(vec![" ", ""])).extract(&region(&img)), None);
    }

    #[test]
    fn ocr_errors_are_swallowed() {
        let img = OwnedImage::new(180, 38);
        assert_eq!(NameExtractor::new(Failing).extract(&region(&img)), None);
    }

    #[test]
    fn empty_region_skips_ocr() {
        let img = OwnedImage::new(0, 0);
        assert_eq!(NameExtractor::new(Failing).extract(&region(&img)), None);
    }

    #[test]
    fn short_regions_are_upscaled() {
        let img = OwnedImage::new(180, 38);
        let names = NameExtractor::new(HeightRecorder::default());
        names.extract(&region(&img));
        assert_eq!(names.recognizer.0.get(), MIN_OCR_HEIGHT);
    }
}
