//! Two-pass grimoire parsing.
//!
//! Pass 1 finds tokens in every source image, reads the player names and
//! stores one crop per seat. Pass 2 identifies every stored crop. The passes
//! only share the [`TokenStore`] and the seat numbers, so pass 2 can be re-run
//! against crops from an earlier run.

pub mod townsquare;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use data::Category;
use serde::Serialize;

use crate::matcher::{ReferenceMatcher, has_extension};
use crate::ocr::{NameExtractor, TextRecognizer};
use crate::store::TokenStore;
use crate::{IeConfig, OwnedImage, crop, detect_circles, draw_detections, order_circles};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Decodes source images.
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<OwnedImage>;
}

/// Loads images from disk with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl ImageLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<OwnedImage> {
        OwnedImage::open(path)
    }
}

/// Source images in `dir`, sorted by file name. A missing directory has none.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read input directory {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, &IMAGE_EXTENSIONS) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Result of pass 1.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    /// `(seat, player name)` in seat order.
    pub names: Vec<(u32, Option<String>)>,
    /// Human readable trace of what happened to every image.
    pub steps: Vec<String>,
    pub total_tokens: u32,
    pub image_count: usize,
}

/// Identification of one stored crop. `identity` is `None` when nothing matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub seat: u32,
    pub identity: Option<String>,
    pub category: Option<Category>,
    pub confidence: f32,
    pub is_dead: Option<bool>,
}

impl MatchResult {
    pub fn none(seat: u32) -> Self {
        Self {
            seat,
            identity: None,
            category: None,
            confidence: 0.0,
            is_dead: None,
        }
    }
}

/// Everything known about one seat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatRecord {
    pub seat: u32,
    pub player_name: Option<String>,
    pub identity: Option<String>,
    pub category: Option<Category>,
    pub confidence: f32,
    pub is_dead: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedGrimoire {
    pub image_count: usize,
    pub total_tokens: u32,
    pub seats: Vec<SeatRecord>,
    pub steps: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no images found in {}", .dir.display())]
    NoImages { dir: PathBuf },
    /// Details are in the log line tagged with `reference`.
    #[error("internal error (reference {reference})")]
    Internal { reference: String },
}

/// Pass 1: detect, order and crop tokens in every image under `input_dir`.
///
/// Seats keep counting across images. Images that fail to load or hold no
/// tokens are noted in the trace and skipped.
pub fn extract_tokens<R: TextRecognizer>(
    input_dir: &Path,
    loader: &dyn ImageLoader,
    names: &NameExtractor<R>,
    store: &mut dyn TokenStore,
    config: &IeConfig,
) -> Result<Extraction> {
    let paths = list_images(input_dir)?;
    let mut out = Extraction {
        image_count: paths.len(),
        ..Default::default()
    };

    store.clear().context("clear stale crops")?;

    if paths.is_empty() {
        tracing::info!(dir = %input_dir.display(), "no source images");
        out.steps.push(format!("No images found in {}", input_dir.display()));
        return Ok(out);
    }
    out.steps.push(format!("Found {} image(s) to process", paths.len()));

    let mut next_seat = 1u32;
    for (i, path) in paths.iter().enumerate() {
        let label = format!("Image {}", i + 1);
        let file = path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
        out.steps.push(format!("{label}: processing {file}"));

        let image = match loader.load(path) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path = %path.display(), "skipping unreadable image: {err:#}");
                out.steps.push(format!("{label}: could not be loaded, skipping"));
                continue;
            }
        };

        let circles = detect_circles(image.as_image(), &config.detector);
        out.total_tokens += circles.len() as u32;
        out.steps.push(format!("{label}: detected {} circular token(s)", circles.len()));
        tracing::info!(path = %path.display(), tokens = circles.len(), "image processed");
        if circles.is_empty() {
            out.steps.push(format!("{label}: no tokens, skipping"));
            continue;
        }

        let ordered = order_circles(&circles);
        for token in &ordered {
            let seat = next_seat + token.seat - 1;
            let (token_crop, region) = crop(image.as_image(), token, &config.crop);
            let name = names.extract(&region);
            tracing::debug!(seat, name = ?name, "token cropped");

            store
                .store(seat, &token_crop.image)
                .with_context(|| format!("store crop for seat {seat}"))?;

            match &name {
                Some(name) => out.steps.push(format!("{label}, seat {seat}: player name '{name}'")),
                None => out.steps.push(format!("{label}, seat {seat}: no player name")),
            }
            out.names.push((seat, name));
        }

        if config.write_overlay {
            let overlay = draw_detections(image.as_image(), &ordered, &config.crop);
            match store.store_overlay(&overlay) {
                Ok(()) => out.steps.push(format!("{label}: wrote detection overlay")),
                Err(err) => tracing::warn!(path = %path.display(), "could not write overlay: {err:#}"),
            }
        }

        out.steps.push(format!("{label}: saved {} token(s)", ordered.len()));
        next_seat += ordered.len() as u32;
    }

    tracing::info!(
        images = out.image_count,
        tokens = out.total_tokens,
        "token extraction finished"
    );
    Ok(out)
}

/// Pass 2: identify every stored crop.
pub fn match_tokens(store: &dyn TokenStore, matcher: &ReferenceMatcher) -> Result<BTreeMap<u32, MatchResult>> {
    let seats = store.seats().context("list stored crops")?;
    let mut results = BTreeMap::new();

    for seat in seats {
        let result = match store.load(seat).and_then(|crop| matcher.match_token(crop.as_image())) {
            Ok(Some(hit)) => MatchResult {
                seat,
                identity: Some(hit.identity),
                category: Some(hit.category),
                confidence: round_confidence(hit.confidence),
                is_dead: Some(hit.is_dead),
            },
            Ok(None) => MatchResult::none(seat),
            Err(err) => {
                tracing::warn!(seat, "could not match crop: {err:#}");
                MatchResult::none(seat)
            }
        };
        tracing::debug!(seat, identity = ?result.identity, confidence = result.confidence, "token matched");
        results.insert(seat, result);
    }

    tracing::info!(tokens = results.len(), "token matching finished");
    Ok(results)
}

/// Reported confidences carry 4 decimals.
fn round_confidence(confidence: f32) -> f32 {
    (confidence * 10_000.0).round() / 10_000.0
}

/// Join names and matches on seat. Seats known to only one side are kept.
pub fn merge(names: &[(u32, Option<String>)], matches: &BTreeMap<u32, MatchResult>) -> Vec<SeatRecord> {
    let names = names.iter().cloned().collect::<BTreeMap<_, _>>();
    let seats = names.keys().chain(matches.keys()).copied().collect::<BTreeSet<_>>();

    seats
        .into_iter()
        .map(|seat| {
            let player_name = names.get(&seat).cloned().flatten();
            match matches.get(&seat) {
                Some(m) => SeatRecord {
                    seat,
                    player_name,
                    identity: m.identity.clone(),
                    category: m.category,
                    confidence: m.confidence,
                    is_dead: m.is_dead,
                },
                None => SeatRecord {
                    seat,
                    player_name,
                    identity: None,
                    category: None,
                    confidence: 0.0,
                    is_dead: None,
                },
            }
        })
        .collect()
}

/// Short tag tying an [`ParseError::Internal`] to its log line.
fn error_reference() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{:08x}", (nanos as u64) ^ ((nanos >> 64) as u64))
}

/// The extraction pipeline with its collaborators.
pub struct Ie<R> {
    config: IeConfig,
    loader: Box<dyn ImageLoader>,
    names: NameExtractor<R>,
    matcher: ReferenceMatcher,
}

impl<R: TextRecognizer> Ie<R> {
    pub fn new(config: IeConfig, recognizer: R, matcher: ReferenceMatcher) -> Self {
        Self {
            config,
            loader: Box::new(FileLoader),
            names: NameExtractor::new(recognizer),
            matcher,
        }
    }

    /// Replace the image decoder.
    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn config(&self) -> &IeConfig {
        &self.config
    }

    pub fn matcher(&self) -> &ReferenceMatcher {
        &self.matcher
    }

    pub fn extract(&self, input_dir: &Path, store: &mut dyn TokenStore) -> Result<Extraction> {
        extract_tokens(input_dir, self.loader.as_ref(), &self.names, store, &self.config)
    }

    pub fn match_stored(&self, store: &dyn TokenStore) -> Result<BTreeMap<u32, MatchResult>> {
        match_tokens(store, &self.matcher)
    }

    /// Both passes and the join.
    pub fn parse(&self, input_dir: &Path, store: &mut dyn TokenStore) -> Result<ParsedGrimoire, ParseError> {
        self.try_parse(input_dir, store).map_err(|err| {
            if let Some(ParseError::NoImages { dir }) = err.downcast_ref::<ParseError>() {
                return ParseError::NoImages { dir: dir.clone() };
            }
            let reference = error_reference();
            tracing::error!(reference = %reference, dir = %input_dir.display(), "grimoire parsing failed: {err:#}");
            ParseError::Internal { reference }
        })
    }

    fn try_parse(&self, input_dir: &Path, store: &mut dyn TokenStore) -> Result<ParsedGrimoire> {
        let extraction = self.extract(input_dir, store)?;
        if extraction.image_count == 0 {
            return Err(ParseError::NoImages { dir: input_dir.to_path_buf() }.into());
        }

        let matches = self.match_stored(store)?;
        let seats = merge(&extraction.names, &matches);
        Ok(ParsedGrimoire {
            image_count: extraction.image_count,
            total_tokens: extraction.total_tokens,
            seats,
            steps: extraction.steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(seat: u32, name: &str) -> (u32, Option<String>) {
        (seat, Some(name.to_string()))
    }

    fn hit(seat: u32, identity: &str) -> MatchResult {
        MatchResult {
            seat,
            identity: Some(identity.to_string()),
            category: Some(Category::of(identity)),
            confidence: 0.8,
            is_dead: Some(false),
        }
    }

    #[test]
    fn merge_is_a_full_outer_join() {
        let names = vec![named(1, "Ann"), (2, None), named(4, "Dee")];
        let matches = [hit(1, "po"), MatchResult::none(2), hit(3, "goon")]
            .into_iter()
            .map(|m| (m.seat, m))
            .collect::<BTreeMap<_, _>>();

        let records = merge(&names, &matches);
        assert_eq!(records.iter().map(|r| r.seat).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        assert_eq!(records[0].player_name.as_deref(), Some("Ann"));
        assert_eq!(records[0].identity.as_deref(), Some("po"));
        assert_eq!(records[0].category, Some(Category::Demon));

        assert_eq!(records[1].player_name, None);
        assert_eq!(records[1].identity, None);

        assert_eq!(records[2].player_name, None);
        assert_eq!(records[2].identity.as_deref(), Some("goon"));

        assert_eq!(records[3].player_name.as_deref(), Some("Dee"));
        assert_eq!(records[3].identity, None);
        assert_eq!(records[3].confidence, 0.0);
        assert_eq!(records[3].is_dead, None);
    }

    #[test]
    fn listing_filters_and_sorts_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "c.jpeg", "notes.txt", "d.gif"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("e.png")).unwrap();

        let names = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.jpeg"]);

        assert!(list_images(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn confidences_are_rounded_to_four_decimals() {
        assert_eq!(round_confidence(2.0 / 3.0), 0.6667);
        assert_eq!(round_confidence(0.123_44), 0.1234);
        assert_eq!(round_confidence(1.0), 1.0);
        assert_eq!(round_confidence(0.0), 0.0);
    }

    #[test]
    fn error_references_are_hex() {
        let reference = error_reference();
        assert!(reference.len() >= 8);
        assert!(reference.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
