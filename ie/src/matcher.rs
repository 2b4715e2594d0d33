//! Reference icon library and token identification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use data::{Category, split_dead_variant};
use serde::Serialize;

use crate::features::{self, Descriptor};
use crate::{Image, OwnedImage};

const REFERENCE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One reference icon, described once at load time.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    /// Raw file stem, including a possible dead marker.
    pub name: String,
    pub identity: String,
    pub category: Category,
    pub is_dead_variant: bool,
    pub features: Vec<Descriptor>,
}

impl ReferenceEntry {
    fn new(name: String, features: Vec<Descriptor>) -> Self {
        let (identity, is_dead_variant) = split_dead_variant(&name);
        let identity = identity.to_string();
        Self {
            category: Category::of(&identity),
            identity,
            name,
            is_dead_variant,
            features,
        }
    }
}

/// Described reference icons in filename order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceIndex {
    /// Load every reference image in `dir`.
    ///
    /// A missing directory gives an empty index; unreadable files and icons
    /// without enough features are skipped.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "reference directory not found; nothing will match");
            return Ok(Self::default());
        }

        let images = list_references(dir)?.into_iter().filter_map(|path| {
            let name = path.file_stem()?.to_string_lossy().into_owned();
            match OwnedImage::open(&path) {
                Ok(image) => Some((name, image)),
                Err(err) => {
                    tracing::warn!(path = %path.display(), "skipping reference: {err:#}");
                    None
                }
            }
        });

        let index = Self::from_images(images);
        tracing::info!(dir = %dir.display(), references = index.len(), "reference index loaded");
        Ok(index)
    }

    /// Build an index from already decoded `(stem, image)` pairs, keeping their order.
    pub fn from_images(images: impl IntoIterator<Item = (String, OwnedImage)>) -> Self {
        let entries = images
            .into_iter()
            .filter_map(|(name, image)| {
                let features = match features::describe(image.as_image()) {
                    Ok(features) => features,
                    Err(err) => {
                        tracing::warn!(name = %name, "skipping reference: {err:#}");
                        return None;
                    }
                };
                if features.len() < 2 {
                    tracing::debug!(name = %name, features = features.len(), "skipping featureless reference");
                    return None;
                }
                Some(ReferenceEntry::new(name, features))
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reference image files in `dir`, sorted by file name.
fn list_references(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("read reference directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_extension(path, &REFERENCE_EXTENSIONS))
        .collect::<Vec<_>>();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Best reference for a token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMatch {
    pub identity: String,
    pub category: Category,
    pub confidence: f32,
    pub is_dead: bool,
}

/// A scored reference, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub confidence: f32,
}

pub struct ReferenceMatcher {
    index: ReferenceIndex,
}

impl ReferenceMatcher {
    pub fn new(index: ReferenceIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    /// Identify a token crop. `None` when nothing scores above zero.
    pub fn match_token(&self, crop: Image) -> Result<Option<TokenMatch>> {
        let query = features::describe(crop)?;
        if query.len() < 2 {
            tracing::debug!(features = query.len(), "token has too few features to match");
            return Ok(None);
        }

        let mut best: Option<(&ReferenceEntry, f32)> = None;
        let mut best_score = 0.0;
        for entry in &self.index.entries {
            let score = features::confidence(&query, &entry.features);
            // Strict: the first reference keeps a tie, and zero never wins.
            if score > best_score {
                best_score = score;
                best = Some((entry, score));
            }
        }

        Ok(best.map(|(entry, confidence)| TokenMatch {
            identity: entry.identity.clone(),
            category: entry.category,
            confidence,
            is_dead: entry.is_dead_variant,
        }))
    }

    /// The `top_n` best scoring references, best first.
    pub fn rank(&self, crop: Image, top_n: usize) -> Result<Vec<Candidate>> {
        let query = features::describe(crop)?;
        if query.len() < 2 {
            return Ok(vec![]);
        }
        let mut candidates = self
            .index
            .entries
            .iter()
            .map(|entry| Candidate {
                name: entry.name.clone(),
                confidence: features::confidence(&query, &entry.features),
            })
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(top_n);
        Ok(candidates)
    }
}
