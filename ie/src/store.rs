//! Persistence boundary between the two pipeline passes.
//!
//! Pass 1 writes one crop per seat, pass 2 reads them back by seat number.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::OwnedImage;

/// File name of the debug overlay; never a seat.
pub const OVERLAY_FILE: &str = "detection.png";

/// Canonical seat stems only: `7.png` is seat 7, `07.png` is not a seat.
static SEAT_STEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[1-9]\d*$").expect("valid regex"));

pub trait TokenStore {
    /// Remove every stored crop (and the overlay).
    fn clear(&mut self) -> Result<()>;
    fn store(&mut self, seat: u32, crop: &OwnedImage) -> Result<()>;
    /// Stored seats, ascending.
    fn seats(&self) -> Result<Vec<u32>>;
    fn load(&self, seat: u32) -> Result<OwnedImage>;
    fn store_overlay(&mut self, image: &OwnedImage) -> Result<()>;
}

/// Crops as `{seat}.png` files in a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn crop_path(&self, seat: u32) -> PathBuf {
        self.dir.join(format!("{seat}.png"))
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.dir.join(OVERLAY_FILE)
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create output directory {}", self.dir.display()))
    }

    /// `(seat, path)` for every file named exactly like [`DirStore::crop_path`].
    fn seat_files(&self) -> Result<Vec<(u32, PathBuf)>> {
        if !self.dir.is_dir() {
            return Ok(vec![]);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("read output directory {}", self.dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || !path.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !SEAT_STEM.is_match(stem) {
                continue;
            }
            // Digits only, so this only fails on overflow.
            if let Ok(seat) = stem.parse::<u32>() {
                files.push((seat, path));
            }
        }
        files.sort_by_key(|(seat, _)| *seat);
        Ok(files)
    }
}

impl TokenStore for DirStore {
    fn clear(&mut self) -> Result<()> {
        let overlay = self.overlay_path();
        let stale = self
            .seat_files()?
            .into_iter()
            .map(|(_, path)| path)
            .chain(overlay.is_file().then_some(overlay));

        for path in stale {
            std::fs::remove_file(&path).with_context(|| format!("remove stale crop {}", path.display()))?;
        }
        Ok(())
    }

    fn store(&mut self, seat: u32, crop: &OwnedImage) -> Result<()> {
        self.ensure_dir()?;
        let path = self.crop_path(seat);
        crop.save_png(&path)
            .with_context(|| format!("write crop {}", path.display()))
    }

    fn seats(&self) -> Result<Vec<u32>> {
        Ok(self.seat_files()?.into_iter().map(|(seat, _)| seat).collect())
    }

    fn load(&self, seat: u32) -> Result<OwnedImage> {
        OwnedImage::open(self.crop_path(seat))
    }

    fn store_overlay(&mut self, image: &OwnedImage) -> Result<()> {
        self.ensure_dir()?;
        let path = self.overlay_path();
        image.save_png(&path)
            .with_context(|| format!("write overlay {}", path.display()))
    }
}

/// Crops kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    crops: BTreeMap<u32, OwnedImage>,
    overlay: Option<OwnedImage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(&self) -> Option<&OwnedImage> {
        self.overlay.as_ref()
    }
}

impl TokenStore for MemoryStore {
    fn clear(&mut self) -> Result<()> {
        self.crops.clear();
        self.overlay = None;
        Ok(())
    }

    fn store(&mut self, seat: u32, crop: &OwnedImage) -> Result<()> {
        self.crops.insert(seat, crop.clone());
        Ok(())
    }

    fn seats(&self) -> Result<Vec<u32>> {
        Ok(self.crops.keys().copied().collect())
    }

    fn load(&self, seat: u32) -> Result<OwnedImage> {
        self.crops
            .get(&seat)
            .cloned()
            .with_context(|| format!("no crop stored for seat {seat}"))
    }

    fn store_overlay(&mut self, image: &OwnedImage) -> Result<()> {
        self.overlay = Some(image.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    fn crop(shade: u8) -> OwnedImage {
        let mut img = OwnedImage::new(4, 4);
        img.put_pixel(1, 1, Color::new(shade, shade, shade));
        img
    }

    #[test]
    fn seats_are_numeric_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path().join("out"));
        assert!(store.seats().unwrap().is_empty());

        for seat in [10, 2, 1] {
            store.store(seat, &crop(seat as u8)).unwrap();
        }
        store.store_overlay(&crop(0)).unwrap();
        std::fs::write(store.dir().join("3a.png"), b"x").unwrap();
        std::fs::write(store.dir().join("4.txt"), b"x").unwrap();

        assert_eq!(store.seats().unwrap(), vec![1, 2, 10]);
        assert_eq!(store.load(10).unwrap(), crop(10));
        assert!(store.overlay_path().is_file());
    }

    #[test]
    fn padded_stems_are_not_seats() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        store.store(7, &crop(7)).unwrap();
        crop(8).save_png(dir.path().join("07.png")).unwrap();
        crop(9).save_png(dir.path().join("0.png")).unwrap();

        let seats = store.seats().unwrap();
        assert_eq!(seats, vec![7]);
        for seat in seats {
            assert_eq!(store.load(seat).unwrap(), crop(7));
        }
    }

    #[test]
    fn clear_removes_crops_and_overlay_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        store.store(1, &crop(1)).unwrap();
        store.store_overlay(&crop(0)).unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        store.clear().unwrap();
        assert!(store.seats().unwrap().is_empty());
        assert!(!store.overlay_path().exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn missing_seat_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirStore::new(dir.path()).load(1).is_err());
        assert!(MemoryStore::new().load(1).is_err());
    }

    #[test]
    fn memory_store_mirrors_the_directory_store() {
        let mut store = MemoryStore::new();
        store.store(3, &crop(3)).unwrap();
        store.store(1, &crop(1)).unwrap();
        store.store_overlay(&crop(0)).unwrap();
        assert_eq!(store.seats().unwrap(), vec![1, 3]);
        assert_eq!(store.load(3).unwrap(), crop(3));
        assert!(store.overlay().is_some());

        store.clear().unwrap();
        assert!(store.seats().unwrap().is_empty());
        assert!(store.overlay().is_none());
    }
}
