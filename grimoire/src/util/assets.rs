use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Environment variable overriding OCR model discovery.
pub const ASSETS_ENV: &str = "GRIMOIRE_ASSETS_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrAssets {
	pub detection: PathBuf,
	pub recognition: PathBuf,
	pub charset: PathBuf,
}

impl OcrAssets {
	/// The model files for `lang_code` inside `base` (or `base/ocr`), if all are present.
	fn find_in(base: &Path, lang_code: &str) -> Option<Self> {
		// `base` may be the app root (containing `ocr/`) or the `ocr/` folder itself.
		let ocr_dir = if base.join("detection.mnn").is_file() {
			base.to_path_buf()
		} else {
			base.join("ocr")
		};

		let assets = Self {
			detection: ocr_dir.join("detection.mnn"),
			recognition: ocr_dir.join(format!("{lang_code}_recognition.mnn")),
			charset: ocr_dir.join(format!("{lang_code}_charset.txt")),
		};
		(assets.detection.is_file() && assets.recognition.is_file() && assets.charset.is_file()).then_some(assets)
	}
}

/// Directories searched for OCR models, in priority order.
fn search_dirs() -> Vec<PathBuf> {
	let mut dirs = Vec::new();
	if let Some(dir) = std::env::var_os(ASSETS_ENV) {
		dirs.push(PathBuf::from(dir));
	}
	if let Ok(exe) = std::env::current_exe()
		&& let Some(dir) = exe.parent()
	{
		dirs.push(dir.to_path_buf());
	}
	if let Ok(cwd) = std::env::current_dir() {
		dirs.push(cwd);
	}
	// Workspace root, for `cargo run` from another directory.
	#[cfg(debug_assertions)]
	dirs.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".."));
	dirs
}

/// Resolve OCR model paths for a packaged binary or a source checkout.
pub fn resolve_ocr_assets(lang_code: &str) -> Result<OcrAssets> {
	let dirs = search_dirs();
	if let Some(assets) = dirs.iter().find_map(|dir| OcrAssets::find_in(dir, lang_code)) {
		tracing::debug!(detection = %assets.detection.display(), "found OCR models");
		return Ok(assets);
	}

	bail!(
		"OCR model files not found. Expected these files:\n  - ocr/detection.mnn\n  - ocr/{lang_code}_recognition.mnn\n  - ocr/{lang_code}_charset.txt\n\nSearched in:\n{}\n\nFix: copy the 'ocr/' folder next to the executable (or set {ASSETS_ENV} to the folder that contains it).",
		dirs.iter()
			.map(|p| format!("  - {}", p.display()))
			.collect::<Vec<_>>()
			.join("\n")
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn touch(dir: &Path, names: &[&str]) {
		std::fs::create_dir_all(dir).unwrap();
		for name in names {
			std::fs::write(dir.join(name), b"").unwrap();
		}
	}

	#[test]
	fn finds_models_in_an_ocr_subfolder() {
		let root = tempfile::tempdir().unwrap();
		touch(&root.path().join("ocr"), &["detection.mnn", "en_recognition.mnn", "en_charset.txt"]);

		let assets = OcrAssets::find_in(root.path(), "en").unwrap();
		assert_eq!(assets.recognition, root.path().join("ocr").join("en_recognition.mnn"));
		assert!(OcrAssets::find_in(root.path(), "de").is_none());
	}

	#[test]
	fn accepts_the_ocr_folder_itself() {
		let root = tempfile::tempdir().unwrap();
		touch(root.path(), &["detection.mnn", "en_recognition.mnn", "en_charset.txt"]);
		assert_eq!(OcrAssets::find_in(root.path(), "en").unwrap().detection, root.path().join("detection.mnn"));
	}
}
