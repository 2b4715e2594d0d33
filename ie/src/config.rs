use serde::{Deserialize, Serialize};

use crate::{CropConfig, DetectorConfig};

/// Tunables for the extraction pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IeConfig {
    pub detector: DetectorConfig,
    pub crop: CropConfig,
    /// Write `detection.png` with the detected circles drawn on each image.
    pub write_overlay: bool,
}
