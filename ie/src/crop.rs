//! Per-token crops: the disk-masked token image and the name label region.

use serde::{Deserialize, Serialize};

use crate::{Circle, Color, Image, OrderedCircle, OwnedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Extra pixels around the token's bounding square.
    pub padding: u32,
    /// Vertical distance from the token centre to the centre of the name label.
    pub name_offset_y: u32,
    pub name_width: u32,
    pub name_height: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            padding: 5,
            name_offset_y: 89,
            name_width: 180,
            name_height: 38,
        }
    }
}

/// Axis-aligned rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Circular token crop; everything outside the disk is black.
#[derive(Debug, Clone)]
pub struct TokenCrop {
    pub seat: u32,
    pub image: OwnedImage,
}

/// Name label area under a token. Borrowed from the source image.
#[derive(Clone, Copy)]
pub struct NameRegion<'a> {
    pub seat: u32,
    pub rect: Rect,
    pub image: Image<'a>,
}

pub fn crop<'a>(image: Image<'a>, token: &OrderedCircle, config: &CropConfig) -> (TokenCrop, NameRegion<'a>) {
    (
        TokenCrop {
            seat: token.seat,
            image: circular_crop(image, &token.circle, config.padding),
        },
        name_region(image, token, config),
    )
}

/// Square crop around the circle with every pixel outside the disk zeroed.
pub fn circular_crop(image: Image, circle: &Circle, padding: u32) -> OwnedImage {
    let reach = circle.radius + padding;
    let x1 = circle.x.saturating_sub(reach);
    let y1 = circle.y.saturating_sub(reach);
    let x2 = (circle.x + reach).min(image.width());
    let y2 = (circle.y + reach).min(image.height());

    let mut out = image.sub_image(x1, y1, x2 - x1, y2 - y1).to_owned_image();

    // Mask around the real centre; the box may be clipped on one side.
    let cx = (circle.x - x1) as i64;
    let cy = (circle.y - y1) as i64;
    let r_sq = (circle.radius as i64).pow(2);
    for y in 0..out.height() {
        for x in 0..out.width() {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            if dx * dx + dy * dy > r_sq {
                out.put_pixel(x, y, Color::BLACK);
            }
        }
    }

    out
}

/// Rectangle where the player's name is written under a token, clipped to the image.
pub fn name_rect(circle: &Circle, width: u32, height: u32, config: &CropConfig) -> Rect {
    let centre_y = circle.y as i64 + config.name_offset_y as i64;
    let half_w = (config.name_width / 2) as i64;
    let half_h = (config.name_height / 2) as i64;

    let x1 = (circle.x as i64 - half_w).clamp(0, width as i64);
    let x2 = (circle.x as i64 + half_w).clamp(0, width as i64);
    let y1 = (centre_y - half_h).clamp(0, height as i64);
    let y2 = (centre_y + half_h).clamp(0, height as i64);

    Rect {
        x: x1 as u32,
        y: y1 as u32,
        w: (x2 - x1).max(0) as u32,
        h: (y2 - y1).max(0) as u32,
    }
}

pub fn name_region<'a>(image: Image<'a>, token: &OrderedCircle, config: &CropConfig) -> NameRegion<'a> {
    let rect = name_rect(&token.circle, image.width(), image.height(), config);
    NameRegion {
        seat: token.seat,
        rect,
        image: image.sub_image(rect.x, rect.y, rect.w, rect.h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: u32, height: u32, color: Color) -> OwnedImage {
        let mut img = OwnedImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.put_pixel(x, y, color);
            }
        }
        img
    }

    #[test]
    fn crop_keeps_only_the_disk() {
        let img = filled(100, 100, Color::WHITE);
        let circle = Circle { x: 50, y: 50, radius: 20 };
        let out = circular_crop(img.as_image(), &circle, 5);

        assert_eq!((out.width(), out.height()), (50, 50));
        // Centre and a point just inside the rim keep their content.
        assert_eq!(out.pixel(25, 25), Color::WHITE);
        assert_eq!(out.pixel(25, 6), Color::WHITE);
        // Padding corners and the band between disk and box are blank.
        assert_eq!(out.pixel(0, 0), Color::BLACK);
        assert_eq!(out.pixel(49, 49), Color::BLACK);
        assert_eq!(out.pixel(25, 2), Color::BLACK);
    }

    #[test]
    fn clipped_crop_masks_around_the_true_centre() {
        let img = filled(100, 100, Color::WHITE);
        // Touches the left edge: the padding is clipped there but not on the right.
        let circle = Circle { x: 20, y: 50, radius: 20 };
        let out = circular_crop(img.as_image(), &circle, 5);

        assert_eq!((out.width(), out.height()), (45, 50));
        assert_eq!(out.pixel(20, 25), Color::WHITE);
        assert_eq!(out.pixel(0, 25), Color::WHITE);
        assert_eq!(out.pixel(44, 25), Color::BLACK);
    }

    #[test]
    fn name_region_sits_below_the_token() {
        let circle = Circle { x: 300, y: 200, radius: 60 };
        let rect = name_rect(&circle, 1000, 1000, &CropConfig::default());
        assert_eq!(rect, Rect { x: 210, y: 270, w: 180, h: 38 });
    }

    #[test]
    fn name_region_is_clipped_to_the_image() {
        let config = CropConfig::default();
        let circle = Circle { x: 40, y: 220, radius: 30 };
        let rect = name_rect(&circle, 400, 300, &config);
        assert_eq!(rect, Rect { x: 0, y: 290, w: 130, h: 10 });

        let gone = name_rect(&Circle { x: 40, y: 290, radius: 5 }, 400, 300, &CropConfig {
            name_offset_y: 200,
            ..config
        });
        assert!(gone.is_empty());
    }

    #[test]
    fn crop_pairs_share_the_seat() {
        let img = filled(400, 400, Color::WHITE);
        let token = OrderedCircle {
            seat: 7,
            circle: Circle { x: 200, y: 150, radius: 50 },
        };
        let (crop, region) = crop(img.as_image(), &token, &CropConfig::default());
        assert_eq!(crop.seat, 7);
        assert_eq!(region.seat, 7);
        assert_eq!((region.image.width(), region.image.height()), (180, 38));
    }
}
