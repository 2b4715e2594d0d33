//! Debug rendering of what the detector found.

use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};

use crate::{CropConfig, Image, OrderedCircle, OwnedImage, name_rect};

const CIRCLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CENTRE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const NAME_COLOR: Rgb<u8> = Rgb([0, 128, 255]);

/// Copy of `image` with circles, centres and name regions drawn on top.
pub fn draw_detections(image: Image, tokens: &[OrderedCircle], config: &CropConfig) -> OwnedImage {
    let (width, height) = (image.width(), image.height());
    let mut canvas = image.to_owned_image().to_rgb_image();

    for token in tokens {
        let c = token.circle;
        let centre = (c.x as i32, c.y as i32);
        // Thicker rim so it survives downscaled viewing.
        for r in [c.radius, c.radius + 1] {
            draw_hollow_circle_mut(&mut canvas, centre, r as i32, CIRCLE_COLOR);
        }
        draw_filled_circle_mut(&mut canvas, centre, 2, CENTRE_COLOR);

        let rect = name_rect(&c, width, height, config);
        if !rect.is_empty() {
            draw_hollow_rect_mut(
                &mut canvas,
                imageproc::rect::Rect::at(rect.x as i32, rect.y as i32).of_size(rect.w, rect.h),
                NAME_COLOR,
            );
        }
    }

    OwnedImage::from_rgb_image(&canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Circle, Color};

    #[test]
    fn marks_circle_centre_and_name_region() {
        let img = OwnedImage::new(400, 400);
        let token = OrderedCircle {
            seat: 1,
            circle: Circle { x: 200, y: 150, radius: 60 },
        };
        let out = draw_detections(img.as_image(), &[token], &CropConfig::default());

        assert_eq!((out.width(), out.height()), (400, 400));
        assert_eq!(out.pixel(200, 150), Color::new(255, 0, 0));
        assert_eq!(out.pixel(260, 150), Color::new(0, 255, 0));
        // Top-left corner of the 180x38 name rect centred 89 px below.
        assert_eq!(out.pixel(110, 220), Color::new(0, 128, 255));
        // Source is untouched.
        assert_eq!(img.pixel(200, 150), Color::BLACK);
    }
}
