//! Pixel containers shared by every stage.
//!
//! `OwnedImage` holds decoded photographs and token crops as plain RGB.
//!
//! Most stages borrow a view (`Image<'a>`) instead of copying pixels: the name
//! region under a token is just a clipped view of the photograph, and only
//! becomes an owned image when it has to be upscaled for OCR.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

/// RGB pixels in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedImage {
    width: u32,
    height: u32,
    data: Vec<Color>,
}

impl OwnedImage {
    /// Black image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Color::BLACK; (width * height) as usize],
        }
    }

    pub fn from_rgb_image(img: &image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img
            .pixels()
            .map(|p| Color::new(p.0[0], p.0[1], p.0[2]))
            .collect();

        Self {
            width,
            height,
            data,
        }
    }

    /// Decode an image file (any format `image` understands); alpha is discarded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))?
            .to_rgb8();
        Ok(Self::from_rgb_image(&img))
    }

    /// Gray level copied into all three channels.
    pub fn from_gray_as_rgb(gray: &image::GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let mut data = Vec::with_capacity((w * h) as usize);
        for p in gray.pixels() {
            let v = p.0[0];
            data.push(Color::new(v, v, v));
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.data[(x + y * self.width) as usize]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Color) {
        self.data[(x + y * self.width) as usize] = color;
    }

    /// Resize to an exact size.
    ///
    /// Same-size requests return a copy without touching the resizer.
    pub fn resized(&self, width: u32, height: u32, alg: ResizeAlg) -> Result<Self> {
        ensure!(self.width > 0 && self.height > 0, "cannot resize an empty image");
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }

        let src = fast_image_resize::images::Image::from_vec_u8(
            self.width,
            self.height,
            self.as_image().get_bytes(),
            PixelType::U8x3,
        )
        .context("wrap source pixels for resize")?;
        let mut dst = fast_image_resize::images::Image::new(width, height, PixelType::U8x3);

        let mut resizer = Resizer::new();
        let options = ResizeOptions::new().resize_alg(alg);
        resizer
            .resize(&src, &mut dst, &options)
            .context("fast_image_resize: resize failed")?;

        let data = dst
            .into_vec()
            .chunks_exact(3)
            .map(|px| Color::new(px[0], px[1], px[2]))
            .collect();

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Resize to the given height (preserving aspect ratio).
    pub fn resized_h(&self, height: u32) -> Result<Self> {
        let height = height.max(1);
        let width = (self.width as u64 * height as u64 / self.height.max(1) as u64).max(1) as u32;
        self.resized(
            width,
            height,
            ResizeAlg::Interpolation(FilterType::CatmullRom),
        )
    }

    /// View of the whole image.
    pub fn as_image<'a>(&'a self) -> Image<'a> {
        Image {
            x1: 0,
            y1: 0,
            x2: self.width,
            y2: self.height,
            true_width: self.width,
            data: &self.data,
        }
    }

    pub fn to_gray_image(&self) -> image::GrayImage {
        self.as_image().to_gray_image()
    }

    pub fn to_rgb_image(&self) -> image::RgbImage {
        let mut out = image::RgbImage::new(self.width, self.height);
        for (i, p) in out.pixels_mut().enumerate() {
            let c = self.data[i];
            p.0 = [c.r, c.g, c.b];
        }
        out
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.as_image().save_png(path)
    }
}

/// Resize a grayscale image to an exact size with a box (area-averaging) filter.
pub fn resize_gray(gray: &image::GrayImage, width: u32, height: u32) -> Result<image::GrayImage> {
    let (src_w, src_h) = gray.dimensions();
    ensure!(src_w > 0 && src_h > 0, "cannot resize an empty image");
    if src_w == width && src_h == height {
        return Ok(gray.clone());
    }

    let src = fast_image_resize::images::ImageRef::new(src_w, src_h, gray.as_raw(), PixelType::U8)
        .context("wrap grayscale pixels for resize")?;
    let mut dst = fast_image_resize::images::Image::new(width, height, PixelType::U8);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    resizer
        .resize(&src, &mut dst, &options)
        .context("fast_image_resize: resize failed")?;

    image::GrayImage::from_raw(width, height, dst.into_vec())
        .context("GrayImage::from_raw failed")
}

/// Rectangular window into an `OwnedImage`'s pixels.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    true_width: u32,
    data: &'a [Color],
}

impl<'a> Image<'a> {
    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Pixel at view-relative coordinates.
    #[inline(always)]
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.data[(self.x1 + x + (self.y1 + y) * self.true_width) as usize]
    }

    pub fn to_owned_image(self) -> OwnedImage {
        let mut data = Vec::with_capacity((self.width() * self.height()) as usize);
        for y in 0..self.height() {
            for x in 0..self.width() {
                data.push(self.pixel(x, y));
            }
        }

        OwnedImage {
            width: self.width(),
            height: self.height(),
            data,
        }
    }

    pub fn to_gray_image(&self) -> image::GrayImage {
        image::GrayImage::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([self.pixel(x, y).luma()])
        })
    }

    pub fn get_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.width() * self.height() * 3) as usize);
        for y in 0..self.height() {
            for x in 0..self.width() {
                let clr = self.pixel(x, y);
                bytes.extend_from_slice(&[clr.r, clr.g, clr.b]);
            }
        }
        bytes
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.get_bytes();
        let img = image::RgbImage::from_raw(self.width(), self.height(), bytes)
            .context("RgbImage::from_raw failed")?;
        img.save_with_format(path, image::ImageFormat::Png)
            .context("save png")?;
        Ok(())
    }

    /// Create an arbitrary subimage (relative coordinates), clipped to this view.
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);

        Self {
            x1: self.x1 + x,
            y1: self.y1 + y,
            x2: self.x1 + x + width,
            y2: self.y1 + y + height,
            true_width: self.true_width,
            data: self.data,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Rec. 601 luma.
    pub fn luma(&self) -> u8 {
        let r = self.r as u32;
        let g = self.g as u32;
        let b = self.b as u32;
        ((299 * r + 587 * g + 114 * b) / 1000) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_image_is_clipped_to_bounds() {
        let img = OwnedImage::new(10, 8);
        let view = img.as_image().sub_image(6, 5, 10, 10);
        assert_eq!((view.width(), view.height()), (4, 3));

        let outside = img.as_image().sub_image(20, 20, 5, 5);
        assert!(outside.is_empty());
    }

    #[test]
    fn view_pixels_are_relative() {
        let mut img = OwnedImage::new(4, 4);
        img.put_pixel(2, 3, Color::WHITE);
        let view = img.as_image().sub_image(1, 2, 3, 2);
        assert_eq!(view.pixel(1, 1), Color::WHITE);
        assert_eq!(view.to_owned_image().pixel(1, 1), Color::WHITE);
        assert_eq!(view.to_gray_image().get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn resized_h_keeps_aspect_ratio() {
        let img = OwnedImage::new(90, 19);
        let up = img.resized_h(80).unwrap();
        assert_eq!((up.width(), up.height()), (378, 80));
    }

    #[test]
    fn rgb_round_trip_keeps_pixels() {
        let mut img = OwnedImage::new(3, 2);
        img.put_pixel(0, 1, Color::new(10, 20, 30));
        let back = OwnedImage::from_rgb_image(&img.to_rgb_image());
        assert_eq!(back, img);
    }
}
