use std::path::Path;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use crate::renderer::backend::desc::{TextureDesc, TextureFormat};
use crate::renderer::core::Extent;

/// Decoded pixels ready to be uploaded, rows `row_pitch` bytes apart
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub extent: Extent,
    pub row_pitch: u32,
    pub format: TextureFormat,
}

impl TextureData {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .wrap_err_with(|| format!("Failed to load texture {}", path.display()))?;
        log::info!("Loaded texture {} ({}x{})", path.display(), image.width(), image.height());
        Self::from_image(&image)
    }

    pub fn from_image(image: &image::DynamicImage) -> Result<Self> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(rgba.into_raw(), width, height)
    }

    /// Tightly packed 8-bit RGBA pixels in sRGB
    pub fn from_rgba8(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let format = TextureFormat::Rgba8UnormSrgb;
        let data = Self {
            pixels,
            extent: Extent::new(width, height),
            row_pitch: width * format.bytes_per_pixel(),
            format,
        };
        data.validate()?;
        Ok(data)
    }

    pub fn desc(&self) -> TextureDesc {
        TextureDesc {
            extent: self.extent,
            format: self.format,
        }
    }

    /// Checks that the pixel buffer covers exactly `row_pitch * height` bytes
    pub fn validate(&self) -> Result<()> {
        if self.extent.is_zero_area() {
            return Err(eyre!("Texture has an empty extent {}", self.extent));
        }

        let row_bytes = self.extent.width as u64 * self.format.bytes_per_pixel() as u64;
        if (self.row_pitch as u64) < row_bytes {
            return Err(eyre!(
                "Row pitch {} is smaller than a {}-pixel row ({} bytes)",
                self.row_pitch,
                self.extent.width,
                row_bytes,
            ));
        }

        let expected = self.row_pitch as u64 * self.extent.height as u64;
        if self.pixels.len() as u64 != expected {
            return Err(eyre!(
                "Texture of {} holds {} bytes, expected {}",
                self.extent,
                self.pixels.len(),
                expected,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_image_is_tightly_packed_rgba() {
        let image = image::RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));
        let data = TextureData::from_image(&image::DynamicImage::ImageRgba8(image)).unwrap();

        assert_eq!(data.extent, Extent::new(3, 2));
        assert_eq!(data.row_pitch, 12);
        assert_eq!(data.pixels.len(), 24);
        assert_eq!(&data.pixels[12..16], &[0, 1, 7, 255]);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        assert!(TextureData::from_rgba8(vec![0; 15], 2, 2).is_err());
        assert!(TextureData::from_rgba8(Vec::new(), 0, 4).is_err());

        let mut data = TextureData::from_rgba8(vec![0; 16], 2, 2).unwrap();
        data.row_pitch = 4;
        assert!(data.validate().is_err());
    }

    #[test]
    fn bundled_texture_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/texture.png");
        let data = TextureData::from_path(path).unwrap();
        data.validate().unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(TextureData::from_path("does/not/exist.png").is_err());
    }
}
