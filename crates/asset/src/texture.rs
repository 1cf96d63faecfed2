//! Texture loading and data structures.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, ensure};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage, imageops};

/// Largest edge, in pixels, a texture may be resized to.
pub const MAX_TEXTURE_SIZE: u32 = 16384;

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgb8,
    Luminance8,
    LuminanceAlpha8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgb8 => 3,
            TextureFormat::Luminance8 => 1,
            TextureFormat::LuminanceAlpha8 => 2,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, TextureFormat::Rgba8 | TextureFormat::LuminanceAlpha8)
    }
}

impl TextureData {
    /// Wrap raw pixels, checking the size matches the format.
    pub fn new(width: u32, height: u32, format: TextureFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel() as usize;
        ensure!(
            data.len() == expected,
            "Data size {} doesn't match {:?} {}x{} (expected {})",
            data.len(),
            format,
            width,
            height,
            expected
        );
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Create a new texture with given dimensions and RGBA8 format.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, TextureFormat::Rgba8, data)
    }

    /// Keep the image's channel layout where we have a matching format;
    /// anything else (16-bit, float) is widened to RGBA8.
    pub fn from_image(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (format, data) = match img {
            DynamicImage::ImageLuma8(buf) => (TextureFormat::Luminance8, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (TextureFormat::LuminanceAlpha8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (TextureFormat::Rgb8, buf.into_raw()),
            other => (TextureFormat::Rgba8, other.to_rgba8().into_raw()),
        };
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Load texture from an image file (format picked by extension).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading texture from {:?}", path);

        let img = image::open(path)
            .map_err(|e| anyhow!("Failed to open image {:?}: {}", path, e))?;
        let data = Self::from_image(img);

        log::debug!(
            "Loaded texture {}x{} {:?} with {} bytes",
            data.width,
            data.height,
            data.format,
            data.data.len()
        );
        Ok(data)
    }

    pub fn to_image(&self) -> Result<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let raw = self.data.clone();
        let img = match self.format {
            TextureFormat::Rgba8 => RgbaImage::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
            TextureFormat::Rgb8 => RgbImage::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
            TextureFormat::Luminance8 => GrayImage::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
            TextureFormat::LuminanceAlpha8 => {
                GrayAlphaImage::from_raw(w, h, raw).map(DynamicImage::ImageLumaA8)
            }
        };
        img.ok_or_else(|| anyhow!("Pixel buffer too small for {}x{} {:?}", w, h, self.format))
    }

    /// Resample to exactly `width` x `height`, keeping the format.
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        ensure!(width > 0 && height > 0, "Cannot resize to {}x{}", width, height);
        ensure!(
            width <= MAX_TEXTURE_SIZE && height <= MAX_TEXTURE_SIZE,
            "Cannot resize to {}x{} (limit {})",
            width,
            height,
            MAX_TEXTURE_SIZE
        );
        let resized = self
            .to_image()?
            .resize_exact(width, height, imageops::FilterType::Triangle);
        Ok(Self::from_image(resized))
    }

    /// Convert pixels to another channel layout.
    pub fn convert(&self, format: TextureFormat) -> Result<Self> {
        if format == self.format {
            return Ok(self.clone());
        }
        let img = self.to_image()?;
        let data = match format {
            TextureFormat::Rgba8 => img.to_rgba8().into_raw(),
            TextureFormat::Rgb8 => img.to_rgb8().into_raw(),
            TextureFormat::Luminance8 => img.to_luma8().into_raw(),
            TextureFormat::LuminanceAlpha8 => img.to_luma_alpha8().into_raw(),
        };
        Self::new(self.width, self.height, format, data)
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.to_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {:?}", path))
    }

    /// Create a simple test texture (checkerboard pattern).
    pub fn create_test_texture(size: u32) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let checker = ((x / 8) + (y / 8)) % 2;
                if checker == 0 {
                    // White square
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    // Gray square
                    data.extend_from_slice(&[128, 128, 128, 255]);
                }
            }
        }

        Self {
            data,
            width: size,
            height: size,
            format: TextureFormat::Rgba8,
        }
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        self.format.bytes_per_pixel()
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size =
            self.width as usize * self.height as usize * self.bytes_per_pixel() as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}

/// Sampler filtering requested for a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Nearest,
    #[default]
    Linear,
    /// Trilinear: linear within and between mip levels.
    Mipmap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerSettings {
    pub min_filter: SamplerFilter,
    pub mag_filter: SamplerFilter,
    pub anisotropic_degree: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            min_filter: SamplerFilter::Linear,
            mag_filter: SamplerFilter::Linear,
            anisotropic_degree: 1,
        }
    }
}

/// A named texture as managed by the pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    name: String,
    fullpath: Option<PathBuf>,
    data: TextureData,
    sampler: SamplerSettings,
    keep_ram_image: bool,
}

impl Texture {
    pub fn new(name: impl Into<String>, data: TextureData) -> Self {
        Self {
            name: name.into(),
            fullpath: None,
            data,
            sampler: SamplerSettings::default(),
            keep_ram_image: false,
        }
    }

    /// Read from disk; the name is the file stem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Texture path {:?} has no file name", path))?;
        let data = TextureData::load(path)?;
        Ok(Self {
            fullpath: Some(path.to_path_buf()),
            ..Self::new(name, data)
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn fullpath(&self) -> Option<&Path> {
        self.fullpath.as_deref()
    }

    #[inline]
    pub fn data(&self) -> &TextureData {
        &self.data
    }

    pub fn set_data(&mut self, data: TextureData) {
        self.data = data;
    }

    #[inline]
    pub fn x_size(&self) -> u32 {
        self.data.width
    }

    #[inline]
    pub fn y_size(&self) -> u32 {
        self.data.height
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.data.format
    }

    #[inline]
    pub fn sampler(&self) -> SamplerSettings {
        self.sampler
    }

    pub fn set_sampler(&mut self, sampler: SamplerSettings) {
        self.sampler = sampler;
    }

    /// When set, a reload from disk keeps this in-memory image instead.
    #[inline]
    pub fn keep_ram_image(&self) -> bool {
        self.keep_ram_image
    }

    pub fn set_keep_ram_image(&mut self, keep: bool) {
        self.keep_ram_image = keep;
    }

    pub fn rescale(&mut self, width: u32, height: u32) -> Result<()> {
        self.data = self.data.resize(width, height)?;
        Ok(())
    }

    pub fn reformat(&mut self, format: TextureFormat) -> Result<()> {
        self.data = self.data.convert(format)?;
        Ok(())
    }
}
