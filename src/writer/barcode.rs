//! QR code rasters for the stamp.
//!
//! The landing URL is encoded with the `qrcode` crate and painted into a PNG
//! with `image`. The PNG is what the stamper embeds, so any other source of
//! PNG or JPEG bytes can be used in its place.
//!
//! ```ignore
//! use qr_stamp::writer::barcode::{BarcodeGenerator, QrCodeOptions};
//!
//! let png = BarcodeGenerator::generate_qr(
//!     "https://portal.example?v=AB12CD",
//!     &QrCodeOptions::portal().size(320),
//! )?;
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use qrcode::{EcLevel, QrCode};

use crate::error::{Error, Result};

/// QR code error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrErrorCorrection {
    /// Low (~7% correction capability)
    Low,
    /// Medium (~15% correction capability)
    #[default]
    Medium,
    /// Quartile (~25% correction capability)
    Quartile,
    /// High (~30% correction capability)
    High,
}

impl From<QrErrorCorrection> for EcLevel {
    fn from(level: QrErrorCorrection) -> Self {
        match level {
            QrErrorCorrection::Low => EcLevel::L,
            QrErrorCorrection::Medium => EcLevel::M,
            QrErrorCorrection::Quartile => EcLevel::Q,
            QrErrorCorrection::High => EcLevel::H,
        }
    }
}

/// Options for QR code generation.
#[derive(Debug, Clone)]
pub struct QrCodeOptions {
    /// Size of the QR code in pixels (width = height)
    pub size: u32,
    /// Error correction level
    pub error_correction: QrErrorCorrection,
    /// Quiet zone (border) in modules
    pub quiet_zone: u32,
    /// Foreground color (RGB)
    pub foreground: [u8; 3],
    /// Background color (RGB)
    pub background: [u8; 3],
}

impl Default for QrCodeOptions {
    fn default() -> Self {
        Self {
            size: 200,
            error_correction: QrErrorCorrection::Medium,
            quiet_zone: 4,
            foreground: [0, 0, 0],
            background: [255, 255, 255],
        }
    }
}

impl QrCodeOptions {
    /// Create new QR code options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for printed case documents: high error correction, one-module border.
    pub fn portal() -> Self {
        Self::default()
            .error_correction(QrErrorCorrection::High)
            .quiet_zone(1)
    }

    /// Set the size in pixels.
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Set the error correction level.
    pub fn error_correction(mut self, level: QrErrorCorrection) -> Self {
        self.error_correction = level;
        self
    }

    /// Set the quiet zone (border) in modules.
    pub fn quiet_zone(mut self, modules: u32) -> Self {
        self.quiet_zone = modules;
        self
    }

    /// Set the foreground color.
    pub fn foreground(mut self, r: u8, g: u8, b: u8) -> Self {
        self.foreground = [r, g, b];
        self
    }

    /// Set the background color.
    pub fn background(mut self, r: u8, g: u8, b: u8) -> Self {
        self.background = [r, g, b];
        self
    }
}

/// QR raster generator.
pub struct BarcodeGenerator;

impl BarcodeGenerator {
    /// Generate a QR code as PNG bytes.
    ///
    /// The output is exactly `options.size` pixels square whenever the code
    /// fits; otherwise each module gets one pixel and the image is larger.
    pub fn generate_qr(data: &str, options: &QrCodeOptions) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(Error::Barcode("Nothing to encode".to_string()));
        }

        let code = QrCode::with_error_correction_level(data, options.error_correction.into())
            .map_err(|e| Error::Barcode(format!("QR code encoding error: {}", e)))?;

        let qr_width = code.width();
        let module_count = qr_width + options.quiet_zone as usize * 2;
        let module_size = (options.size as usize / module_count).max(1);
        let drawn = module_count * module_size;
        // Centre the code when size is not a multiple of the module count.
        let canvas = drawn.max(options.size as usize);
        let offset = (canvas - drawn) / 2 + options.quiet_zone as usize * module_size;

        let mut img = RgbImage::from_pixel(canvas as u32, canvas as u32, Rgb(options.background));
        for (row, modules) in code.to_colors().chunks(qr_width).enumerate() {
            for (col, &module) in modules.iter().enumerate() {
                if module != qrcode::Color::Dark {
                    continue;
                }
                let start_x = offset + col * module_size;
                let start_y = offset + row * module_size;
                for dy in 0..module_size {
                    for dx in 0..module_size {
                        img.put_pixel(
                            (start_x + dx) as u32,
                            (start_y + dy) as u32,
                            Rgb(options.foreground),
                        );
                    }
                }
            }
        }

        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| Error::Barcode(format!("PNG encoding error: {}", e)))?;

        log::debug!(
            "Generated {}x{} QR ({} modules) for {} bytes of data",
            canvas,
            canvas,
            qr_width,
            data.len()
        );
        Ok(buf)
    }

    /// Generate a QR code with portal settings.
    pub fn generate_portal_qr(data: &str, size: u32) -> Result<Vec<u8>> {
        Self::generate_qr(data, &QrCodeOptions::portal().size(size))
    }
}
