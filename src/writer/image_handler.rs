//! Raster embedding.
//!
//! Images are added to the document as Image XObjects (ISO 32000-1 Section 8.9).
//!
//! - **JPEG** is passed through with the `DCTDecode` filter.
//! - **PNG** is decoded, and its pixels are Flate-compressed. An alpha
//!   channel becomes a separate `/SMask` image.

use std::io::Write;

use lopdf::{dictionary, Document, ObjectId, Stream};

use crate::error::{Error, Result};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Image format for PDF embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG image (DCTDecode filter)
    Jpeg,
    /// Decoded pixels (FlateDecode filter)
    Flate,
}

/// Color space for image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Grayscale (1 component per pixel)
    DeviceGray,
    /// RGB color (3 components per pixel)
    DeviceRGB,
    /// CMYK color (4 components per pixel)
    DeviceCMYK,
}

impl ColorSpace {
    /// Get the PDF name for this color space.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRGB => "DeviceRGB",
            ColorSpace::DeviceCMYK => "DeviceCMYK",
        }
    }
}

/// Image data ready to be written as an XObject.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Color space
    pub color_space: ColorSpace,
    /// Encoding of `data`
    pub format: ImageFormat,
    /// Encoded image data
    pub data: Vec<u8>,
    /// Compressed 8-bit alpha channel, if any
    pub soft_mask: Option<Vec<u8>>,
}

impl ImageData {
    /// Load an image, detecting the format from its magic bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.starts_with(&[0xFF, 0xD8]) {
            return Self::from_jpeg(data.to_vec());
        }
        if data.starts_with(PNG_MAGIC) {
            return Self::from_png(data);
        }
        Err(Error::UnsupportedImage("expected PNG or JPEG data".to_string()))
    }

    /// Wrap JPEG data without transcoding.
    pub fn from_jpeg(data: Vec<u8>) -> Result<Self> {
        let (width, height, color_space) = parse_jpeg_header(&data)?;
        Ok(Self {
            width,
            height,
            color_space,
            format: ImageFormat::Jpeg,
            data,
            soft_mask: None,
        })
    }

    /// Decode a PNG and compress its pixels.
    pub fn from_png(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)
            .map_err(|e| Error::UnsupportedImage(e.to_string()))?;
        let (width, height) = (img.width(), img.height());

        let (color_space, pixels, alpha) = if img.color().has_color() {
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                let mut rgb = Vec::with_capacity((width * height * 3) as usize);
                let mut alpha = Vec::with_capacity((width * height) as usize);
                for pixel in rgba.pixels() {
                    rgb.extend_from_slice(&pixel.0[..3]);
                    alpha.push(pixel.0[3]);
                }
                (ColorSpace::DeviceRGB, rgb, Some(alpha))
            } else {
                (ColorSpace::DeviceRGB, img.to_rgb8().into_raw(), None)
            }
        } else if img.color().has_alpha() {
            let la = img.to_luma_alpha8();
            let mut gray = Vec::with_capacity((width * height) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            for pixel in la.pixels() {
                gray.push(pixel.0[0]);
                alpha.push(pixel.0[1]);
            }
            (ColorSpace::DeviceGray, gray, Some(alpha))
        } else {
            (ColorSpace::DeviceGray, img.to_luma8().into_raw(), None)
        };

        // Fully opaque masks are dropped.
        let alpha = alpha.filter(|a| a.iter().any(|&v| v != 255));

        Ok(Self {
            width,
            height,
            color_space,
            format: ImageFormat::Flate,
            data: compress_image_data(&pixels)?,
            soft_mask: alpha.map(|a| compress_image_data(&a)).transpose()?,
        })
    }

    /// Add the image (and its soft mask) to `doc`, returning the image's id.
    pub fn add_to_document(&self, doc: &mut Document) -> ObjectId {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => self.color_space.pdf_name(),
            "BitsPerComponent" => 8,
        };
        match self.format {
            ImageFormat::Jpeg => dict.set("Filter", "DCTDecode"),
            ImageFormat::Flate => dict.set("Filter", "FlateDecode"),
        }

        if let Some(mask) = &self.soft_mask {
            let smask_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => self.width as i64,
                    "Height" => self.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                mask.clone(),
            ));
            dict.set("SMask", smask_id);
        }

        doc.add_object(Stream::new(dict, self.data.clone()))
    }
}

/// Parse the JPEG SOF segment for dimensions and component count.
fn parse_jpeg_header(data: &[u8]) -> Result<(u32, u32, ColorSpace)> {
    let invalid = |msg: &str| Error::UnsupportedImage(format!("JPEG: {}", msg));

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;

        // Fill bytes, stuffing, and markers without a length
        if marker == 0xFF || marker == 0x00 || marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            continue;
        }

        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if pos + 8 > data.len() {
                return Err(invalid("truncated frame header"));
            }
            let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
            let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let color_space = match data[pos + 7] {
                1 => ColorSpace::DeviceGray,
                3 => ColorSpace::DeviceRGB,
                4 => ColorSpace::DeviceCMYK,
                n => return Err(invalid(&format!("{} components", n))),
            };
            if width == 0 || height == 0 {
                return Err(invalid("zero-sized frame"));
            }
            return Ok((width, height, color_space));
        }

        if pos + 2 > data.len() {
            break;
        }
        let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += length;
    }

    Err(invalid("no frame header"))
}

fn compress_image_data(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::UnsupportedImage(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::UnsupportedImage(format!("compression failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(img: image::DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn test_png_rgb() {
        let png = encode(
            image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 3, image::Rgb([255, 0, 0]))),
            image::ImageFormat::Png,
        );
        let data = ImageData::from_bytes(&png).unwrap();
        assert_eq!((data.width, data.height), (4, 3));
        assert_eq!(data.color_space, ColorSpace::DeviceRGB);
        assert_eq!(data.format, ImageFormat::Flate);
        assert!(data.soft_mask.is_none());
    }

    #[test]
    fn test_png_alpha_becomes_soft_mask() {
        let mut img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        let png = encode(image::DynamicImage::ImageRgba8(img), image::ImageFormat::Png);
        let data = ImageData::from_bytes(&png).unwrap();
        assert!(data.soft_mask.is_some());

        let mut doc = Document::with_version("1.7");
        let id = data.add_to_document(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_ok());
    }

    #[test]
    fn test_opaque_alpha_is_dropped() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        let png = encode(image::DynamicImage::ImageRgba8(img), image::ImageFormat::Png);
        assert!(ImageData::from_bytes(&png).unwrap().soft_mask.is_none());
    }

    #[test]
    fn test_gray_png() {
        let png = encode(
            image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(5, 5, image::Luma([0]))),
            image::ImageFormat::Png,
        );
        let data = ImageData::from_bytes(&png).unwrap();
        assert_eq!(data.color_space, ColorSpace::DeviceGray);
    }

    #[test]
    fn test_jpeg_passthrough() {
        let jpeg = encode(
            image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 6, image::Rgb([1, 2, 3]))),
            image::ImageFormat::Jpeg,
        );
        let data = ImageData::from_bytes(&jpeg).unwrap();
        assert_eq!((data.width, data.height), (8, 6));
        assert_eq!(data.format, ImageFormat::Jpeg);
        assert_eq!(data.data, jpeg);
    }

    #[test]
    fn test_unknown_format() {
        let err = ImageData::from_bytes(b"GIF89a....").unwrap_err();
        assert!(matches!(err, Error::UnsupportedImage(_)));
    }

    #[test]
    fn test_truncated_png() {
        let err = ImageData::from_bytes(PNG_MAGIC).unwrap_err();
        assert!(matches!(err, Error::UnsupportedImage(_)));
    }
}
