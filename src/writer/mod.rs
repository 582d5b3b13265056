//! Writing the stamp into an existing document.
//!
//! ## Architecture
//!
//! ```text
//! QR PNG/JPEG ──▶ [ImageData] ──▶ image XObject ─┐
//! caption + URL ─▶ [ContentStreamBuilder] ───────┼──▶ page 1 of the source document
//! link rect ────▶ [LinkAnnotation] ──▶ /Annots ──┘
//! ```
//!
//! [`DocumentStamper`] runs the whole sequence; the pieces are public for
//! callers that need a different layout.

pub mod annotation_builder;
pub mod barcode;
pub mod content_stream;
pub mod image_handler;
pub mod stamp;

pub use annotation_builder::{append_annotation, BorderStyle, LinkAnnotation};
pub use barcode::{BarcodeGenerator, QrCodeOptions, QrErrorCorrection};
pub use content_stream::{ContentStreamBuilder, ContentStreamOp};
pub use image_handler::{ColorSpace, ImageData, ImageFormat};
pub use stamp::{first_page_box, DocumentStamper, LabelLayout, LabelPlacement, StampPlacement, StampRequest};
