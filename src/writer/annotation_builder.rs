//! Link annotations (ISO 32000-1 Section 12.5.6.5).
//!
//! ```ignore
//! use qr_stamp::geometry::Rect;
//! use qr_stamp::writer::annotation_builder::LinkAnnotation;
//!
//! let link = LinkAnnotation::uri(Rect::new(72.0, 720.0, 200.0, 30.0), "https://example.com");
//! let annot_id = doc.add_object(link.to_dictionary());
//! append_annotation(&mut doc, page_id, annot_id)?;
//! ```

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};

use crate::error::{Error, Result};
use crate::geometry::Rect;

/// Border style for annotations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BorderStyle {
    /// Horizontal corner radius
    pub horizontal_radius: f32,
    /// Vertical corner radius
    pub vertical_radius: f32,
    /// Border width (0 = invisible)
    pub width: f32,
}

impl BorderStyle {
    /// Create a border style with no visible border.
    pub fn none() -> Self {
        Self::default()
    }

    /// Create a solid border with specified width.
    pub fn solid(width: f32) -> Self {
        Self {
            width,
            ..Default::default()
        }
    }

    fn to_border_array(self) -> Object {
        Object::Array(vec![
            Object::Real(self.horizontal_radius),
            Object::Real(self.vertical_radius),
            Object::Real(self.width),
        ])
    }
}

/// A link annotation that opens a URI.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAnnotation {
    /// Clickable rectangle (in page coordinates)
    pub rect: Rect,
    /// Target URI
    pub uri: String,
    /// Border style
    pub border: BorderStyle,
    /// Border/highlight color
    pub color: Option<(f32, f32, f32)>,
}

impl LinkAnnotation {
    /// Create a borderless URI link, colored blue for viewers that show it.
    pub fn uri(rect: Rect, uri: impl Into<String>) -> Self {
        Self {
            rect,
            uri: uri.into(),
            border: BorderStyle::none(),
            color: Some((0.0, 0.0, 1.0)),
        }
    }

    /// Set the border style.
    pub fn with_border(mut self, border: BorderStyle) -> Self {
        self.border = border;
        self
    }

    /// Build the annotation dictionary.
    pub fn to_dictionary(&self) -> Dictionary {
        let [x0, y0, x1, y1] = self.rect.to_pdf_array();
        let mut dict = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![Object::Real(x0), Object::Real(y0), Object::Real(x1), Object::Real(y1)],
            "Border" => self.border.to_border_array(),
            "A" => dictionary! {
                "Type" => "Action",
                "S" => "URI",
                "URI" => Object::String(self.uri.as_bytes().to_vec(), StringFormat::Literal),
            },
        };
        if let Some((r, g, b)) = self.color {
            dict.set("C", vec![Object::Real(r), Object::Real(g), Object::Real(b)]);
        }
        dict
    }
}

/// Append `annot_id` to the page's `/Annots`, creating the array if needed.
///
/// `/Annots` may be stored inline or as a reference to an array object; both
/// are handled.
pub fn append_annotation(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> Result<()> {
    let annots_ref = {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| Error::MalformedDocument(format!("page object: {}", e)))?;
        match page.get(b"Annots") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };

    if let Some(array_id) = annots_ref {
        if let Ok(Object::Array(arr)) = doc.get_object_mut(array_id) {
            arr.push(Object::Reference(annot_id));
            return Ok(());
        }
        log::warn!("Page /Annots reference {:?} is not an array, replacing it", array_id);
    }

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::MalformedDocument(format!("page object: {}", e)))?;
    match page.get_mut(b"Annots") {
        Ok(Object::Array(arr)) => arr.push(Object::Reference(annot_id)),
        _ => page.set("Annots", vec![Object::Reference(annot_id)]),
    }
    Ok(())
}
