//! QR stamping of page 1.
//!
//! A stamp is three things added to the first page of an existing document:
//!
//! - the QR raster, drawn as an image XObject at the mapped coordinate
//! - two lines of Helvetica text (a caption and the display form of the URL)
//! - a URI link annotation covering the text
//!
//! The page's existing content is wrapped in `q`/`Q` so a graphics state it
//! leaves behind cannot move or recolor the stamp.
//!
//! ```ignore
//! use qr_stamp::writer::{DocumentStamper, StampRequest};
//! use qr_stamp::encryption::NoPrompt;
//!
//! let request = StampRequest::new(qr_png, "https://portal.example?v=AB12CD", coordinate);
//! let stamped = DocumentStamper::default().stamp(&pdf_bytes, &request, &mut NoPrompt)?;
//! ```

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::annotation_builder::{append_annotation, LinkAnnotation};
use super::content_stream::ContentStreamBuilder;
use super::image_handler::ImageData;
use crate::config::StampConfig;
use crate::encryption::{unlock, PasswordPrompt};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::mapper::PdfStampCoordinate;
use crate::portal::links::display_url;

/// Page size assumed when neither the page nor its ancestors carry a `/MediaBox`.
const DEFAULT_PAGE_BOX: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 595.0,
    height: 842.0,
};

/// Everything needed to stamp one document.
#[derive(Debug, Clone)]
pub struct StampRequest {
    /// PNG or JPEG bytes of the QR code
    pub qr_image: Vec<u8>,
    /// URL the link annotation opens
    pub target_url: String,
    /// Lower-left corner of the stamp on page 1
    pub coordinate: PdfStampCoordinate,
}

impl StampRequest {
    /// Create a request.
    pub fn new(qr_image: Vec<u8>, target_url: impl Into<String>, coordinate: PdfStampCoordinate) -> Self {
        Self {
            qr_image,
            target_url: target_url.into(),
            coordinate,
        }
    }
}

/// Which side of the stamp the label is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPlacement {
    /// Above the image, for stamps near the bottom edge
    Above,
    /// Below the image
    Below,
}

/// Where the label lines and the clickable region go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelLayout {
    /// Side of the stamp the text is on
    pub placement: LabelPlacement,
    /// Baseline of the caption line
    pub caption_y: f32,
    /// Baseline of the URL line
    pub url_y: f32,
    /// Link annotation rectangle, clipped to the page
    pub link_rect: Rect,
}

impl LabelLayout {
    /// Lay out the label for a stamp at `coordinate` on a page with `page_box`.
    ///
    /// `coordinate` is measured from the box's lower-left corner; the layout
    /// is in user space, so it is shifted by the box origin.
    pub fn compute(config: &StampConfig, coordinate: &PdfStampCoordinate, page_box: &Rect) -> Self {
        let size = config.stamp_size;
        let (x, y) = (page_box.x + coordinate.x, page_box.y + coordinate.y);

        let placement = if coordinate.y <= config.label_threshold {
            LabelPlacement::Above
        } else {
            LabelPlacement::Below
        };
        let (caption_y, url_y) = match placement {
            LabelPlacement::Above => (y + size + 5.0, y + size + 18.0),
            LabelPlacement::Below => (y - 14.0, y - 24.0),
        };

        let link_rect = Rect::from_points(
            x,
            caption_y.min(url_y) - 2.0,
            x + config.link_width,
            caption_y.max(url_y) + 12.0,
        )
        .clip_to(page_box);

        Self {
            placement,
            caption_y,
            url_y,
            link_rect,
        }
    }
}

/// Result of stamping a loaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct StampPlacement {
    /// Page that received the stamp
    pub page_id: ObjectId,
    /// Page box the stamp was laid out against
    pub page_box: Rect,
    /// Square occupied by the QR image
    pub image_rect: Rect,
    /// Label layout and link rectangle
    pub label: LabelLayout,
    /// The link annotation object
    pub annotation_id: ObjectId,
}

/// Adds the QR stamp to documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentStamper {
    config: StampConfig,
}

impl DocumentStamper {
    /// Create a stamper with the given layout.
    pub fn new(config: StampConfig) -> Self {
        Self { config }
    }

    /// Stamp layout in use.
    pub fn config(&self) -> &StampConfig {
        &self.config
    }

    /// Stamp `source` and return the new document bytes.
    ///
    /// Encrypted sources are opened with the empty password first, then with
    /// one password from `prompt`. Nothing is returned unless every step,
    /// including serialization, succeeds.
    pub fn stamp(
        &self,
        source: &[u8],
        request: &StampRequest,
        prompt: &mut dyn PasswordPrompt,
    ) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(source).map_err(|e| Error::MalformedDocument(e.to_string()))?;
        unlock(&mut doc, prompt)?;

        let placement = self.stamp_document(&mut doc, request)?;
        log::info!(
            "Stamped page {:?} at ({:.1}, {:.1}), label {:?}",
            placement.page_id,
            placement.image_rect.x,
            placement.image_rect.y,
            placement.label.placement
        );

        let mut out = Vec::new();
        doc.save_to(&mut out).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(out)
    }

    /// Stamp page 1 of an already opened, decrypted document in place.
    pub fn stamp_document(&self, doc: &mut Document, request: &StampRequest) -> Result<StampPlacement> {
        let page_id = first_page(doc)?;
        let page_box = page_box(doc, page_id);
        let rotation = page_rotation(doc, page_id);
        if rotation != 0 {
            log::warn!(
                "Page {:?} is rotated by {} degrees; the stamp is placed in unrotated page space",
                page_id,
                rotation
            );
        }
        if page_box.x != 0.0 || page_box.y != 0.0 {
            log::debug!("Offsetting stamp by page box origin ({}, {})", page_box.x, page_box.y);
        }

        let size = self.config.stamp_size;
        let image_rect = Rect::new(
            page_box.x + request.coordinate.x,
            page_box.y + request.coordinate.y,
            size,
            size,
        );
        let label = LabelLayout::compute(&self.config, &request.coordinate, &page_box);

        let image = ImageData::from_bytes(&request.qr_image)?;
        let image_id = image.add_to_document(doc);
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut resources = own_resources(doc, page_id)?;
        let image_name = unused_name(sub_dict_mut(&mut resources, b"XObject")?, "QrIm");
        sub_dict_mut(&mut resources, b"XObject")?.set(image_name.as_bytes().to_vec(), image_id);
        let font_name = unused_name(sub_dict_mut(&mut resources, b"Font")?, "QrF");
        sub_dict_mut(&mut resources, b"Font")?.set(font_name.as_bytes().to_vec(), font_id);

        let existing = content_refs(doc, page_id)?;
        let wrap = !existing.is_empty();

        let mut builder = ContentStreamBuilder::new();
        if wrap {
            builder.restore_state();
        }
        builder.draw_image(&image_name, image_rect.x, image_rect.y, size, size);
        builder
            .begin_text()
            .fill_gray(self.config.caption_gray)
            .set_font(&font_name, self.config.caption_font_size)
            .text(&self.config.caption, image_rect.x, label.caption_y);
        let [r, g, b] = self.config.url_color;
        builder
            .fill_rgb(r, g, b)
            .set_font(&font_name, self.config.url_font_size)
            .text(&display_url(&request.target_url), image_rect.x, label.url_y)
            .end_text();
        let stamp_id = doc.add_object(Stream::new(dictionary! {}, builder.build()?));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        if wrap {
            let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            contents.push(Object::Reference(open_id));
            contents.extend(existing);
        }
        contents.push(Object::Reference(stamp_id));

        {
            let page = page_dict_mut(doc, page_id)?;
            page.set("Resources", resources);
            page.set("Contents", contents);
        }

        let link = LinkAnnotation::uri(label.link_rect, request.target_url.clone());
        let annotation_id = doc.add_object(link.to_dictionary());
        append_annotation(doc, page_id, annotation_id)?;

        Ok(StampPlacement {
            page_id,
            page_box,
            image_rect,
            label,
            annotation_id,
        })
    }
}

/// Native page box of page 1, for sizing the editor's render.
pub fn first_page_box(source: &[u8], prompt: &mut dyn PasswordPrompt) -> Result<Rect> {
    let mut doc = Document::load_mem(source).map_err(|e| Error::MalformedDocument(e.to_string()))?;
    unlock(&mut doc, prompt)?;
    let page_id = first_page(&doc)?;
    Ok(page_box(&doc, page_id))
}

fn first_page(doc: &Document) -> Result<ObjectId> {
    doc.get_pages().into_values().next().ok_or(Error::NoPages)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::MalformedDocument(format!("page object: {}", e)))
}

/// Follow `/Parent` links until `key` is found.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        // Guards against /Parent cycles.
        if depth > 64 {
            return None;
        }
        depth += 1;
        let dict = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// The page's `/MediaBox`, inherited if necessary.
pub fn page_box(doc: &Document, page_id: ObjectId) -> Rect {
    let parsed = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| {
            let v: Vec<f32> = arr.iter().map(|o| number(resolve(doc, o))).collect::<Option<_>>()?;
            Some(Rect::from_points(v[0], v[1], v[2], v[3]))
        })
        .filter(|rect| rect.width > 0.0 && rect.height > 0.0);

    parsed.unwrap_or_else(|| {
        log::warn!("Page {:?} has no usable /MediaBox, assuming A4", page_id);
        DEFAULT_PAGE_BOX
    })
}

/// The page's `/Rotate`, inherited if necessary, normalized to 0..360.
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(|deg| deg.rem_euclid(360))
        .unwrap_or(0)
}

/// Build a resource dictionary owned by the page.
///
/// Inherited or shared resources are copied, and `/XObject` and `/Font`
/// references are resolved, so adding entries never affects other pages.
fn own_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(_) => return Err(Error::MalformedDocument("/Resources is not a dictionary".to_string())),
        None => Dictionary::new(),
    };

    for key in [&b"XObject"[..], &b"Font"[..]] {
        let resolved = match resources.get(key) {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Dictionary(dict)) => Some(dict.clone()),
                _ => {
                    log::warn!(
                        "Resource /{} does not resolve to a dictionary, replacing it",
                        String::from_utf8_lossy(key)
                    );
                    Some(Dictionary::new())
                },
            },
            _ => None,
        };
        if let Some(dict) = resolved {
            resources.set(key.to_vec(), dict);
        }
    }
    Ok(resources)
}

/// Get a sub-dictionary of `resources`, creating it if absent.
fn sub_dict_mut<'a>(resources: &'a mut Dictionary, key: &[u8]) -> Result<&'a mut Dictionary> {
    if !matches!(resources.get(key), Ok(Object::Dictionary(_))) {
        resources.set(key.to_vec(), Dictionary::new());
    }
    resources
        .get_mut(key)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::MalformedDocument(format!("resources: {}", e)))
}

fn unused_name(dict: &Dictionary, prefix: &str) -> String {
    (1..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|name| dict.get(name.as_bytes()).is_err())
        .unwrap_or_else(|| prefix.to_string())
}

/// References to the page's content streams, in drawing order.
fn content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| Error::MalformedDocument(format!("page object: {}", e)))?;

    match page.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => Ok(arr.clone()),
            Ok(Object::Stream(_)) => Ok(vec![Object::Reference(*id)]),
            _ => Err(Error::MalformedDocument("/Contents does not resolve to a stream".to_string())),
        },
        Ok(Object::Array(arr)) => Ok(arr.clone()),
        Ok(_) => Err(Error::MalformedDocument("/Contents has an unexpected type".to_string())),
    }
}
