//! PDF content stream builder.
//!
//! Builds the small content streams the stamp needs: graphics state
//! save/restore, an image placement, and Base-14 text. Operators follow
//! ISO 32000-1:2008 Sections 8-9.

use std::io::Write;

use crate::error::Result;

/// Operations that can be added to a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentStreamOp {
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Set transformation matrix (cm)
    Transform(f32, f32, f32, f32, f32, f32),
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Set font resource and size (Tf)
    SetFont(String, f32),
    /// Set text matrix (Tm)
    SetTextMatrix(f32, f32, f32, f32, f32, f32),
    /// Show text (Tj), already encoded for the font
    ShowText(Vec<u8>),
    /// Set fill color RGB (rg)
    SetFillColorRGB(f32, f32, f32),
    /// Set fill color gray (g)
    SetFillColorGray(f32),
    /// Paint XObject (Do)
    PaintXObject(String),
}

/// Builder for content streams.
#[derive(Debug, Default)]
pub struct ContentStreamBuilder {
    operations: Vec<ContentStreamOp>,
    current_font: Option<(String, f32)>,
    in_text_object: bool,
}

impl ContentStreamBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw operation.
    pub fn op(&mut self, op: ContentStreamOp) -> &mut Self {
        self.operations.push(op);
        self
    }

    /// Operations added so far.
    pub fn operations(&self) -> &[ContentStreamOp] {
        &self.operations
    }

    /// Save graphics state.
    pub fn save_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::SaveState)
    }

    /// Restore graphics state.
    pub fn restore_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::RestoreState)
    }

    /// Begin a text object.
    pub fn begin_text(&mut self) -> &mut Self {
        if !self.in_text_object {
            self.op(ContentStreamOp::BeginText);
            self.in_text_object = true;
        }
        self
    }

    /// End a text object.
    pub fn end_text(&mut self) -> &mut Self {
        if self.in_text_object {
            self.op(ContentStreamOp::EndText);
            self.in_text_object = false;
            self.current_font = None;
        }
        self
    }

    /// Select a font resource. Repeated selections of the same font are elided.
    pub fn set_font(&mut self, resource: &str, size: f32) -> &mut Self {
        let wanted = (resource.to_string(), size);
        if self.current_font.as_ref() != Some(&wanted) {
            self.op(ContentStreamOp::SetFont(wanted.0.clone(), size));
            self.current_font = Some(wanted);
        }
        self
    }

    /// Set the fill color.
    pub fn fill_rgb(&mut self, r: f32, g: f32, b: f32) -> &mut Self {
        self.op(ContentStreamOp::SetFillColorRGB(r, g, b))
    }

    /// Set the fill gray level.
    pub fn fill_gray(&mut self, gray: f32) -> &mut Self {
        self.op(ContentStreamOp::SetFillColorGray(gray))
    }

    /// Show `text` with its baseline starting at (x, y).
    ///
    /// The text is encoded with [`encode_win_ansi`], matching Base-14 fonts
    /// declared with `/WinAnsiEncoding`.
    pub fn text(&mut self, text: &str, x: f32, y: f32) -> &mut Self {
        self.begin_text();
        self.op(ContentStreamOp::SetTextMatrix(1.0, 0.0, 0.0, 1.0, x, y));
        self.op(ContentStreamOp::ShowText(encode_win_ansi(text)))
    }

    /// Paint an image XObject into the rectangle at (x, y) with the given size.
    pub fn draw_image(&mut self, resource: &str, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        self.save_state();
        self.op(ContentStreamOp::Transform(width, 0.0, 0.0, height, x, y));
        self.op(ContentStreamOp::PaintXObject(resource.to_string()));
        self.restore_state()
    }

    /// Serialize the operations.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for op in &self.operations {
            write_op(&mut buf, op)?;
            writeln!(buf)?;
        }
        Ok(buf)
    }
}

fn write_op<W: Write>(w: &mut W, op: &ContentStreamOp) -> std::io::Result<()> {
    match op {
        ContentStreamOp::SaveState => write!(w, "q"),
        ContentStreamOp::RestoreState => write!(w, "Q"),
        ContentStreamOp::Transform(a, b, c, d, e, f) => {
            write!(w, "{} {} {} {} {} {} cm", num(*a), num(*b), num(*c), num(*d), num(*e), num(*f))
        },
        ContentStreamOp::BeginText => write!(w, "BT"),
        ContentStreamOp::EndText => write!(w, "ET"),
        ContentStreamOp::SetFont(name, size) => write!(w, "/{} {} Tf", name, num(*size)),
        ContentStreamOp::SetTextMatrix(a, b, c, d, e, f) => {
            write!(w, "{} {} {} {} {} {} Tm", num(*a), num(*b), num(*c), num(*d), num(*e), num(*f))
        },
        ContentStreamOp::ShowText(bytes) => {
            write!(w, "(")?;
            write_escaped_string(w, bytes)?;
            write!(w, ") Tj")
        },
        ContentStreamOp::SetFillColorRGB(r, g, b) => write!(w, "{} {} {} rg", num(*r), num(*g), num(*b)),
        ContentStreamOp::SetFillColorGray(g) => write!(w, "{} g", num(*g)),
        ContentStreamOp::PaintXObject(name) => write!(w, "/{} Do", name),
    }
}

/// Format a number the way PDF expects: no exponent, at most 4 decimals.
fn num(v: f32) -> String {
    let v = if v.is_finite() { v } else { 0.0 };
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn write_escaped_string<W: Write>(w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    for &byte in bytes {
        match byte {
            b'(' => write!(w, "\\(")?,
            b')' => write!(w, "\\)")?,
            b'\\' => write!(w, "\\\\")?,
            b'\n' => write!(w, "\\n")?,
            b'\r' => write!(w, "\\r")?,
            b'\t' => write!(w, "\\t")?,
            _ => w.write_all(&[byte])?,
        }
    }
    Ok(())
}

/// Encode text for a font using `/WinAnsiEncoding`.
///
/// Latin-1 characters map to themselves; the handful of WinAnsi extras in
/// 0x80-0x9F are mapped; anything else becomes `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => c as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_text() {
        let mut builder = ContentStreamBuilder::new();
        builder
            .set_font("F1", 8.0)
            .text("Hello (World)", 72.0, 720.5)
            .end_text();

        let content = String::from_utf8(builder.build().unwrap()).unwrap();
        assert!(content.contains("BT"));
        assert!(content.contains("/F1 8 Tf"));
        assert!(content.contains("1 0 0 1 72 720.5 Tm"));
        assert!(content.contains("(Hello \\(World\\)) Tj"));
        assert!(content.contains("ET"));
    }

    #[test]
    fn test_draw_image() {
        let mut builder = ContentStreamBuilder::new();
        builder.draw_image("Im1", 279.25, 40.0, 80.0, 80.0);
        let content = String::from_utf8(builder.build().unwrap()).unwrap();
        assert_eq!(content, "q\n80 0 0 80 279.25 40 cm\n/Im1 Do\nQ\n");
    }

    #[test]
    fn test_font_selection_elided() {
        let mut builder = ContentStreamBuilder::new();
        builder.set_font("F1", 8.0).set_font("F1", 8.0).set_font("F1", 7.0);
        let fonts = builder
            .operations()
            .iter()
            .filter(|op| matches!(op, ContentStreamOp::SetFont(..)))
            .count();
        assert_eq!(fonts, 2);
    }

    #[test]
    fn test_number_format() {
        assert_eq!(num(1.0), "1");
        assert_eq!(num(0.3), "0.3");
        assert_eq!(num(-0.00001), "0");
        assert_eq!(num(f32::NAN), "0");
        assert_eq!(num(-12.5), "-12.5");
    }

    #[test]
    fn test_win_ansi() {
        assert_eq!(encode_win_ansi("vídeo"), vec![b'v', 0xED, b'd', b'e', b'o']);
        assert_eq!(encode_win_ansi("a\u{2014}b"), vec![b'a', 0x97, b'b']);
        assert_eq!(encode_win_ansi("日"), vec![b'?']);
    }
}
