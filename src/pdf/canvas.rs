// src/pdf/canvas.rs
//! Minimal single-page PDF drawing surface on top of `lopdf`.
//!
//! Coordinates are PDF points with a bottom-left origin. Only the standard
//! Type1 fonts are used, so nothing has to be embedded and output is fully
//! deterministic: the same drawing calls always serialize to the same bytes.

use image::{GrayImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeSet;

/// US Letter, portrait.
pub const LETTER: (f32, f32) = (612.0, 792.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    Courier,
}

impl StandardFont {
    fn resource_name(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "F1",
            StandardFont::HelveticaBold => "F2",
            StandardFont::HelveticaOblique => "F3",
            StandardFont::Courier => "F4",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::Courier => "Courier",
        }
    }

    /// Upper bound on the advance width of `text` in points.
    ///
    /// Courier is exact (600 units per glyph). The Helvetica faces use glyph
    /// classes whose width is at least that of the widest regular or bold
    /// glyph in the class, so the estimate never falls short.
    pub fn text_width(self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|c| match self {
                StandardFont::Courier => 600,
                _ => helvetica_units(c),
            })
            .sum();
        units as f32 * size / 1000.0
    }
}

fn helvetica_units(c: char) -> u32 {
    match c {
        ' ' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' | 'i' | 'j' | 'l' => 340,
        'f' | 't' | 'r' | 'I' | '-' | '(' | ')' | '/' | '[' | ']' | '*' => 400,
        '"' => 480,
        'm' | 'M' | 'W' | '@' | '%' => 1020,
        'w' | 'A'..='Z' | '&' => 780,
        'a'..='z' | '0'..='9' | '#' | '$' | '+' | '=' | '?' | '_' | '~' | '<' | '>' | '^' => 620,
        // Accented and other Latin-1 glyphs: bounded by the widest (Æ, 1000).
        _ => 1020,
    }
}

/// Text for the standard fonts' single-byte encoding; characters outside
/// Latin-1 become `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
pub const BLUE: Rgb = Rgb(0.0, 0.0, 1.0);

struct ImageResource {
    width: u32,
    height: u32,
    color_space: &'static str,
    pixels: Vec<u8>,
    alpha: Option<Vec<u8>>,
    interpolate: bool,
}

/// Accumulates drawing operations for one page, then serializes a complete
/// document.
pub struct PageCanvas {
    width: f32,
    height: f32,
    title: Option<String>,
    operations: Vec<Operation>,
    fonts: BTreeSet<StandardFont>,
    images: Vec<(String, ImageResource)>,
}

impl PageCanvas {
    pub fn new((width, height): (f32, f32)) -> Self {
        PageCanvas {
            width,
            height,
            title: None,
            operations: Vec::new(),
            fonts: BTreeSet::new(),
            images: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, line_width: f32, color: Rgb) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![line_width.into()]),
            Operation::new("RG", vec![color.0.into(), color.1.into(), color.2.into()]),
            Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), line_width: f32) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![line_width.into()]),
            Operation::new("m", vec![from.0.into(), from.1.into()]),
            Operation::new("l", vec![to.0.into(), to.1.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    pub fn text(&mut self, font: StandardFont, size: f32, color: Rgb, x: f32, y: f32, text: &str) {
        self.fonts.insert(font);
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.resource_name().as_bytes().to_vec()), size.into()],
            ),
            Operation::new("rg", vec![color.0.into(), color.1.into(), color.2.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::String(encode_text(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Draws `text` centred on the page at baseline `y`, shrinking the font
    /// (not below `min_size`) until it fits within `max_width`. Text that is
    /// still too wide at `min_size` is cut short and ends in `...`.
    ///
    /// Returns the left edge and the size actually used.
    pub fn centred_text(
        &mut self,
        font: StandardFont,
        size: f32,
        min_size: f32,
        max_width: f32,
        color: Rgb,
        y: f32,
        text: &str,
    ) -> (f32, f32) {
        let (text, size) = fit_text(font, text, size, min_size, max_width);
        let x = (self.width - font.text_width(&text, size)) / 2.0;
        self.text(font, size, color, x, y, &text);
        (x, size)
    }

    /// Places a grayscale raster (e.g. a QR code) without smoothing.
    pub fn gray_image(&mut self, image: &GrayImage, x: f32, y: f32, w: f32, h: f32) {
        let resource = ImageResource {
            width: image.width(),
            height: image.height(),
            color_space: "DeviceGray",
            pixels: image.as_raw().clone(),
            alpha: None,
            interpolate: false,
        };
        self.place_image(resource, x, y, w, h);
    }

    /// Places a colour image; transparent areas are preserved through a soft
    /// mask.
    pub fn rgba_image(&mut self, image: &RgbaImage, x: f32, y: f32, w: f32, h: f32) {
        let mut pixels = Vec::with_capacity((image.width() * image.height() * 3) as usize);
        let mut alpha = Vec::with_capacity((image.width() * image.height()) as usize);
        for px in image.pixels() {
            pixels.extend_from_slice(&px.0[..3]);
            alpha.push(px.0[3]);
        }
        let opaque = alpha.iter().all(|a| *a == u8::MAX);
        let resource = ImageResource {
            width: image.width(),
            height: image.height(),
            color_space: "DeviceRGB",
            pixels,
            alpha: (!opaque).then_some(alpha),
            interpolate: true,
        };
        self.place_image(resource, x, y, w, h);
    }

    fn place_image(&mut self, resource: ImageResource, x: f32, y: f32, w: f32, h: f32) {
        let name = format!("Im{}", self.images.len() + 1);
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.images.push((name, resource));
    }

    /// Serializes the page as a standalone one-page document.
    pub fn finish(self) -> Result<Vec<u8>, lopdf::Error> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut font_dict = lopdf::Dictionary::new();
        for font in &self.fonts {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            font_dict.set(font.resource_name(), Object::Reference(font_id));
        }

        let mut xobject_dict = lopdf::Dictionary::new();
        for (name, resource) in self.images {
            let image_id = add_image(&mut doc, resource);
            xobject_dict.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        }

        let mut resources = lopdf::Dictionary::new();
        if !font_dict.is_empty() {
            resources.set("Font", Object::Dictionary(font_dict));
        }
        if !xobject_dict.is_empty() {
            resources.set("XObject", Object::Dictionary(xobject_dict));
        }
        let resources_id = doc.add_object(resources);

        let content = Content {
            operations: self.operations,
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), self.width.into(), self.height.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(title) = self.title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::String(encode_text(&title), StringFormat::Literal),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(lopdf::Error::from)?;
        Ok(bytes)
    }
}

fn add_image(doc: &mut Document, resource: ImageResource) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(resource.width),
        "Height" => i64::from(resource.height),
        "ColorSpace" => resource.color_space,
        "BitsPerComponent" => 8,
        "Interpolate" => resource.interpolate,
    };
    if let Some(alpha) = resource.alpha {
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(resource.width),
                "Height" => i64::from(resource.height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        dict.set("SMask", Object::Reference(mask_id));
    }
    doc.add_object(Stream::new(dict, resource.pixels))
}

const ELLIPSIS: &str = "...";

/// Text and font size that fit within `max_width`.
fn fit_text(font: StandardFont, text: &str, size: f32, min_size: f32, max_width: f32) -> (String, f32) {
    let width = font.text_width(text, size);
    if width <= max_width || width == 0.0 {
        return (text.to_string(), size);
    }
    let scaled = size * max_width / width;
    if scaled >= min_size {
        return (text.to_string(), scaled);
    }

    let budget = max_width - font.text_width(ELLIPSIS, min_size);
    if budget < 0.0 {
        return (String::new(), min_size);
    }
    let mut kept = String::new();
    let mut used = 0.0;
    for c in text.chars() {
        let advance = font.text_width(c.encode_utf8(&mut [0u8; 4]), min_size);
        if used + advance > budget {
            break;
        }
        used += advance;
        kept.push(c);
    }
    (format!("{}{}", kept.trim_end(), ELLIPSIS), min_size)
}
