// src/pdf/overlay.rs
//! QR overlays for already issued certificates.
//!
//! An overlay is a throwaway one-page PDF holding a verification QR code.
//! Merging imports the overlay's first page into the target document as a
//! Form XObject and paints it over the target's first page. Every other page
//! object, and every content stream the first page already had, is carried
//! over untouched.

use crate::error::MergeError;
use crate::models::certificate::MetadataCid;
use crate::pdf::canvas::{PageCanvas, StandardFont, BLACK, LETTER};
use crate::pdf::qr;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

const QR_ORIGIN: (f32, f32) = (450.0, 50.0);
const QR_SIZE: f32 = 100.0;
const CAPTION_SIZE: f32 = 6.0;
/// Limit when walking `/Parent` links for inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

/// Single-page PDF to be composited onto an existing certificate.
#[derive(Debug, Clone)]
pub struct OverlayDocument {
    bytes: Vec<u8>,
}

impl OverlayDocument {
    /// Wraps an existing PDF. Only its first page is ever used.
    #[cfg(test)]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        OverlayDocument { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Builds the overlay page: a QR code linking to the verification page for
/// `(reg_number, cid)` in the bottom-right corner, captioned with the CID.
pub fn create_overlay(
    frontend_base: &str,
    cid: &MetadataCid,
    reg_number: &str,
) -> Result<OverlayDocument, MergeError> {
    let link = qr::verification_url(frontend_base, reg_number, cid.as_str())?;
    let raster = qr::encode(&link)?;

    let mut canvas = PageCanvas::new(LETTER);
    canvas.gray_image(&raster, QR_ORIGIN.0, QR_ORIGIN.1, QR_SIZE, QR_SIZE);

    let caption = format!("CID: {}", cid);
    let caption_width = StandardFont::Courier.text_width(&caption, CAPTION_SIZE);
    canvas.text(
        StandardFont::Courier,
        CAPTION_SIZE,
        BLACK,
        QR_ORIGIN.0 + QR_SIZE - caption_width,
        QR_ORIGIN.1 + QR_SIZE + 4.0,
        &caption,
    );

    Ok(OverlayDocument {
        bytes: canvas.finish()?,
    })
}

/// Paints the overlay's first page on top of the first page of `original`
/// and returns the new document. `original` itself is not modified.
///
/// # Errors
/// - `MergeError::NoPages` if either document has no pages
/// - `MergeError::Encrypted` if either document is encrypted
/// - `MergeError::Pdf` if either document cannot be parsed or written
pub fn merge_overlay(original: &[u8], overlay: &OverlayDocument) -> Result<Vec<u8>, MergeError> {
    let mut target = Document::load_mem(original)?;
    if target.is_encrypted() {
        return Err(MergeError::Encrypted("original"));
    }
    let first_page_id = *target
        .get_pages()
        .values()
        .next()
        .ok_or(MergeError::NoPages("original"))?;

    let mut source = Document::load_mem(overlay.as_bytes())?;
    if source.is_encrypted() {
        return Err(MergeError::Encrypted("overlay"));
    }
    source.renumber_objects_with(target.max_id + 1);
    let overlay_page_id = *source
        .get_pages()
        .values()
        .next()
        .ok_or(MergeError::NoPages("overlay"))?;
    target.max_id = target.max_id.max(source.max_id);
    target.objects.extend(source.objects);

    let form_id = import_page_as_form(&mut target, overlay_page_id)?;

    let mut resources = inherited_dictionary(&target, first_page_id, b"Resources")?;
    let mut xobjects = resolve_dictionary(&target, resources.get(b"XObject").ok());
    let form_name = unused_name(&xobjects);
    xobjects.set(form_name.as_bytes().to_vec(), Object::Reference(form_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    // Original drawing runs inside its own q/Q so a leftover transform or
    // colour cannot leak into the overlay.
    let mut contents = vec![Object::Reference(
        target.add_object(Stream::new(dictionary! {}, b"q\n".to_vec())),
    )];
    contents.extend(
        existing_contents(&target, first_page_id)?
            .into_iter()
            .map(Object::Reference),
    );
    let paint = format!("\nQ\nq /{} Do Q\n", form_name).into_bytes();
    contents.push(Object::Reference(
        target.add_object(Stream::new(dictionary! {}, paint)),
    ));

    let page = target
        .get_object_mut(first_page_id)
        .and_then(Object::as_dict_mut)?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));

    // Drops the overlay's own catalog and page tree.
    target.prune_objects();

    let mut out = Vec::new();
    target.save_to(&mut out).map_err(lopdf::Error::from)?;
    Ok(out)
}

fn import_page_as_form(doc: &mut Document, page_id: ObjectId) -> Result<ObjectId, MergeError> {
    let content = doc.get_page_content(page_id)?;
    let resources = inherited_dictionary(doc, page_id, b"Resources")?;
    let bbox = match inherited_attribute(doc, page_id, b"MediaBox")? {
        Some(Object::Array(values)) => values,
        _ => vec![0.into(), 0.into(), LETTER.0.into(), LETTER.1.into()],
    };

    let form = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => bbox,
            "Resources" => resources,
        },
        content,
    );
    Ok(doc.add_object(form))
}

/// Content stream ids of the page, in painting order. `/Contents` may be a
/// stream reference, an array of them, or a reference to such an array.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>, MergeError> {
    let page = doc.get_dictionary(page_id)?;
    let stream_refs = |items: &[Object]| -> Vec<ObjectId> {
        items.iter().filter_map(|o| o.as_reference().ok()).collect()
    };
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => stream_refs(items),
            _ => vec![*id],
        },
        Ok(Object::Array(items)) => stream_refs(items),
        _ => Vec::new(),
    })
}

/// Looks `key` up on the page, falling back to its ancestors in the page
/// tree (page attributes such as `/Resources` and `/MediaBox` are
/// inheritable).
fn inherited_attribute(
    doc: &Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<Object>, MergeError> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(node_id)?;
        if let Ok(value) = node.get(key) {
            let resolved = match value {
                Object::Reference(id) => doc.get_object(*id)?.clone(),
                other => other.clone(),
            };
            return Ok(Some(resolved));
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => break,
        }
    }
    Ok(None)
}

fn inherited_dictionary(doc: &Document, page_id: ObjectId, key: &[u8]) -> Result<Dictionary, MergeError> {
    Ok(match inherited_attribute(doc, page_id, key)? {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    })
}

fn resolve_dictionary(doc: &Document, object: Option<&Object>) -> Dictionary {
    match object {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

fn unused_name(xobjects: &Dictionary) -> String {
    (1..)
        .map(|n| format!("CertOverlay{}", n))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| "CertOverlay".to_string())
}
