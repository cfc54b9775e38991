// src/pdf/renderer.rs
//! Certificate document renderer.
//!
//! Draws the fixed single-page certificate layout on US Letter. Positions are
//! absolute; centred lines that would overflow the frame are shrunk instead
//! of reflowed, down to a minimum size past which they are cut short.

use crate::error::RenderError;
use crate::models::certificate::{CertificateRequest, QrMode, RenderedCertificate, DUMMY_QR_PAYLOAD};
use crate::pdf::canvas::{PageCanvas, Rgb, StandardFont, BLACK, BLUE, LETTER};
use crate::pdf::qr;
use log::{debug, warn};

pub const TITLE: &str = "Certificate of Achievement";

/// Inset of the border frame from each page edge.
const FRAME_INSET: f32 = 30.0;
/// Horizontal room kept between centred text and the frame.
const TEXT_PADDING: f32 = 20.0;
const MIN_FONT_SIZE: f32 = 8.0;
const QR_SIZE: f32 = 100.0;
const LOGO_SIZE: f32 = 100.0;

/// Renders `request` as a single-page PDF.
///
/// The QR area depends on `mode`: a live verification link with the
/// identifier printed under the issuer line, a placeholder code, or nothing.
/// A logo that cannot be decoded is skipped with a warning.
///
/// # Errors
/// `RenderError::MissingField` if a required field is blank, or a QR/PDF
/// serialization error.
pub fn render_certificate(
    request: &CertificateRequest,
    mode: QrMode,
) -> Result<RenderedCertificate, RenderError> {
    validate(request)?;

    let mut canvas = PageCanvas::new(LETTER);
    let (width, height) = (canvas.width(), canvas.height());
    let max_text_width = width - 2.0 * (FRAME_INSET + TEXT_PADDING);

    canvas.set_title(TITLE);
    canvas.stroke_rect(
        FRAME_INSET,
        FRAME_INSET,
        width - 2.0 * FRAME_INSET,
        height - 2.0 * FRAME_INSET,
        4.0,
        BLACK,
    );

    let centred = |canvas: &mut PageCanvas,
                   font: StandardFont,
                   size: f32,
                   color: Rgb,
                   offset: f32,
                   text: &str| {
        canvas.centred_text(font, size, MIN_FONT_SIZE, max_text_width, color, height - offset, text);
    };
    centred(&mut canvas, StandardFont::HelveticaBold, 28.0, BLUE, 120.0, TITLE);
    centred(
        &mut canvas,
        StandardFont::Helvetica,
        16.0,
        BLACK,
        160.0,
        "This certificate is proudly presented to:",
    );
    centred(&mut canvas, StandardFont::HelveticaBold, 22.0, BLACK, 200.0, &request.full_name());
    centred(
        &mut canvas,
        StandardFont::Helvetica,
        18.0,
        BLACK,
        240.0,
        &format!("For successfully completing the course: {}", request.course.trim()),
    );
    centred(
        &mut canvas,
        StandardFont::HelveticaBold,
        18.0,
        BLUE,
        270.0,
        &format!("Degree Classification: {}", request.degree_class.trim()),
    );
    centred(
        &mut canvas,
        StandardFont::HelveticaOblique,
        16.0,
        BLACK,
        310.0,
        &format!("Issued by: {}", request.institution_name.trim()),
    );

    let qr_payload = match &mode {
        QrMode::Real(url) => {
            let identifier = qr::display_identifier(url);
            centred(
                &mut canvas,
                StandardFont::Courier,
                12.0,
                BLACK,
                340.0,
                &format!("ipfs-CID: {}", identifier),
            );
            Some(url.as_str())
        }
        QrMode::Dummy => Some(DUMMY_QR_PAYLOAD),
        QrMode::None => None,
    };
    if let Some(payload) = qr_payload {
        let raster = qr::encode(payload)?;
        canvas.gray_image(&raster, width - 180.0, 50.0, QR_SIZE, QR_SIZE);
    }

    canvas.text(
        StandardFont::Helvetica,
        12.0,
        BLACK,
        100.0,
        130.0,
        &format!("Date Issued: {}", request.date_issued),
    );
    canvas.line((100.0, 100.0), (300.0, 100.0), 1.0);
    canvas.text(StandardFont::Helvetica, 12.0, BLACK, 150.0, 80.0, "Authorized Signature");

    if let Some(logo) = &request.institution_logo {
        match image::load_from_memory(logo) {
            Ok(decoded) => canvas.rgba_image(
                &decoded.to_rgba8(),
                50.0,
                height - 150.0,
                LOGO_SIZE,
                LOGO_SIZE,
            ),
            Err(e) => warn!(
                "Skipping logo for {}: cannot decode image ({})",
                request.institution_name, e
            ),
        }
    }

    let bytes = canvas.finish()?;
    debug!(
        "Rendered certificate for {} ({} bytes, qr mode {})",
        request.reg_number,
        bytes.len(),
        mode.name()
    );
    Ok(RenderedCertificate { bytes, mode })
}

fn validate(request: &CertificateRequest) -> Result<(), RenderError> {
    let fields = [
        ("student_name", &request.student_name),
        ("student_surname", &request.student_surname),
        ("reg_number", &request.reg_number),
        ("course", &request.course),
        ("degree_class", &request.degree_class),
        ("institution_name", &request.institution_name),
        ("date_issued", &request.date_issued),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(RenderError::MissingField(name));
        }
    }
    Ok(())
}
