// src/pdf/qr.rs
//! Verification links and their QR rasters.
//!
//! Rasterization happens entirely in memory: the QR matrix becomes an 8-bit
//! grayscale image with one pixel per module, which the PDF writers embed
//! as an image XObject and scale up with interpolation disabled.

use crate::error::QrError;
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use url::Url;

/// Light modules surrounding the symbol on every side.
pub const QUIET_ZONE: u32 = 4;

/// Builds `<frontend-base>/verify-certificate?reg_number=<reg>&cid=<cid>`.
pub fn verification_url(frontend_base: &str, reg_number: &str, cid: &str) -> Result<String, QrError> {
    let endpoint = format!("{}/verify-certificate", frontend_base.trim_end_matches('/'));
    let url = Url::parse_with_params(&endpoint, &[("reg_number", reg_number), ("cid", cid)])?;
    Ok(url.into())
}

/// Identifier printed next to a QR code for the given verification URL.
///
/// Uses the `cid` query parameter when present, otherwise the trailing path
/// segment (gateway style URLs such as `https://gw/ipfs/<cid>`).
pub fn display_identifier(verification_url: &str) -> String {
    if let Ok(url) = Url::parse(verification_url) {
        if let Some((_, cid)) = url.query_pairs().find(|(key, _)| key == "cid") {
            return cid.into_owned();
        }
        if let Some(segment) = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return segment.to_string();
        }
    }
    verification_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Encodes `payload` into a QR raster (dark modules black, quiet zone white).
pub fn encode(payload: &str) -> Result<GrayImage, QrError> {
    let code = QrCode::new(payload.as_bytes())?;
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let size = modules + 2 * QUIET_ZONE;

    Ok(GrayImage::from_fn(size, size, |x, y| {
        let inside = (QUIET_ZONE..QUIET_ZONE + modules).contains(&x)
            && (QUIET_ZONE..QUIET_ZONE + modules).contains(&y);
        if !inside {
            return Luma([255u8]);
        }
        let index = ((y - QUIET_ZONE) * modules + (x - QUIET_ZONE)) as usize;
        match colors[index] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    }))
}
