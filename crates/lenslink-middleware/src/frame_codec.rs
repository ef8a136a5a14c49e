//! Outbound frame framing.
//!
//! Two framings are supported for the same compressed image bytes:
//!
//! | [`PayloadEncoding`] | Wire message |
//! |---|---|
//! | `Binary` | binary message carrying the raw bytes |
//! | `TextBase64` | text message `"RGB:" + base64(bytes)` |

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use lenslink_types::{LinkError, PayloadEncoding};

use crate::channel::OutboundMessage;

/// ASCII tag prefixed to text-framed frames.
pub const TEXT_FRAME_TAG: &str = "RGB:";

/// Wrap compressed image bytes for the wire.
pub fn frame_message(image: Vec<u8>, encoding: PayloadEncoding) -> OutboundMessage {
    match encoding {
        PayloadEncoding::Binary => OutboundMessage::Binary(image),
        PayloadEncoding::TextBase64 => {
            let mut text = String::with_capacity(TEXT_FRAME_TAG.len() + image.len().div_ceil(3) * 4);
            text.push_str(TEXT_FRAME_TAG);
            BASE64.encode_string(&image, &mut text);
            OutboundMessage::Text(text)
        }
    }
}

/// Recover the image bytes from a text-framed frame.
///
/// # Errors
///
/// Returns [`LinkError::DecodeFailure`] if the tag is missing or the body
/// is not valid base64.
pub fn decode_text_frame(text: &str) -> Result<Vec<u8>, LinkError> {
    let body = text
        .strip_prefix(TEXT_FRAME_TAG)
        .ok_or_else(|| LinkError::DecodeFailure(format!("missing {TEXT_FRAME_TAG} tag")))?;
    BASE64
        .decode(body)
        .map_err(|e| LinkError::DecodeFailure(format!("invalid base64 frame body: {e}")))
}
