use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::TokenError;

/// Encode bytes as an unpadded base64url token segment
///
/// # Arguments
///
/// * `bytes` - Raw segment data (JSON header, JSON claims or signature)
///
/// # Returns
///
/// The base64url encoded segment
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode an unpadded base64url token segment
///
/// # Arguments
///
/// * `segment` - A single segment of a compact token
///
/// # Returns
///
/// The raw segment bytes or `TokenError::MalformedToken` if decoding fails
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::malformed(format!("Failed to decode base64url segment: {}", e)))
}
