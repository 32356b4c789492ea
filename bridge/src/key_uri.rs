//! Key URIs: a textual form of an enclave key representation, `<prefix><base64url(representation)>`.
//!
//! A key URI is exactly as sensitive as the representation it wraps.
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::result::Error;

/// Encode a key representation as a key URI.
pub fn encode(prefix: &str, representation: &[u8]) -> Zeroizing<String> {
    let mut uri = Zeroizing::new(String::with_capacity(prefix.len() + representation.len() * 4 / 3 + 4));
    uri.push_str(prefix);
    URL_SAFE_NO_PAD.encode_string(representation, &mut uri);
    uri
}

/// Decode a key URI back into the key representation it wraps.
/// Fails with `Error::InvalidKeyEncoding` if the prefix does not match or the payload is not
/// unpadded URL-safe base64.
pub fn decode(prefix: &str, uri: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let payload = uri.strip_prefix(prefix).ok_or(Error::InvalidKeyEncoding)?;
    // Sized up front so decoding never reallocates and leaves key bytes behind in a freed buffer.
    let mut representation = Zeroizing::new(Vec::with_capacity(base64::decoded_len_estimate(payload.len())));
    URL_SAFE_NO_PAD
        .decode_vec(payload, &mut representation)
        .map_err(|_| Error::InvalidKeyEncoding)?;
    Ok(representation)
}
