//! HTTP header conversion for the handshake response

use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Header;

use crate::error::Result;

/// Limit for the number of header lines
pub const MAX_HEADERS: usize = 124;

/// Conversion from borrowed `httparse` output into owned `http` types.
pub(crate) trait FromHttparse<T>: Sized {
    fn from_httparse(raw: T) -> Result<Self>;
}

impl<'b: 'h, 'h> FromHttparse<&'b [Header<'h>]> for HeaderMap {
    fn from_httparse(raw: &'b [Header<'h>]) -> Result<Self> {
        let mut headers = HeaderMap::with_capacity(raw.len());

        for h in raw {
            headers.append(HeaderName::from_bytes(h.name.as_bytes())?, HeaderValue::from_bytes(h.value)?);
        }

        Ok(headers)
    }
}

/// `true` if a comma separated header value lists `token`, ignoring case.
pub(crate) fn has_token(value: Option<&HeaderValue>, token: &str) -> bool {
    value
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|s| s.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}
