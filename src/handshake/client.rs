//! Client handshake

use std::io::{Read, Write};

use http::{header, HeaderMap, HeaderName, Request as HttpRequest, Response as HttpResponse, StatusCode, Uri, Version};
use httparse::{Status, EMPTY_HEADER};
use log::debug;

use crate::{
    error::{Error, ProtocolError, Result, UrlError},
    handshake::{derive_accept_key, generate_key, headers::{has_token, FromHttparse, MAX_HEADERS}, machine::{HandshakeMachine, TryParse}},
    protocol::{config::WebSocketConfig, websocket::WebSocket}
};

/// Client Request type
pub type Request = HttpRequest<()>;
/// Client Response Type
pub type Response = HttpResponse<Option<Vec<u8>>>;

/// Builds the upgrade request for `uri` with a fresh `Sec-WebSocket-Key`.
pub fn request_for(uri: &Uri) -> Result<Request> {
    let authority = uri.authority().ok_or(Error::Url(UrlError::MissingHost))?;
    let host = match authority.port_u16() {
        Some(80) | None => authority.host().to_owned(),
        Some(port) => format!("{}:{port}", authority.host())
    };

    Ok(HttpRequest::get(uri.clone())
        .header(header::HOST, host)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(header::SEC_WEBSOCKET_KEY, generate_key())
        .body(())?)
}

/// Runs the opening handshake over `stream` and wraps it in a [`WebSocket`].
///
/// A non-`101` answer is returned as [`Error::Http`] carrying whatever body
/// bytes arrived with it.
pub fn client<S: Read + Write>(request: Request, stream: S, config: WebSocketConfig) -> Result<(WebSocket<S>, Response)> {
    let (bytes, key) = generate_request(request)?;
    let verify = VerifyData { accept_key: derive_accept_key(key.as_bytes()) };

    let mut machine = HandshakeMachine::new(stream);
    machine.write_request(&bytes)?;
    let (response, stream, tail) = machine.read_response::<Response>()?;

    let response = match verify.verify_response(response) {
        Ok(r) => r,
        Err(Error::Http(mut res)) => {
            *res.body_mut() = Some(tail);
            return Err(Error::Http(res));
        },
        Err(e) => return Err(e)
    };
    debug!("handshake accepted with {}", response.status());

    Ok((WebSocket::from_partially_read(stream, tail, config), response))
}

/// Serializes the request and extracts its `Sec-WebSocket-Key`.
///
/// The five mandatory handshake headers are written first, in a fixed
/// order; other headers follow as given.
pub fn generate_request(mut request: Request) -> Result<(Vec<u8>, String)> {
    const KEY_HEADERNAME: &str = "Sec-WebSocket-Key";
    const WEBSOCKET_HEADERS: [&str; 5] = ["Host", "Connection", "Upgrade", "Sec-WebSocket-Version", KEY_HEADERNAME];

    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_owned();

    let mut req = Vec::new();
    write!(req, "GET {path} HTTP/1.1\r\n")?;

    let key = request
        .headers()
        .get(KEY_HEADERNAME)
        .ok_or_else(|| invalid_header(KEY_HEADERNAME))?
        .to_str()?
        .to_owned();

    let headers = request.headers_mut();
    for name in WEBSOCKET_HEADERS {
        let value = headers.remove(name).ok_or_else(|| invalid_header(name))?;
        let value = value
            .to_str()
            .map_err(|e| Error::Utf8(format!("{e} for header name '{name}' with value: {value:?}")))?;

        write!(req, "{name}: {value}\r\n")?;
    }

    for (name, value) in headers.iter() {
        let value = value
            .to_str()
            .map_err(|e| Error::Utf8(format!("{e} for header name '{name}' with value: {value:?}")))?;

        write!(req, "{name}: {value}\r\n")?;
    }

    write!(req, "\r\n")?;
    Ok((req, key))
}

fn invalid_header(name: &str) -> Error {
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => Error::Protocol(ProtocolError::InvalidHeader(name)),
        Err(e) => e.into()
    }
}

#[derive(Debug)]
struct VerifyData {
    accept_key: String
}

impl VerifyData {
    fn verify_response(&self, res: Response) -> Result<Response> {
        if res.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(Error::Http(Box::new(res)));
        }

        let headers = res.headers();

        if !has_token(headers.get(header::CONNECTION), "upgrade") {
            return Err(Error::Protocol(ProtocolError::MissingConnectionUpgradeHeader));
        }

        if !headers
            .get(header::UPGRADE)
            .and_then(|h| h.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
        {
            return Err(Error::Protocol(ProtocolError::MissingUpgradeHeader));
        }

        if !headers
            .get(header::SEC_WEBSOCKET_ACCEPT)
            .map(|h| h == self.accept_key.as_str())
            .unwrap_or(false)
        {
            return Err(Error::Protocol(ProtocolError::AcceptKeyMismatch));
        }

        Ok(res)
    }
}

impl TryParse for Response {
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>> {
        let mut hbuffer = [EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut hbuffer);

        Ok(match res.parse(data)? {
            Status::Partial => None,
            Status::Complete(n) => Some((n, Response::from_httparse(res)?))
        })
    }
}

impl<'b: 'h, 'h> FromHttparse<httparse::Response<'h, 'b>> for Response {
    fn from_httparse(raw: httparse::Response<'h, 'b>) -> Result<Self> {
        if raw.version != Some(1) {
            return Err(Error::Protocol(ProtocolError::InvalidHttpVersion));
        }

        let code = raw.code.ok_or(Error::Protocol(ProtocolError::IncompleteHandshake))?;

        let mut res = Response::new(None);
        *res.status_mut() = StatusCode::from_u16(code)?;
        *res.headers_mut() = HeaderMap::from_httparse(raw.headers)?;
        *res.version_mut() = Version::HTTP_11;

        Ok(res)
    }
}
