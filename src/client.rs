//! Connecting to a `ws://` endpoint

use std::{io::{Read, Write}, net::TcpStream};

use http::Uri;
use log::debug;
use url::{Host, Url};

use crate::{
    error::{Error, Result, UrlError},
    handshake::client::{client, request_for, Response},
    protocol::{config::WebSocketConfig, websocket::WebSocket},
    stream::{connect_to_host, StreamOptions}
};

/// Connects to `url` with default limits and no timeouts.
pub fn connect(url: &str) -> Result<(WebSocket<TcpStream>, Response)> {
    connect_with_config(url, WebSocketConfig::default(), &StreamOptions::default())
}

/// Connects to `url`, applying `options` to the socket before the handshake.
///
/// Only plain `ws://` URLs are accepted. Failure to reach the host is
/// reported as [`UrlError::UnableToConnect`]; everything after the TCP
/// connection is up comes from the handshake.
pub fn connect_with_config(url: &str, config: WebSocketConfig, options: &StreamOptions) -> Result<(WebSocket<TcpStream>, Response)> {
    connect_wrapping(url, config, options, |stream| stream)
}

/// Like [`connect_with_config`], running the handshake and the session over
/// `wrap(stream)` instead of the bare socket.
pub fn connect_wrapping<S, F>(url: &str, config: WebSocketConfig, options: &StreamOptions, wrap: F) -> Result<(WebSocket<S>, Response)>
where
    S: Read + Write,
    F: FnOnce(TcpStream) -> S
{
    let url = Url::parse(url)?;
    let (host, port) = target_of(&url)?;

    let stream = connect_to_host(&host, port, options)?;

    let uri: Uri = url.as_str().parse().map_err(http::Error::from)?;
    let request = request_for(&uri)?;
    debug!("starting handshake with {url}");

    client(request, wrap(stream), config)
}

/// Host (without IPv6 brackets) and port to dial for a `ws://` URL.
pub fn target_of(url: &Url) -> Result<(String, u16)> {
    if url.scheme() != "ws" {
        return Err(Error::Url(UrlError::UnsupportedScheme));
    }

    let host = match url.host() {
        None => return Err(Error::Url(UrlError::MissingHost)),
        Some(Host::Domain("")) => return Err(Error::Url(UrlError::EmptyHost)),
        Some(Host::Domain(d)) => d.to_owned(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string()
    };

    Ok((host, url.port_or_known_default().unwrap_or(80)))
}
