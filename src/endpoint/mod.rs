//! Connection URL building for the push channel endpoint.

use crate::config::EndpointConfig;

/// Build the WebSocket connect URL from endpoint settings.
///
/// The scheme follows the `secure` flag (a secure page implies a secure
/// socket) and the bearer token, when present, is attached as a `token`
/// query parameter.
pub fn build_url(endpoint: &EndpointConfig, token: Option<&str>) -> String {
    let scheme = if endpoint.secure { "wss" } else { "ws" };
    let mut url = format!("{}://{}{}", scheme, endpoint.host, endpoint.path);
    if let Some(token) = token {
        url.push_str("?token=");
        url.push_str(token);
    }
    url
}
