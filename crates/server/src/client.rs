//! Client identification from request headers

use axum::http::HeaderMap;

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Stable identifier of the calling client
///
/// `x-device-id` wins; otherwise the first `x-forwarded-for` address or
/// `x-real-ip`, prefixed with `ip:`. Loopback and missing values give
/// `unknown`.
pub fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(device) = header(headers, "x-device-id") {
        if !device.eq_ignore_ascii_case(UNKNOWN_CLIENT) {
            return device.to_string();
        }
    }

    let ip = header(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').map(str::trim).find(|s| !s.is_empty()))
        .or_else(|| header(headers, "x-real-ip"));

    match ip {
        Some(ip) if !matches!(ip, "unknown" | "::1" | "127.0.0.1") => format!("ip:{}", ip),
        _ => UNKNOWN_CLIENT.to_string(),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
