//! Input checks applied before anything touches the network or the queue.
//!
//! This module provides:
//! - Source URL screening (SSRF protection)
//! - Owner id validation
//! - The upload content-type allow list

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::warn;
use url::{Host, Url};

/// Maximum URL length to prevent DoS attacks.
const MAX_URL_LENGTH: usize = 2048;

const MAX_OWNER_ID_LENGTH: usize = 128;

/// Hostnames that resolve to infrastructure rather than video hosts.
const BLOCKED_HOSTS: &[&str] = &["localhost", "metadata", "metadata.google.internal"];

/// Upload content types and the extension stored with them.
const UPLOAD_TYPES: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/x-matroska", "mkv"),
    ("video/x-msvideo", "avi"),
];

/// Reject URLs that point at internal or link-local endpoints.
///
/// Returns the trimmed URL when it is acceptable.
pub fn check_source_url(url: &str) -> Result<String, String> {
    if url.len() > MAX_URL_LENGTH {
        return Err(format!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH));
    }
    let url = url.trim();
    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL format: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!(
            "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
            parsed.scheme()
        ));
    }

    let blocked = match parsed.host() {
        None => return Err("URL must have a valid host".to_string()),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            BLOCKED_HOSTS.contains(&domain.as_str())
                || domain.ends_with(".localhost")
                || domain.ends_with(".internal")
        }
        Some(Host::Ipv4(ip)) => is_internal_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_internal_ip(IpAddr::V6(ip)),
    };
    if blocked {
        warn!(url = %url, "Blocked internal source URL");
        return Err("URL appears to target an internal or restricted endpoint".to_string());
    }
    Ok(url.to_string())
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_internal_v4(ip),
        IpAddr::V6(ip) => {
            if let Some(v4) = ip.to_ipv4_mapped() {
                return is_internal_v4(v4);
            }
            is_internal_v6(ip)
        }
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // carrier-grade NAT 100.64.0.0/10
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}

/// Owner ids come from the upstream auth layer; keep them key-safe.
pub fn is_valid_owner_id(owner_id: &str) -> bool {
    !owner_id.is_empty()
        && owner_id.len() <= MAX_OWNER_ID_LENGTH
        && owner_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extension for an accepted upload content type.
pub fn upload_extension(content_type: &str) -> Option<&'static str> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    UPLOAD_TYPES
        .iter()
        .find(|(ct, _)| *ct == normalized)
        .map(|(_, ext)| *ext)
}

/// Content types accepted for upload, for error messages.
pub fn accepted_upload_types() -> Vec<&'static str> {
    UPLOAD_TYPES.iter().map(|(ct, _)| *ct).collect()
}
