//! Extraction and normalization rules for raw feed values.
//!
//! Feeds are messy: lines carry comments, URLs, ports, and mixed case.
//! Everything entering an [`IndicatorSet`](crate::types::IndicatorSet) goes
//! through [`normalize`] and [`classify`] first, so the canonical value is
//! the unique key everywhere downstream.

use crate::types::IndicatorType;
use std::net::Ipv4Addr;

/// Maximum total length of a domain name
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single domain label
const MAX_LABEL_LEN: usize = 63;

/// Canonicalize a raw value: trim, lowercase, strip URL scheme and `www.`
/// prefixes, drop any path/query/fragment and port, and remove a trailing
/// dot.
///
/// Normalization is idempotent: `normalize(normalize(v)) == normalize(v)`.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let mut v = raw.trim().to_ascii_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = v.strip_prefix(scheme) {
            v = rest.to_string();
            break;
        }
    }

    while let Some(rest) = v.strip_prefix("www.") {
        v = rest.to_string();
    }

    if let Some(cut) = v.find(['/', '?', '#']) {
        v.truncate(cut);
    }

    // Strip a trailing :port, but only when what follows is all digits.
    if let Some(colon) = v.rfind(':') {
        if v[colon + 1..].bytes().all(|b| b.is_ascii_digit()) {
            v.truncate(colon);
        }
    }

    let v = v.trim_matches('.').to_string();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Determine whether a normalized value is a usable indicator, and of
/// which type. Returns `None` for values that are neither a public IPv4
/// address nor a valid domain.
#[must_use]
pub fn classify(value: &str) -> Option<IndicatorType> {
    if let Ok(ip) = value.parse::<Ipv4Addr>() {
        return is_public_ipv4(ip).then_some(IndicatorType::Ip);
    }
    is_valid_domain(value).then_some(IndicatorType::Domain)
}

/// Returns true for globally routable IPv4 addresses.
///
/// Private, loopback, link-local, and everything from 224.0.0.0 up
/// (multicast, reserved, broadcast) is excluded, as is 0.0.0.0/8.
#[must_use]
pub const fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    !(o[0] == 0
        || o[0] == 10
        || (o[0] == 172 && o[1] >= 16 && o[1] <= 31)
        || (o[0] == 192 && o[1] == 168)
        || o[0] == 127
        || (o[0] == 169 && o[1] == 254)
        || o[0] >= 224)
}

/// Validate a domain name: at most 253 characters, at least two labels,
/// each label 1-63 alphanumeric-or-hyphen characters not starting or
/// ending with a hyphen. The final label must not be all digits, so
/// malformed dotted quads never pass as domains.
#[must_use]
pub fn is_valid_domain(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_DOMAIN_LEN {
        return false;
    }

    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    for label in &labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return false;
        }
    }

    let tld = labels[labels.len() - 1];
    !tld.bytes().all(|b| b.is_ascii_digit())
}

/// Extract candidate indicators from one plain-text feed line.
///
/// Comment lines (`#`, `;`, `//`) yield nothing. Tokens are split on
/// whitespace and commas; tokens containing an embedded URL are scanned
/// for their host part.
#[must_use]
pub fn extract_from_line(
    line: &str,
    want_ips: bool,
    want_domains: bool,
) -> Vec<(String, IndicatorType)> {
    let trimmed = line.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with(';')
        || trimmed.starts_with("//")
    {
        return Vec::new();
    }

    let mut found = Vec::new();
    for token in trimmed.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }

        // An embedded URL anywhere in the token contributes its host.
        let candidate = token
            .find("://")
            .map_or(token, |pos| &token[pos + 3..]);

        let Some(norm) = normalize(candidate) else {
            continue;
        };
        let Some(kind) = classify(&norm) else {
            continue;
        };

        match kind {
            IndicatorType::Ip if want_ips => found.push((norm, kind)),
            IndicatorType::Domain if want_domains => found.push((norm, kind)),
            _ => {}
        }
    }
    found
}
