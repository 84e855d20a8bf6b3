// Identifier canonicalization
//
// Publishers and the static topology disagree on case and zero padding
// ("a1", "A1", "A01"). Everything that looks up an entity goes through
// `canonical_id` first.

/// Canonicalize a raw device identifier.
///
/// Identifiers of the form `<letter><digits>` become the uppercase letter
/// followed by the number zero-padded to two digits (`a1` → `A01`,
/// `B5` → `B05`, `c123` → `C123`). Anything else is returned verbatim.
///
/// # Examples
///
/// ```
/// use tilewatch::identity::normalize_id;
///
/// assert_eq!(normalize_id("a1"), "A01");
/// assert_eq!(normalize_id("XYZ"), "XYZ");
/// ```
pub fn normalize_id(raw: &str) -> String {
    let mut chars = raw.chars();

    let letter = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => c,
        _ => return raw.to_string(),
    };

    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_string();
    }

    format!("{}{:0>2}", letter.to_ascii_uppercase(), digits)
}

/// Canonicalize a port number: a purely numeric port loses its leading
/// zeros (`"08"` → `"8"`); anything else is trimmed and kept.
pub fn canonical_port(raw: &str) -> String {
    let port = raw.trim();
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return port.to_string();
    }

    match port.trim_start_matches('0') {
        "" => "0".to_string(),
        digits => digits.to_string(),
    }
}

/// Compose the canonical key of a port entity: `<normalized device>/<port>`.
pub fn port_key(device: &str, port: &str) -> String {
    format!("{}/{}", normalize_id(device.trim()), canonical_port(port))
}

/// Canonicalize any entity id, device or port.
///
/// `<device>/<port>` ids go through `port_key`; everything else through
/// `normalize_id`.
///
/// ```
/// use tilewatch::identity::canonical_id;
///
/// assert_eq!(canonical_id("b2/08"), "B02/8");
/// assert_eq!(canonical_id("a1"), "A01");
/// ```
pub fn canonical_id(raw: &str) -> String {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((device, port)) => port_key(device, port),
        None => normalize_id(raw),
    }
}
