//! Tile URL classification.
//!
//! Decides whether a request URL addresses a map tile and should therefore go
//! through the offline cache. Three independent rules are applied:
//!
//! - a numeric `/{z}/{x}/{y}.png` or `/{z}/{x}/{y}.jpg` run anywhere in the
//!   URL string (path, query or a longer file name such as `3.png.bak`)
//! - a host from the fixed list of known tile servers
//! - an unresolved `{z}`, `{x}` or `{y}` template placeholder anywhere in the URL

use url::Url;

/// Image extensions accepted in the `{z}/{x}/{y}.{ext}` shape.
const TILE_EXTENSIONS: &[&str] = &["png", "jpg"];

/// Template placeholders left in unresolved tile URL templates.
const PLACEHOLDERS: &[&str] = &["{z}", "{x}", "{y}"];

/// Returns `true` if the URL looks like a map tile request.
///
/// Never fails; anything that matches none of the rules is not a tile.
pub fn is_tile_request(url: &str) -> bool {
    if has_placeholder(url) {
        return true;
    }

    if has_tile_run(url) {
        return true;
    }

    Url::parse(url).is_ok_and(|parsed| {
        parsed
            .host_str()
            .is_some_and(|host| is_known_tile_host(host, parsed.path()))
    })
}

fn has_placeholder(url: &str) -> bool {
    if PLACEHOLDERS.iter().any(|p| url.contains(p)) {
        return true;
    }

    // `Url` percent-encodes braces, so templates often arrive as %7Bz%7D
    match urlencoding::decode(url) {
        Ok(decoded) => PLACEHOLDERS.iter().any(|p| decoded.contains(p)),
        Err(_) => false,
    }
}

fn has_tile_run(url: &str) -> bool {
    url.match_indices('/')
        .any(|(slash, _)| is_tile_run(&url[slash + 1..]))
}

/// `{digits}/{digits}/{digits}.{ext}` at the start of `rest`.
fn is_tile_run(rest: &str) -> bool {
    let Some(rest) = digits_then(rest, '/') else {
        return false;
    };
    let Some(rest) = digits_then(rest, '/') else {
        return false;
    };
    let Some(rest) = digits_then(rest, '.') else {
        return false;
    };
    TILE_EXTENSIONS.iter().any(|ext| {
        rest.get(..ext.len())
            .is_some_and(|found| found.eq_ignore_ascii_case(ext))
    })
}

fn digits_then(s: &str, separator: char) -> Option<&str> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    s[digits..].strip_prefix(separator)
}

fn is_known_tile_host(host: &str, path: &str) -> bool {
    let host = host.to_ascii_lowercase();

    // OpenStreetMap standard tiles, including the a/b/c subdomains
    if host.ends_with("tile.openstreetmap.org") {
        return true;
    }

    // Ordnance Survey WMTS endpoint
    if host == "api.os.uk" && path.contains("/wmts") {
        return true;
    }

    // MapQuest open tiles: otile1.mqcdn.com .. otile4.mqcdn.com
    host.starts_with("otile") && host.ends_with(".mqcdn.com")
}
