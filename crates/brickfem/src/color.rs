//! Display colors of bricks and rigid bodies.

/// Color of bricks without a declared color, and of rigid loading bodies.
pub const DEFAULT_COLOR: &str = "ffffff";

/// Solid brick colors (BrickLink catalog) as `(name, hex)`.
pub const PALETTE: &[(&str, &str)] = &[
    ("White", "ffffff"),
    ("Very Light Gray", "e5e5e5"),
    ("Very Light Bluish Gray", "e0e5e5"),
    ("Light Bluish Gray", "a5acbf"),
    ("Light Gray", "919191"),
    ("Dark Gray", "615050"),
    ("Dark Bluish Gray", "4e5355"),
    ("Black", "1e1e1e"),
    ("Dark Red", "631116"),
    ("Red", "b10b0f"),
    ("Coral", "ff7669"),
    ("Dark Salmon", "ff592a"),
    ("Salmon", "ff7256"),
    ("Light Salmon", "ffc0af"),
    ("Sand Red", "c28276"),
    ("Dark Brown", "48302a"),
    ("Brown", "633721"),
    ("Light Brown", "925b39"),
    ("Medium Brown", "9b613d"),
    ("Reddish Brown", "7b3a27"),
    ("Fabuland Brown", "af5e47"),
    ("Dark Tan", "b28d61"),
    ("Medium Tan", "d6bd8c"),
    ("Tan", "eed39e"),
    ("Light Nougat", "ffc5a9"),
    ("Nougat", "ffa576"),
    ("Medium Nougat", "e49556"),
    ("Dark Nougat", "cd6e3f"),
    ("Fabuland Orange", "f4852c"),
    ("Earth Orange", "e97c28"),
    ("Dark Orange", "b04a17"),
    ("Rust", "af401c"),
    ("Neon Orange", "ff5041"),
    ("Orange", "ff7324"),
    ("Medium Orange", "ff9a38"),
    ("Bright Light Orange", "ffbe2c"),
    ("Light Orange", "ffb23f"),
    ("Very Light Orange", "ffd69e"),
    ("Dark Yellow", "de8c34"),
    ("Yellow", "ffda32"),
    ("Light Yellow", "ffe39a"),
    ("Bright Light Yellow", "ffec89"),
    ("Neon Yellow", "fff938"),
    ("Neon Green", "d5ef5b"),
    ("Light Lime", "e9eab8"),
    ("Yellowish Green", "e3efa2"),
    ("Medium Lime", "dcd931"),
    ("Fabuland Lime", "a1ca41"),
    ("Lime", "bbd930"),
    ("Dark Olive Green", "6b693b"),
    ("Olive Green", "a29e50"),
    ("Dark Green", "254b3c"),
    ("Green", "00863c"),
    ("Bright Green", "00c23b"),
    ("Medium Green", "7ed986"),
    ("Light Green", "cfebcc"),
    ("Sand Green", "95b69a"),
    ("Dark Turquoise", "009794"),
    ("Light Turquoise", "00bdb4"),
    ("Aqua", "afe1d7"),
    ("Light Aqua", "c5ece7"),
    ("Dark Blue", "1e314c"),
    ("Blue", "004f99"),
    ("Dark Azure", "0096d8"),
    ("Little Robots Blue", "43b7de"),
    ("Maersk Blue", "69b9d1"),
    ("Medium Azure", "50c7da"),
    ("Sky Blue", "76cedc"),
    ("Medium Blue", "71a4d0"),
    ("Bright Light Blue", "b1cbe9"),
    ("Light Blue", "bfd4dc"),
    ("Sand Blue", "7b8fa0"),
    ("Dark Blue-Violet", "1731a2"),
    ("Violet", "2a4296"),
    ("Blue-Violet", "4065e7"),
    ("Lilac", "6d5bc3"),
    ("Medium Violet", "8788dc"),
    ("Light Lilac", "c6c6ea"),
    ("Light Violet", "c1c3dd"),
    ("Dark Purple", "572675"),
    ("Purple", "72257f"),
    ("Light Purple", "ab3087"),
    ("Medium Lavender", "c280d0"),
    ("Lavender", "ceb6dd"),
    ("Clikits Lavender", "dfa2d2"),
    ("Sand Purple", "b07399"),
    ("Magenta", "b52469"),
    ("Dark Pink", "f554a7"),
    ("Medium Dark Pink", "fd7ca6"),
    ("Bright Pink", "fab5d3"),
    ("Pink", "f7c7d0"),
    ("Light Pink", "f3cdcb"),
];

/// Look up a palette name (case-insensitive) or a literal hex string with
/// or without a leading `#`.
pub fn lookup(color: &str) -> Option<String> {
    let raw = color.trim();
    if let Some((_, hex)) = PALETTE.iter().find(|(name, _)| name.eq_ignore_ascii_case(raw)) {
        return Some((*hex).to_string());
    }
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit())).then(|| hex.to_ascii_lowercase())
}

/// Resolve a color declaration to a 6-digit lowercase hex string,
/// [`DEFAULT_COLOR`] if absent or unrecognized.
pub fn resolve(color: Option<&str>) -> String {
    color
        .and_then(lookup)
        .unwrap_or_else(|| DEFAULT_COLOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_hex() {
        assert_eq!(resolve(Some("Red")), "b10b0f");
        assert_eq!(resolve(Some("light bluish gray")), "a5acbf");
        assert_eq!(resolve(Some("00FF7f")), "00ff7f");
        assert_eq!(resolve(Some("#1e1e1e")), "1e1e1e");
    }

    #[test]
    fn fallback_to_white() {
        assert_eq!(resolve(None), DEFAULT_COLOR);
        assert_eq!(resolve(Some("Chartreuse")), DEFAULT_COLOR);
        assert_eq!(resolve(Some("12345")), DEFAULT_COLOR);
        assert_eq!(lookup("Chartreuse"), None);
        assert_eq!(lookup("White").as_deref(), Some("ffffff"));
        assert_eq!(lookup(" Dark Azure ").as_deref(), Some("0096d8"));
    }

    #[test]
    fn palette_entries_are_hex() {
        assert_eq!(PALETTE.len(), 92);
        for (name, hex) in PALETTE {
            assert_eq!(hex.len(), 6, "{name}");
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit()), "{name}");
        }
    }
}
