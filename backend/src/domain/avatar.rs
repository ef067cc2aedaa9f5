//! Avatar glyph table and colour palette.
//!
//! Profiles store the avatar as a name. Any name that is not in the table
//! decodes to [`AvatarGlyph::Unknown`] and renders as the fallback glyph.

use shared::{AvatarGlyph, DEFAULT_AVATAR_COLOR};

/// Glyph shown for `Unknown` or unrecognised avatars
pub const FALLBACK_GLYPH: &str = "👤";

/// Colours offered by the avatar picker
pub const AVATAR_PALETTE: [&str; 12] = [
    "#3B82F6", "#10B981", "#F59E0B", "#cb2727ff", "#8B5CF6", "#EC4899", "#6B7280", "#14B8A6",
    "#84CC16", "#f11338ff", "#0EA5E9", "#A16207",
];

static GLYPH_TABLE: [(AvatarGlyph, &str); 12] = [
    (AvatarGlyph::User, "👤"),
    (AvatarGlyph::Smile, "😊"),
    (AvatarGlyph::Star, "⭐"),
    (AvatarGlyph::Heart, "❤️"),
    (AvatarGlyph::Coffee, "☕"),
    (AvatarGlyph::Wallet, "👛"),
    (AvatarGlyph::PiggyBank, "🐷"),
    (AvatarGlyph::Cat, "🐱"),
    (AvatarGlyph::Dog, "🐶"),
    (AvatarGlyph::Rocket, "🚀"),
    (AvatarGlyph::Sun, "☀️"),
    (AvatarGlyph::Moon, "🌙"),
];

/// Renderable glyph for an avatar kind
pub fn glyph_for(avatar: AvatarGlyph) -> &'static str {
    GLYPH_TABLE
        .iter()
        .find(|(kind, _)| *kind == avatar)
        .map(|(_, glyph)| *glyph)
        .unwrap_or(FALLBACK_GLYPH)
}

/// Renderable glyph for a stored avatar name
pub fn glyph_for_name(name: &str) -> &'static str {
    glyph_for(AvatarGlyph::from_name(name))
}

/// Accept a picked colour or fall back to the default one. Colours must be
/// `#RGB`, `#RRGGBB` or `#RRGGBBAA` hex.
pub fn normalize_color(color: &str) -> String {
    let color = color.trim();
    let hex = color.strip_prefix('#').unwrap_or("");
    let valid = matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        color.to_string()
    } else {
        DEFAULT_AVATAR_COLOR.to_string()
    }
}
