//! Arena name lookup for map asset slugs seen in the client's load lines.

/// Raw asset slug → human-readable arena name.
const MAP_NAMES: &[(&str, &str)] = &[
    ("bathhouse", "Bath House"),
    ("cargo_yard", "Cargo Yard"),
    ("citadel_v2", "Citadel"),
    ("desert_outpost", "Desert Outpost"),
    ("factory_night", "Factory (Night)"),
    ("frostbite", "Frostbite"),
    ("highrise", "Highrise"),
    ("lighthouse", "Lighthouse"),
    ("neon_district", "Neon District"),
    ("skyline_rooftops", "Skyline"),
    ("temple_ruins", "Temple Ruins"),
    ("xmas_village", "Winter Village"),
];

/// Normalise a raw map asset slug into its arena name.
///
/// Lookup is case-insensitive; unknown slugs are returned unchanged.
///
/// # Examples
///
/// ```
/// use frag_core::maps::normalize_map_name;
///
/// assert_eq!(normalize_map_name("citadel_v2"), "Citadel");
/// assert_eq!(normalize_map_name("XMAS_VILLAGE"), "Winter Village");
/// assert_eq!(normalize_map_name("brand_new_map"), "brand_new_map");
/// ```
pub fn normalize_map_name(slug: &str) -> String {
    let lower = slug.trim().to_lowercase();
    MAP_NAMES
        .iter()
        .find(|(raw, _)| *raw == lower)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| slug.to_string())
}

/// `true` when `slug` has an entry in the arena table.
pub fn is_known_map(slug: &str) -> bool {
    let lower = slug.trim().to_lowercase();
    MAP_NAMES.iter().any(|(raw, _)| *raw == lower)
}
