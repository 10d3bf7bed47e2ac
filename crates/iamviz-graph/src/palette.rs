/// Graphviz X11 colour names nodes are painted with.
pub const COLORS: [&str; 10] = [
    "coral1",
    "cadetblue",
    "gold2",
    "aquamarine2",
    "lightpink",
    "lightsalmon",
    "springgreen",
    "wheat1",
    "lavender",
    "chartreuse",
];

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Colour for a service name. Depends on the name only, so the same service
/// keeps its colour across regions and runs.
pub fn color_for(name: &str) -> &'static str {
    COLORS[fnv1a32(name.as_bytes()) as usize % COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a32_reference_values() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_color_is_stable() {
        assert_eq!(color_for("a"), "coral1");
        assert_eq!(color_for("svc-a"), color_for("svc-a"));
        assert!(COLORS.contains(&color_for("billing-api")));
    }
}
