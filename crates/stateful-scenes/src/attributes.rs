//! Attributes that take part in matching, per entity domain

/// Attributes compared for entities of `domain`; empty means state only
pub fn relevant_attributes(domain: &str) -> &'static [&'static str] {
    match domain {
        "light" => &["brightness", "rgb_color", "effect"],
        "cover" => &["current_position"],
        "media_player" => &["volume_level", "source"],
        "fan" => &["direction", "oscillating", "percentage"],
        "climate" => &["system_mode", "temperature"],
        _ => &[],
    }
}

pub fn is_relevant(domain: &str, attribute: &str) -> bool {
    relevant_attributes(domain).contains(&attribute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table() {
        assert_eq!(
            relevant_attributes("light"),
            &["brightness", "rgb_color", "effect"]
        );
        assert!(is_relevant("cover", "current_position"));
        assert!(!is_relevant("cover", "brightness"));
        assert!(relevant_attributes("switch").is_empty());
    }
}
