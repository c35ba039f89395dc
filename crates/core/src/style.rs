//! Built-in style presets.
//!
//! A preset is a prompt suffix appended to the user's content
//! description before it is written into the prompt node.

/// A named prompt suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StylePreset {
    /// Short lookup key (e.g. "cyberpunk").
    pub key: &'static str,
    /// Human-readable label, recorded in the job history.
    pub label: &'static str,
    /// Text appended to the content prompt.
    pub suffix: &'static str,
}

pub const STYLE_GENERAL: StylePreset = StylePreset {
    key: "general",
    label: "General Best",
    suffix: "masterpiece, best quality, high resolution, 8k, detailed",
};

pub const STYLE_CYBERPUNK: StylePreset = StylePreset {
    key: "cyberpunk",
    label: "Cyberpunk",
    suffix: "cyberpunk, neon lights, rain, futuristic city, sci-fi, high contrast, masterpiece",
};

pub const STYLE_ANIME: StylePreset = StylePreset {
    key: "anime",
    label: "Anime",
    suffix: "anime style, studio ghibli, cel shaded, vibrant colors, cute, masterpiece",
};

pub const STYLE_INK_OIL: StylePreset = StylePreset {
    key: "ink-oil",
    label: "Ink & Oil",
    suffix: "oil painting, thick strokes, ink wash, artistic, abstract, masterpiece",
};

/// All presets, in display order.
pub const STYLE_PRESETS: &[StylePreset] = &[STYLE_GENERAL, STYLE_CYBERPUNK, STYLE_ANIME, STYLE_INK_OIL];

/// Look up a preset by key or label, ignoring case and surrounding whitespace.
pub fn find_preset(name: &str) -> Option<&'static StylePreset> {
    let name = name.trim();
    STYLE_PRESETS
        .iter()
        .find(|p| p.key.eq_ignore_ascii_case(name) || p.label.eq_ignore_ascii_case(name))
}

/// Join the content description and the preset suffix.
///
/// `"{content}, {suffix}"`, or just the suffix when the content is blank.
pub fn compose_prompt(content: &str, preset: Option<&StylePreset>) -> String {
    let content = content.trim();
    match preset {
        Some(p) if content.is_empty() => p.suffix.to_string(),
        Some(p) => format!("{content}, {}", p.suffix),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_key_and_label() {
        assert_eq!(find_preset("cyberpunk"), Some(&STYLE_CYBERPUNK));
        assert_eq!(find_preset("  Ink & Oil "), Some(&STYLE_INK_OIL));
        assert_eq!(find_preset("ANIME"), Some(&STYLE_ANIME));
    }

    #[test]
    fn unknown_style() {
        assert!(find_preset("watercolor").is_none());
        assert!(find_preset("").is_none());
    }

    #[test]
    fn compose_with_preset() {
        assert_eq!(
            compose_prompt("1girl, looking at viewer", Some(&STYLE_GENERAL)),
            "1girl, looking at viewer, masterpiece, best quality, high resolution, 8k, detailed"
        );
    }

    #[test]
    fn compose_without_preset_trims() {
        assert_eq!(compose_prompt("  a cat  ", None), "a cat");
    }

    #[test]
    fn compose_blank_content_uses_suffix_only() {
        assert_eq!(compose_prompt("   ", Some(&STYLE_ANIME)), STYLE_ANIME.suffix);
    }

    #[test]
    fn keys_are_unique() {
        for (i, a) in STYLE_PRESETS.iter().enumerate() {
            for b in &STYLE_PRESETS[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }
}
