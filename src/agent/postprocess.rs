//! Final-response post-processing, applied exactly once per turn after
//! the round loop, never to intermediate rounds or tool payloads.

/// Replace em and en dashes with plain hyphens. Chat surfaces render
/// typographic dashes inconsistently and users read them as AI tells.
pub fn normalize_dashes(text: &str) -> String {
    text.replace(['\u{2014}', '\u{2013}'], "-")
}

/// Dash normalization plus the configured response prefix.
pub fn postprocess(text: &str, prefix: Option<&str>) -> String {
    let normalized = normalize_dashes(text);
    let trimmed = normalized.trim();
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}{trimmed}"),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn em_and_en_dashes_become_hyphens() {
        assert_eq!(
            normalize_dashes("fast\u{2014}but wrong\u{2013}ish"),
            "fast-but wrong-ish"
        );
    }

    #[test]
    fn prefix_is_prepended_after_trim() {
        assert_eq!(postprocess("  hello \n", Some("[bot] ")), "[bot] hello");
    }

    #[test]
    fn no_prefix_just_normalizes() {
        assert_eq!(postprocess("a\u{2014}b", None), "a-b");
    }
}
