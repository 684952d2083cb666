pub mod router;
pub mod sequencer;
pub mod traits;

pub use router::Router;
pub use sequencer::Sequencer;
pub use traits::{Channel, InboundMessage};

/// Split text into chunks of at most `limit` bytes, preferring newline
/// then space boundaries so words and paragraphs stay intact. Cuts
/// always land on char boundaries.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= limit {
            chunks.push(rest.to_string());
            break;
        }
        // Find the largest char boundary within the limit.
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &rest[..cut];
        let split = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(cut);
        chunks.push(rest[..split].trim_end().to_string());
        rest = &rest[split..];
    }
    chunks.retain(|c| !c.is_empty());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello", 100), vec!["hello"]);
    }

    #[test]
    fn splits_on_word_boundaries() {
        let chunks = chunk_text("alpha beta gamma delta", 12);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 12);
            assert!(!chunk.starts_with(' '));
        }
        assert_eq!(chunks.join(" "), "alpha beta gamma delta");
    }

    #[test]
    fn prefers_newlines_over_spaces() {
        let chunks = chunk_text("first line\nsecond line here", 16);
        assert_eq!(chunks[0], "first line");
    }

    #[test]
    fn never_splits_inside_a_char() {
        // Multibyte text must split on char boundaries.
        let text = "héllo wörld ".repeat(20);
        for chunk in chunk_text(&text, 10) {
            assert!(chunk.len() <= 10);
        }
    }
}
