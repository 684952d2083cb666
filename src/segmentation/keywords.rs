//! Keyword-overlap heuristics used before any model call.

use std::collections::HashSet;

/// Common English words ignored by the overlap heuristics. Short words
/// (under 3 characters) are dropped regardless.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "did", "its", "let", "put", "say", "she", "too", "use", "about",
    "after", "again", "also", "any", "because", "been", "before", "being", "between", "both",
    "came", "come", "could", "does", "doing", "done", "down", "each", "even", "from", "give",
    "going", "good", "have", "here", "into", "just", "know", "like", "made", "make", "many",
    "more", "most", "much", "must", "need", "only", "other", "over", "please", "really",
    "same", "should", "some", "something", "still", "such", "take", "than", "that", "them",
    "then", "there", "these", "they", "thing", "things", "think", "this", "those", "time",
    "very", "want", "well", "were", "what", "when", "where", "which", "while", "will", "with",
    "would", "your", "yours",
];

/// Lowercased significant words of a text: alphanumeric runs of at
/// least 3 characters that are not stopwords.
pub fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Number of significant words shared by two texts (case-insensitive).
pub fn overlap(a: &str, b: &str) -> usize {
    let wa = significant_words(a);
    let wb = significant_words(b);
    wa.intersection(&wb).count()
}
