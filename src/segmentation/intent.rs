//! Explicit intent detection via phrase patterns.
//!
//! Runs on every inbound message before any store or model call, so the
//! patterns are compiled once and kept deliberately small.

use regex::RegexSet;
use std::sync::LazyLock;

static NEW_TOPIC: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\bnew (topic|conversation|chat)\b",
        r"(?i)\bchange (the )?subject\b",
        r"(?i)\b(let'?s )?move on\b",
        r"(?i)\bstart fresh\b",
        r"(?i)\bdifferent topic\b",
        r"(?i)^\s*anyway\b",
    ])
    .expect("new-topic patterns are valid")
});

static RESUME: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\bcontinue\b",
        r"(?i)\bpick (it |this |that )?up\b",
        r"(?i)\bwhere we left off\b",
        r"(?i)\bresume\b",
        r"(?i)\bgo back to\b",
        r"(?i)\bas we (discussed|talked about)\b",
    ])
    .expect("resume patterns are valid")
});

/// The user explicitly wants a fresh topic ("new topic", "change the
/// subject", "let's move on", a leading "anyway, ...").
pub fn wants_new_topic(text: &str) -> bool {
    NEW_TOPIC.is_match(text)
}

/// The user signals returning to an earlier topic, which relaxes the
/// resume-search overlap threshold.
pub fn wants_resume(text: &str) -> bool {
    RESUME.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_topic_phrases_match() {
        for text in [
            "ok, new topic: holiday plans",
            "New conversation please",
            "let's start a new chat",
            "change the subject",
            "can we change subject",
            "let's move on",
            "move on already",
            "start fresh",
            "I want a different topic",
            "anyway, what about dinner",
            "Anyway. Something else.",
        ] {
            assert!(wants_new_topic(text), "should match: {text}");
        }
    }

    #[test]
    fn new_topic_requires_a_phrase_not_a_word() {
        for text in [
            "the new API version broke things",
            "I bought a new laptop",
            "we moved the meeting",
            "what should I cook tonight?",
            "it works anyway so no rush", // "anyway" only counts at the start
        ] {
            assert!(!wants_new_topic(text), "should not match: {text}");
        }
    }

    #[test]
    fn resume_phrases_match() {
        for text in [
            "continue the oauth work",
            "let's pick up where we left off",
            "resume the deployment discussion",
            "go back to the billing bug",
            "as we discussed yesterday",
        ] {
            assert!(wants_resume(text), "should match: {text}");
        }
    }

    #[test]
    fn plain_questions_are_not_resume_intent() {
        assert!(!wants_resume("what should I cook tonight?"));
        assert!(!wants_resume("my backpack has a broken zipper"));
    }
}
