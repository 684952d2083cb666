//! Chain context rendering and state-update merging.
//!
//! When a conversation chains back to earlier ones, the ancestors'
//! summaries, decisions, and state updates are rendered into a compact
//! system-prompt block so the model sees prior context without replaying
//! full transcripts.

use crate::model::{Conversation, StateUpdate};
use std::collections::HashMap;

/// How many superseded values to keep per state attribute.
const MAX_SUPERSEDED: usize = 3;

/// Render a conversation chain into prompt text. The chain arrives
/// newest-first (as returned by the store); output is oldest-first so
/// the narrative reads chronologically.
pub fn render_chain_context(chain: &[Conversation]) -> String {
    if chain.is_empty() {
        return String::new();
    }

    let mut out = String::from("Earlier related conversations:\n\n");
    let mut all_updates: Vec<&StateUpdate> = Vec::new();

    for convo in chain.iter().rev() {
        let title = convo.title.as_deref().unwrap_or("(untitled)");
        out.push_str(&format!("## {title}\n"));
        if let Some(summary) = &convo.summary {
            out.push_str(summary);
            out.push('\n');
        }
        if !convo.decisions.is_empty() {
            out.push_str("Decisions:\n");
            for d in &convo.decisions {
                match &d.reasoning {
                    Some(why) if !why.is_empty() => {
                        out.push_str(&format!("- {} ({why})\n", d.what));
                    }
                    _ => out.push_str(&format!("- {}\n", d.what)),
                }
            }
        }
        out.push('\n');
        all_updates.extend(convo.state_updates.iter());
    }

    let merged = merge_state_updates(&all_updates);
    if !merged.is_empty() {
        out.push_str("Current state:\n");
        for (key, history) in merged {
            let current = history.last().map(String::as_str).unwrap_or_default();
            if history.len() > 1 {
                let previous = history[..history.len() - 1].join(" -> ");
                out.push_str(&format!("- {key} = {current} (previously: {previous})\n"));
            } else {
                out.push_str(&format!("- {key} = {current}\n"));
            }
        }
    }

    out.trim_end().to_string()
}

/// Merge state updates across a chain. Updates are keyed by lowercase
/// `domain::attribute`; the newest value wins and at most
/// `MAX_SUPERSEDED` older values are retained per key. Input must be
/// ordered oldest-first. Returns sorted key order for stable output.
pub fn merge_state_updates(updates: &[&StateUpdate]) -> Vec<(String, Vec<String>)> {
    let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
    for update in updates {
        let key = format!(
            "{}::{}",
            update.domain.to_lowercase(),
            update.attribute.to_lowercase()
        );
        let history = by_key.entry(key).or_default();
        history.push(update.value.clone());
        if history.len() > MAX_SUPERSEDED + 1 {
            history.remove(0);
        }
    }
    let mut merged: Vec<(String, Vec<String>)> = by_key.into_iter().collect();
    merged.sort_by(|a, b| a.0.cmp(&b.0));
    merged
}
