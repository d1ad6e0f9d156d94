//! Best-effort verdict extraction from inference output.
//!
//! Verdict extraction is annotation, not a correctness gate: a missing,
//! unreadable, or unparsable result degrades to "Uncertain" and never fails
//! the stage.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

pub const VERDICT_FAKE: &str = "Fake";
pub const VERDICT_TRUE: &str = "True";
pub const VERDICT_UNCERTAIN: &str = "Uncertain";

fn classification_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\*\*Final Classification\*\*:\s*(\w+)")
            .expect("verdict pattern is a valid regex")
    })
}

/// Extracts the classification label from a model response.
///
/// Matches the `**Final Classification**: <word>` marker the inference
/// collaborator emits and coarsens it: anything containing FAKE is "Fake",
/// TRUE or REAL is "True", and everything else (including no marker at all)
/// is "Uncertain".
pub fn extract_verdict(final_response: &str) -> String {
    let Some(captures) = classification_pattern().captures(final_response) else {
        return VERDICT_UNCERTAIN.to_string();
    };

    let word = captures[1].to_uppercase();
    if word.contains("FAKE") {
        VERDICT_FAKE.to_string()
    } else if word.contains("TRUE") || word.contains("REAL") {
        VERDICT_TRUE.to_string()
    } else {
        VERDICT_UNCERTAIN.to_string()
    }
}

/// Reads the inference artifact and extracts a verdict from its
/// `stage2_outputs.final_response` field. Any problem along the way
/// degrades to "Uncertain".
pub fn verdict_from_artifact(path: &Path) -> String {
    let Ok(raw) = std::fs::read_to_string(path) else {
        log::warn!(
            "Could not read inference artifact {}, verdict degrades to Uncertain",
            path.display()
        );
        return VERDICT_UNCERTAIN.to_string();
    };

    let Ok(result) = serde_json::from_str::<serde_json::Value>(&raw) else {
        log::warn!(
            "Inference artifact {} is not valid JSON, verdict degrades to Uncertain",
            path.display()
        );
        return VERDICT_UNCERTAIN.to_string();
    };

    let final_response = result
        .pointer("/stage2_outputs/final_response")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    extract_verdict(final_response)
}
