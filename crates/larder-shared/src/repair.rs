//! Text repair: strips flagged claims from a response.
//!
//! Works line by line. A line "mentions" a claim when the claim's normalized
//! key occurs as a whole-word run in the line's normalized text. Every line
//! mentioning a flagged claim is dropped. The repair is rejected when a
//! flagged claim cannot be found, when one still shows up afterwards, or when
//! no retained claim survives in the remainder.

use crate::claims::Claim;
use crate::normalize::{normalize_key, tokens};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepairError {
    #[error("flagged claim not found in text: {0}")]
    NotLocated(String),

    #[error("flagged claim still present after repair: {0}")]
    StillPresent(String),

    #[error("nothing grounded left after repair")]
    NothingLeft,
}

/// A successfully repaired text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub text: String,
    pub removed_lines: usize,
}

fn mentions(normalized_line: &str, key: &str) -> bool {
    let needle = tokens(key);
    if needle.is_empty() {
        return false;
    }
    let hay = tokens(normalized_line);
    needle.len() <= hay.len() && hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Remove every line mentioning a `flagged` claim, keeping at least one of `kept`.
pub fn strip_claims(text: &str, flagged: &[Claim], kept: &[Claim]) -> Result<Repaired, RepairError> {
    let lines: Vec<(&str, String)> = text.lines().map(|l| (l, normalize_key(l))).collect();

    for claim in flagged {
        if !lines.iter().any(|(_, norm)| mentions(norm, &claim.key)) {
            return Err(RepairError::NotLocated(claim.text.clone()));
        }
    }

    let mut removed_lines = 0;
    let mut remaining: Vec<&str> = Vec::with_capacity(lines.len());
    for (raw, norm) in &lines {
        if flagged.iter().any(|c| mentions(norm, &c.key)) {
            removed_lines += 1;
        } else {
            remaining.push(*raw);
        }
    }

    let repaired = collapse_blank_runs(&remaining);
    let normalized: Vec<String> = repaired.lines().map(normalize_key).collect();

    if let Some(claim) = flagged
        .iter()
        .find(|c| normalized.iter().any(|line| mentions(line, &c.key)))
    {
        return Err(RepairError::StillPresent(claim.text.clone()));
    }

    let survivor = kept
        .iter()
        .any(|c| normalized.iter().any(|line| mentions(line, &c.key)));
    if repaired.trim().is_empty() || !survivor {
        return Err(RepairError::NothingLeft);
    }

    Ok(Repaired {
        text: repaired,
        removed_lines,
    })
}

/// Join lines, squeezing the blank runs left behind by removals.
fn collapse_blank_runs(lines: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for &line in lines {
        let blank = line.trim().is_empty();
        if blank && out.last().map_or(true, |l| l.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = "Tomato Salad\n\nIngredients:\n- 2 tomatoes\n- 1 onion\n- 100g feta cheese\n\nSlice everything and toss.";

    #[test]
    fn strips_flagged_lines_only() {
        let repaired = strip_claims(
            RECIPE,
            &[Claim::ingredient("feta cheese")],
            &[Claim::ingredient("tomato"), Claim::ingredient("onion")],
        )
        .unwrap();
        assert_eq!(repaired.removed_lines, 1);
        assert!(!repaired.text.to_lowercase().contains("feta"));
        assert!(repaired.text.contains("- 1 onion"));
        assert!(repaired.text.contains("Slice everything"));
    }

    #[test]
    fn missing_claim_is_not_located() {
        let err = strip_claims(RECIPE, &[Claim::ingredient("ham")], &[Claim::ingredient("tomato")])
            .unwrap_err();
        assert_eq!(err, RepairError::NotLocated("ham".to_string()));
    }

    #[test]
    fn nothing_left_when_only_line_removed() {
        let err = strip_claims(
            "Use tomato and cheese.",
            &[Claim::ingredient("cheese")],
            &[Claim::ingredient("tomato")],
        )
        .unwrap_err();
        assert_eq!(err, RepairError::NothingLeft);
    }

    #[test]
    fn word_bounded_mentions() {
        assert!(mentions("100g feta cheese", "cheese"));
        assert!(!mentions("graham cracker", "ham"));
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_runs(&["a", "", "", "b", ""]), "a\n\nb");
    }
}
