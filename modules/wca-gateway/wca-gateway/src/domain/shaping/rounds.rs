//! Round identification: sequence numbers, terminal rounds and selector matching.

use serde_json::Value;
use wca_gateway_sdk::RoundSelector;

use crate::domain::error::DomainError;
use crate::domain::shaping::document::Object;

/// Lower-cased round name without the trailing `round` (`"First round"` -> `"first"`).
fn normalize(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(" round") {
        Some(stem) => stem.trim_end().to_owned(),
        None => lower,
    }
}

/// Position of a round type in a WCA event, when the name is a known round type.
fn sequence_of_name(normalized: &str) -> Option<i64> {
    match normalized {
        "qualification" => Some(0),
        "first" | "combined first" => Some(1),
        "second" | "combined second" => Some(2),
        "semi final" => Some(3),
        "b final" => Some(4),
        "final" | "combined final" => Some(5),
        _ => None,
    }
}

fn is_terminal(normalized: &str) -> bool {
    matches!(normalized, "final" | "combined final")
}

fn round_name(row: &Object) -> &str {
    row.get("round").and_then(Value::as_str).unwrap_or_default()
}

/// Explicit `roundSequence` of the row, else the sequence implied by its name.
fn sequence_of(row: &Object, normalized: &str) -> Option<i64> {
    row.get("roundSequence")
        .and_then(Value::as_i64)
        .or_else(|| sequence_of_name(normalized))
}

/// Which rows of one event survive `selector`.
///
/// # Errors
/// [`DomainError::RoundNotFound`] for `final-only` when no row can be identified as
/// the terminal round (no final and no known sequence).
pub fn keep_mask(rows: &[&Object], selector: &RoundSelector) -> Result<Vec<bool>, DomainError> {
    match selector {
        RoundSelector::All => Ok(vec![true; rows.len()]),
        RoundSelector::Named(wanted) => {
            let wanted = normalize(wanted);
            Ok(rows
                .iter()
                .map(|row| normalize(round_name(row)) == wanted)
                .collect())
        }
        RoundSelector::FinalOnly => {
            if rows.is_empty() {
                return Ok(Vec::new());
            }
            let names: Vec<String> = rows.iter().map(|row| normalize(round_name(row))).collect();
            let chosen = terminal_round(rows, &names).ok_or_else(|| DomainError::RoundNotFound {
                round: selector.to_string(),
            })?;
            Ok(names.iter().map(|name| *name == chosen).collect())
        }
    }
}

/// Pick the terminal round among `rows` (with their normalized names).
///
/// Rounds named as finals win, the highest sequence breaking ties. Without a final,
/// the highest known sequence wins. Later rows win exact ties.
fn terminal_round(rows: &[&Object], names: &[String]) -> Option<String> {
    let candidates: Vec<(bool, Option<i64>, usize)> = rows
        .iter()
        .zip(names)
        .enumerate()
        .map(|(index, (row, name))| (is_terminal(name), sequence_of(row, name), index))
        .collect();

    let finals = candidates
        .iter()
        .filter(|(terminal, _, _)| *terminal)
        .max_by_key(|(_, sequence, index)| (*sequence, *index));
    let chosen = finals.or_else(|| {
        candidates
            .iter()
            .filter(|(_, sequence, _)| sequence.is_some())
            .max_by_key(|(_, sequence, index)| (*sequence, *index))
    })?;

    names.get(chosen.2).cloned()
}
