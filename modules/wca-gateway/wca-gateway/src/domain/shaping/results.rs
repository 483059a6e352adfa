//! Competition result listings: one row per person and round, grouped by event.

use std::collections::HashMap;

use serde_json::Value;
use wca_gateway_sdk::{RoundSelector, ShapingPolicy};

use super::document::{Listing, Object};
use super::{render, rounds, top_indices};
use crate::domain::error::DomainError;

const SUMMARY_FIELDS: &[&str] = &["personId", "eventId", "round", "position", "best", "average"];

pub(super) fn shape(
    listing: Listing<'_>,
    policy: &ShapingPolicy,
) -> Result<(Value, usize), DomainError> {
    let rows: Vec<&Object> = listing.objects().collect();

    let mut events: HashMap<Option<&str>, Vec<usize>> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        let event = row.get("eventId").and_then(Value::as_str);
        events.entry(event).or_default().push(index);
    }

    let mut keep = vec![false; rows.len()];
    for indices in events.values() {
        let group: Vec<&Object> = indices.iter().map(|&i| rows[i]).collect();
        let mask = rounds::keep_mask(&group, &policy.round)?;
        for (&index, kept) in indices.iter().zip(mask) {
            keep[index] = kept;
        }
    }

    if let RoundSelector::Named(name) = &policy.round
        && !rows.is_empty()
        && !keep.contains(&true)
    {
        return Err(DomainError::RoundNotFound {
            round: name.clone(),
        });
    }

    let selected: Vec<usize> = (0..rows.len()).filter(|&i| keep[i]).collect();
    let retained = top_indices(&selected, policy.max_entries, |i| {
        rows[i].get("position").and_then(Value::as_u64)
    });

    let items = retained
        .iter()
        .map(|&i| render(rows[i], policy.detail, SUMMARY_FIELDS))
        .collect();
    Ok((listing.rebuild(items), rows.len() - retained.len()))
}
