//! Person documents: a profile plus results keyed by competition and event.

use std::collections::HashSet;

use serde_json::Value;
use wca_gateway_sdk::{RoundSelector, ShapingPolicy};

use super::document::{Object, PersonDocument};
use super::{Filters, render, rounds};
use crate::domain::error::DomainError;

const ROUND_SUMMARY_FIELDS: &[&str] = &["round", "position", "best", "average"];

pub(super) fn shape(
    person: PersonDocument<'_>,
    policy: &ShapingPolicy,
    filters: &Filters<'_>,
) -> Result<(Value, usize), DomainError> {
    let competitions = retained_competitions(&person, policy, filters);

    let mut omitted = 0;
    let mut rows_seen = false;
    let mut rows_kept = false;
    let mut results = Object::new();
    for (competition, events) in person.results {
        let Some(events) = events.as_object() else {
            continue;
        };
        if !competitions.contains(competition.as_str()) {
            omitted += events.values().filter_map(Value::as_array).map(Vec::len).sum::<usize>();
            continue;
        }

        let mut kept_events = Object::new();
        for (event, rows) in events {
            let rows: Vec<&Object> = rows
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_object)
                .collect();
            rows_seen |= !rows.is_empty();

            let mask = rounds::keep_mask(&rows, &policy.round)?;
            let kept: Vec<Value> = rows
                .iter()
                .zip(mask)
                .filter(|(_, keep)| *keep)
                .map(|(row, _)| render(row, policy.detail, ROUND_SUMMARY_FIELDS))
                .collect();
            omitted += rows.len() - kept.len();
            if !kept.is_empty() {
                rows_kept = true;
                kept_events.insert(event.clone(), Value::Array(kept));
            }
        }
        if !kept_events.is_empty() {
            results.insert(competition.clone(), Value::Object(kept_events));
        }
    }

    if let RoundSelector::Named(name) = &policy.round
        && rows_seen
        && !rows_kept
    {
        return Err(DomainError::RoundNotFound {
            round: name.clone(),
        });
    }

    let mut results = Some(results);
    let profile = person
        .profile
        .iter()
        .map(|(key, value)| {
            let value = results
                .take_if(|_| key == "results")
                .map_or_else(|| value.clone(), Value::Object);
            (key.clone(), value)
        })
        .collect();
    Ok((Value::Object(profile), omitted))
}

/// Competitions that survive the competition filter and the `max_entries` bound.
///
/// The bound keeps the most recent competitions, by position in `competitionIds`
/// (oldest first). Competitions missing from that list count as the oldest.
fn retained_competitions<'a>(
    person: &PersonDocument<'a>,
    policy: &ShapingPolicy,
    filters: &Filters<'_>,
) -> HashSet<&'a str> {
    let mut candidates: Vec<&'a str> = person
        .results
        .keys()
        .map(String::as_str)
        .filter(|id| filters.competition.is_none_or(|wanted| wanted == *id))
        .collect();

    if let Some(limit) = policy.max_entries.map(std::num::NonZeroUsize::get)
        && candidates.len() > limit
    {
        let recency = |id: &str| {
            person
                .competition_ids
                .iter()
                .position(|listed| listed.as_str() == Some(id))
        };
        // unlisted (None) sorts first, i.e. oldest
        candidates.sort_by_key(|id| recency(id));
        candidates.drain(..candidates.len() - limit);
    }
    candidates.into_iter().collect()
}
