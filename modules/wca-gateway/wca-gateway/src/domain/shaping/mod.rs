//! Result shaping engine.
//!
//! Reduces a raw upstream document to the view a [`ShapingPolicy`] asks for. Shaping
//! is pure and deterministic: it validates the document against its class schema,
//! then only removes entries and fields. Retained values are copied verbatim and keep
//! their document order.

pub mod document;
mod listing;
mod person;
mod results;
pub mod rounds;

use std::io;
use std::num::NonZeroUsize;

use serde_json::Value;
use wca_gateway_sdk::{
    DetailLevel, FILTER_COMPETITION, FILTER_REGION, ResourceClass, ResourceIdentity,
    ShapedResult, ShapingPolicy,
};

use crate::domain::error::DomainError;
use document::{Document, Object};

/// Identity filters that narrow a document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filters<'a> {
    /// Championship region, lower-cased.
    pub region: Option<&'a str>,
    /// Competition id of a person's results.
    pub competition: Option<&'a str>,
}

impl<'a> Filters<'a> {
    #[must_use]
    pub fn of(identity: &'a ResourceIdentity) -> Self {
        Self {
            region: identity.filter(FILTER_REGION),
            competition: identity.filter(FILTER_COMPETITION),
        }
    }
}

/// Shape `raw` (a document of `class`) according to `policy`.
///
/// # Errors
/// - [`DomainError::Malformed`] when `raw` does not match the schema of `class`
/// - [`DomainError::RoundNotFound`] when the requested round is absent
pub fn shape(
    raw: &Value,
    class: ResourceClass,
    policy: &ShapingPolicy,
    filters: &Filters<'_>,
) -> Result<ShapedResult, DomainError> {
    let document = document::validate(class, raw)?;
    let (payload, omitted_count) = match (class, document) {
        (ResourceClass::CompetitionResults, Document::Listing(listing)) => {
            results::shape(listing, policy)?
        }
        (ResourceClass::PersonProfile, Document::Person(person)) => {
            person::shape(person, policy, filters)?
        }
        (ResourceClass::Ranking, Document::Listing(items)) => {
            listing::shape(items, policy, &listing::RANKING, filters)
        }
        (ResourceClass::Reference, Document::Listing(items)) => {
            listing::shape(items, policy, &listing::REFERENCE, filters)
        }
        (ResourceClass::CompetitionDetail, Document::Listing(items)) => {
            listing::shape(items, policy, &listing::COMPETITION, filters)
        }
        (ResourceClass::Championship, Document::Listing(items)) => {
            listing::shape(items, policy, &listing::CHAMPIONSHIP, filters)
        }
        (ResourceClass::CompetitionDetail, Document::Record(record)) => {
            listing::shape_record(record, policy, &listing::COMPETITION)
        }
        (ResourceClass::Championship, Document::Record(record)) => {
            listing::shape_record(record, policy, &listing::CHAMPIONSHIP)
        }
        (class, _) => {
            return Err(DomainError::malformed(format!(
                "unexpected document shape for class {class}"
            )));
        }
    };

    let omitted_size_bytes = json_len(raw).saturating_sub(json_len(&payload));
    Ok(ShapedResult {
        payload,
        omitted_count,
        omitted_size_bytes,
        truncated: omitted_count > 0 || omitted_size_bytes > 0,
    })
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compact JSON size of `value` in bytes.
fn json_len(value: &Value) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, value) {
        Ok(()) => counter.0,
        Err(_) => 0,
    }
}

/// Copy of `entry` at `detail`: everything, or only `summary_fields` in document order.
fn render(entry: &Object, detail: DetailLevel, summary_fields: &[&str]) -> Value {
    match detail {
        DetailLevel::Full => Value::Object(entry.clone()),
        DetailLevel::Summary => Value::Object(
            entry
                .iter()
                .filter(|(key, _)| summary_fields.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
    }
}

/// The `limit` best of `candidates` by `rank` (ascending, unranked last, document
/// order for ties), returned in document order.
fn top_indices<F>(candidates: &[usize], limit: Option<NonZeroUsize>, rank: F) -> Vec<usize>
where
    F: Fn(usize) -> Option<u64>,
{
    let Some(limit) = limit.map(NonZeroUsize::get) else {
        return candidates.to_vec();
    };
    if candidates.len() <= limit {
        return candidates.to_vec();
    }
    let mut ordered = candidates.to_vec();
    ordered.sort_by_key(|&index| {
        let rank = rank(index);
        (rank.is_none(), rank, index)
    });
    ordered.truncate(limit);
    ordered.sort_unstable();
    ordered
}
