//! Round-less listings and records: reference data, rankings, competitions and
//! championships.

use serde_json::Value;
use wca_gateway_sdk::ShapingPolicy;

use super::document::{Listing, Object};
use super::{Filters, render, top_indices};

/// Per-class shaping rules for round-less documents.
pub(super) struct Rules {
    summary_fields: &'static [&'static str],
    /// Truncation key; `None` keeps document order.
    rank: Option<fn(&Object) -> Option<u64>>,
}

pub(super) const REFERENCE: Rules = Rules {
    summary_fields: &["id", "iso2Code", "name"],
    rank: None,
};

pub(super) const RANKING: Rules = Rules {
    summary_fields: &["personId", "best", "rank"],
    rank: Some(world_rank),
};

pub(super) const COMPETITION: Rules = Rules {
    summary_fields: &[
        "id",
        "name",
        "city",
        "country",
        "date",
        "isCanceled",
        "events",
    ],
    rank: None,
};

pub(super) const CHAMPIONSHIP: Rules = Rules {
    summary_fields: &[
        "id",
        "name",
        "city",
        "country",
        "date",
        "isCanceled",
        "events",
        "region",
    ],
    rank: None,
};

fn world_rank(item: &Object) -> Option<u64> {
    item.get("rank")?.get("world")?.as_u64()
}

fn in_region(item: &Object, region: &str) -> bool {
    item.get("region")
        .and_then(Value::as_str)
        .is_some_and(|value| value.to_lowercase() == region)
}

pub(super) fn shape(
    listing: Listing<'_>,
    policy: &ShapingPolicy,
    rules: &Rules,
    filters: &Filters<'_>,
) -> (Value, usize) {
    let total = listing.items.len();
    let candidates: Vec<usize> = (0..total)
        .filter(|&i| {
            filters
                .region
                .is_none_or(|region| listing.item(i).is_some_and(|item| in_region(item, region)))
        })
        .collect();

    let retained = top_indices(&candidates, policy.max_entries, |i| {
        rules.rank.and_then(|rank| listing.item(i).and_then(rank))
    });

    let items = retained
        .iter()
        .filter_map(|&i| listing.item(i))
        .map(|item| render(item, policy.detail, rules.summary_fields))
        .collect();
    (listing.rebuild(items), total - retained.len())
}

/// A single record has no entries to drop; only its fields are reduced.
pub(super) fn shape_record(
    record: &Object,
    policy: &ShapingPolicy,
    rules: &Rules,
) -> (Value, usize) {
    (render(record, policy.detail, rules.summary_fields), 0)
}
