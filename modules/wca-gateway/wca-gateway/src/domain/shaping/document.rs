//! Schema validation of raw upstream documents.
//!
//! Every raw document is checked against the schema of its class before any shaping
//! happens; a mismatch is reported as [`DomainError::Malformed`] naming the field.

use serde_json::{Map, Value};
use wca_gateway_sdk::ResourceClass;

use crate::domain::error::DomainError;

pub type Object = Map<String, Value>;

/// A paginated listing (`{pagination, total, items}`) or a bare array of objects.
#[derive(Debug, Clone, Copy)]
pub struct Listing<'a> {
    /// `None` for a bare array.
    pub envelope: Option<&'a Object>,
    pub items: &'a [Value],
}

impl<'a> Listing<'a> {
    /// The object at `index`; validation guarantees every item is an object.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<&'a Object> {
        let items: &'a [Value] = self.items;
        items.get(index).and_then(Value::as_object)
    }

    #[must_use]
    pub fn objects(&self) -> impl Iterator<Item = &'a Object> + 'a {
        let items: &'a [Value] = self.items;
        items.iter().filter_map(Value::as_object)
    }

    /// Rebuild the listing with `items` in place of the original ones.
    #[must_use]
    pub fn rebuild(&self, items: Vec<Value>) -> Value {
        match self.envelope {
            Some(envelope) => {
                let mut items = Some(items);
                let mut out = Object::with_capacity(envelope.len());
                for (key, value) in envelope {
                    if key == "items" {
                        out.insert(key.clone(), Value::Array(items.take().unwrap_or_default()));
                    } else {
                        out.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(out)
            }
            None => Value::Array(items),
        }
    }
}

/// A person document; `results` is `{competitionId: {eventId: [round, ...]}}`.
#[derive(Debug, Clone, Copy)]
pub struct PersonDocument<'a> {
    pub profile: &'a Object,
    pub results: &'a Object,
    /// Competition ids, oldest first. Empty when the document does not list them.
    pub competition_ids: &'a [Value],
}

/// A raw document after validation, tagged by shape.
#[derive(Debug, Clone, Copy)]
pub enum Document<'a> {
    Listing(Listing<'a>),
    Record(&'a Object),
    Person(PersonDocument<'a>),
}

/// Validate `raw` against the schema of `class`.
///
/// # Errors
/// [`DomainError::Malformed`] when a required field is missing or mistyped.
pub fn validate(class: ResourceClass, raw: &Value) -> Result<Document<'_>, DomainError> {
    match class {
        ResourceClass::CompetitionResults => {
            let listing = listing(raw)?;
            for (i, item) in listing.objects().enumerate() {
                require_str(item, "personId", i)?;
                require_str(item, "round", i)?;
                optional_integer(item, "position", i)?;
                optional_integer(item, "roundSequence", i)?;
            }
            Ok(Document::Listing(listing))
        }
        ResourceClass::Ranking => {
            let listing = listing(raw)?;
            for (i, item) in listing.objects().enumerate() {
                require_str(item, "personId", i)?;
                let rank = item
                    .get("rank")
                    .and_then(Value::as_object)
                    .ok_or_else(|| item_error(i, "rank", "an object"))?;
                if let Some(world) = rank.get("world")
                    && !world.is_null()
                    && !world.is_u64()
                {
                    return Err(item_error(i, "rank.world", "an integer"));
                }
            }
            Ok(Document::Listing(listing))
        }
        ResourceClass::Reference => Ok(Document::Listing(listing(raw)?)),
        ResourceClass::CompetitionDetail | ResourceClass::Championship => {
            if raw.get("items").is_some() || raw.is_array() {
                let listing = listing(raw)?;
                for (i, item) in listing.objects().enumerate() {
                    require_str(item, "id", i)?;
                }
                Ok(Document::Listing(listing))
            } else {
                let record = raw
                    .as_object()
                    .ok_or_else(|| DomainError::malformed("expected a JSON object"))?;
                if !record.get("id").is_some_and(Value::is_string) {
                    return Err(DomainError::malformed("field 'id' must be a string"));
                }
                Ok(Document::Record(record))
            }
        }
        ResourceClass::PersonProfile => person(raw).map(Document::Person),
    }
}

fn listing(raw: &Value) -> Result<Listing<'_>, DomainError> {
    let (envelope, items) = match raw {
        Value::Array(items) => (None, items),
        Value::Object(envelope) => {
            let items = envelope
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| DomainError::malformed("field 'items' must be an array"))?;
            (Some(envelope), items)
        }
        _ => {
            return Err(DomainError::malformed(
                "expected a listing object or an array",
            ));
        }
    };
    if let Some(i) = items.iter().position(|item| !item.is_object()) {
        return Err(DomainError::malformed(format!("items[{i}] must be an object")));
    }
    Ok(Listing {
        envelope,
        items: items.as_slice(),
    })
}

fn person(raw: &Value) -> Result<PersonDocument<'_>, DomainError> {
    let profile = raw
        .as_object()
        .ok_or_else(|| DomainError::malformed("expected a person object"))?;
    if !profile.get("id").is_some_and(Value::is_string) {
        return Err(DomainError::malformed("field 'id' must be a string"));
    }
    let results = profile
        .get("results")
        .and_then(Value::as_object)
        .ok_or_else(|| DomainError::malformed("field 'results' must be an object"))?;
    for (competition, events) in results {
        let events = events.as_object().ok_or_else(|| {
            DomainError::malformed(format!("results.{competition} must be an object"))
        })?;
        for (event, rounds) in events {
            let rounds = rounds.as_array().ok_or_else(|| {
                DomainError::malformed(format!("results.{competition}.{event} must be an array"))
            })?;
            for (i, row) in rounds.iter().enumerate() {
                if !row.get("round").is_some_and(Value::is_string) {
                    return Err(DomainError::malformed(format!(
                        "results.{competition}.{event}[{i}].round must be a string"
                    )));
                }
            }
        }
    }
    let competition_ids = match profile.get("competitionIds") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(ids)) if ids.iter().all(Value::is_string) => ids.as_slice(),
        Some(_) => {
            return Err(DomainError::malformed(
                "field 'competitionIds' must be an array of strings",
            ));
        }
    };
    Ok(PersonDocument {
        profile,
        results,
        competition_ids,
    })
}

fn item_error(index: usize, field: &str, expected: &str) -> DomainError {
    DomainError::malformed(format!("items[{index}].{field} must be {expected}"))
}

fn require_str(item: &Object, field: &str, index: usize) -> Result<(), DomainError> {
    if item.get(field).is_some_and(Value::is_string) {
        Ok(())
    } else {
        Err(item_error(index, field, "a string"))
    }
}

fn optional_integer(item: &Object, field: &str, index: usize) -> Result<(), DomainError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(v) if v.is_i64() || v.is_u64() => Ok(()),
        Some(_) => Err(item_error(index, field, "an integer")),
    }
}
