//! Resource identities, kinds and classes.
//!
//! A [`ResourceIdentity`] names exactly one upstream document. Identities can only be
//! built through the typed constructors below, which normalize their inputs so that two
//! semantically equal requests always produce the same canonical string.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Resource class: decides the cache TTL and the shaping rules of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Events, countries, continents. Near-immutable.
    Reference,
    /// A competition document or a competition listing.
    CompetitionDetail,
    /// Round-by-round results of a competition.
    CompetitionResults,
    /// A person's full history.
    PersonProfile,
    /// A ranking list for one event, region and type.
    Ranking,
    /// A championship document or the championship listing.
    Championship,
}

impl ResourceClass {
    /// All classes, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Reference,
        Self::CompetitionDetail,
        Self::CompetitionResults,
        Self::PersonProfile,
        Self::Ranking,
        Self::Championship,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::CompetitionDetail => "competition_detail",
            Self::CompetitionResults => "competition_results",
            Self::PersonProfile => "person_profile",
            Self::Ranking => "ranking",
            Self::Championship => "championship",
        }
    }

    /// Whether documents of this class are organized in rounds.
    #[must_use]
    pub fn has_rounds(self) -> bool {
        matches!(self, Self::CompetitionResults | Self::PersonProfile)
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The upstream document family an identity points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Events,
    Countries,
    Continents,
    Competition,
    CompetitionsByDate,
    CompetitionsByEvent,
    CompetitionResults,
    CompetitionEventResults,
    Person,
    Ranking,
    Championships,
    Championship,
}

impl ResourceKind {
    /// Natural resource class of documents of this kind.
    #[must_use]
    pub fn class(self) -> ResourceClass {
        match self {
            Self::Events | Self::Countries | Self::Continents => ResourceClass::Reference,
            Self::Competition | Self::CompetitionsByDate | Self::CompetitionsByEvent => {
                ResourceClass::CompetitionDetail
            }
            Self::CompetitionResults | Self::CompetitionEventResults => {
                ResourceClass::CompetitionResults
            }
            Self::Person => ResourceClass::PersonProfile,
            Self::Ranking => ResourceClass::Ranking,
            Self::Championships | Self::Championship => ResourceClass::Championship,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Countries => "countries",
            Self::Continents => "continents",
            Self::Competition => "competition",
            Self::CompetitionsByDate => "competitions_by_date",
            Self::CompetitionsByEvent => "competitions_by_event",
            Self::CompetitionResults => "competition_results",
            Self::CompetitionEventResults => "competition_event_results",
            Self::Person => "person",
            Self::Ranking => "ranking",
            Self::Championships => "championships",
            Self::Championship => "championship",
        }
    }

    fn path_prefix(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Countries => "countries",
            Self::Continents => "continents",
            Self::Competition | Self::CompetitionsByDate | Self::CompetitionsByEvent => {
                "competitions"
            }
            Self::CompetitionResults | Self::CompetitionEventResults => "results",
            Self::Person => "persons",
            Self::Ranking => "rank",
            Self::Championships | Self::Championship => "championships",
        }
    }

    fn supports_filter(self, key: &str) -> bool {
        matches!(
            (self, key),
            (Self::Championships, FILTER_REGION) | (Self::Person, FILTER_COMPETITION)
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter restricting the championship listing to one region.
pub const FILTER_REGION: &str = "region";

/// Filter restricting a person's results to one competition.
pub const FILTER_COMPETITION: &str = "competition";

#[derive(Debug, Clone, Copy)]
enum Case {
    Preserve,
    Lower,
    Upper,
}

/// Canonical identity of one upstream document.
///
/// Equality and hashing use the normalized components, so `person(" 2003sear02 ")`
/// and `person("2003SEAR02")` are the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    kind: ResourceKind,
    segments: Vec<String>,
    filters: BTreeMap<String, String>,
    canonical: String,
}

impl ResourceIdentity {
    fn build(kind: ResourceKind, segments: Vec<String>) -> Self {
        let mut identity = Self {
            kind,
            segments,
            filters: BTreeMap::new(),
            canonical: String::new(),
        };
        identity.canonical = identity.render_canonical();
        identity
    }

    fn render_canonical(&self) -> String {
        let mut out = self.kind.as_str().to_owned();
        if !self.segments.is_empty() {
            out.push(':');
            out.push_str(&self.segments.join("/"));
        }
        if !self.filters.is_empty() {
            let query = self
                .filters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            out.push('?');
            out.push_str(&query);
        }
        out
    }

    /// All official events.
    #[must_use]
    pub fn events() -> Self {
        Self::build(ResourceKind::Events, Vec::new())
    }

    /// All countries.
    #[must_use]
    pub fn countries() -> Self {
        Self::build(ResourceKind::Countries, Vec::new())
    }

    /// All continents.
    #[must_use]
    pub fn continents() -> Self {
        Self::build(ResourceKind::Continents, Vec::new())
    }

    /// One competition by id (e.g. `WC2023`). Competition ids keep their case.
    ///
    /// # Errors
    /// `BadRequest` when the id is empty or contains unsupported characters.
    pub fn competition(competition_id: &str) -> Result<Self, GatewayError> {
        let kind = ResourceKind::Competition;
        let id = normalize_segment(kind, "competition id", competition_id, Case::Preserve)?;
        Ok(Self::build(kind, vec![id]))
    }

    /// Competitions held on a given date.
    ///
    /// # Errors
    /// `BadRequest` when the date components are out of range.
    pub fn competitions_by_date(year: u32, month: u32, day: u32) -> Result<Self, GatewayError> {
        let kind = ResourceKind::CompetitionsByDate;
        let raw = format!("{year}-{month}-{day}");
        if !(1000..=9999).contains(&year) {
            return Err(bad_input(kind, &raw, "year must have four digits"));
        }
        if !(1..=12).contains(&month) {
            return Err(bad_input(kind, &raw, "month must be within 1..=12"));
        }
        if !(1..=31).contains(&day) {
            return Err(bad_input(kind, &raw, "day must be within 1..=31"));
        }
        Ok(Self::build(
            kind,
            vec![
                format!("{year:04}"),
                format!("{month:02}"),
                format!("{day:02}"),
            ],
        ))
    }

    /// One page of the competitions featuring an event.
    ///
    /// # Errors
    /// `BadRequest` when the event id is invalid or `page` is zero.
    pub fn competitions_by_event(event_id: &str, page: u32) -> Result<Self, GatewayError> {
        let kind = ResourceKind::CompetitionsByEvent;
        let event = normalize_segment(kind, "event id", event_id, Case::Lower)?;
        if page == 0 {
            return Err(bad_input(kind, event_id, "page is 1-based"));
        }
        Ok(Self::build(kind, vec![event, page.to_string()]))
    }

    /// All results of a competition.
    ///
    /// # Errors
    /// `BadRequest` when the competition id is invalid.
    pub fn competition_results(competition_id: &str) -> Result<Self, GatewayError> {
        let kind = ResourceKind::CompetitionResults;
        let id = normalize_segment(kind, "competition id", competition_id, Case::Preserve)?;
        Ok(Self::build(kind, vec![id]))
    }

    /// Results of one event within a competition.
    ///
    /// # Errors
    /// `BadRequest` when either id is invalid.
    pub fn competition_event_results(
        competition_id: &str,
        event_id: &str,
    ) -> Result<Self, GatewayError> {
        let kind = ResourceKind::CompetitionEventResults;
        let id = normalize_segment(kind, "competition id", competition_id, Case::Preserve)?;
        let event = normalize_segment(kind, "event id", event_id, Case::Lower)?;
        Ok(Self::build(kind, vec![id, event]))
    }

    /// A person by WCA id (e.g. `2003SEAR02`). WCA ids are upper-cased.
    ///
    /// # Errors
    /// `BadRequest` unless the id is exactly ten ASCII alphanumerics.
    pub fn person(wca_id: &str) -> Result<Self, GatewayError> {
        let kind = ResourceKind::Person;
        let id = normalize_segment(kind, "WCA id", wca_id, Case::Upper)?;
        if id.len() != 10 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(bad_input(kind, wca_id, "WCA id must be 10 alphanumeric characters"));
        }
        Ok(Self::build(kind, vec![id]))
    }

    /// Ranking of an event for a region (`world`, a continent id or an ISO2 country code)
    /// and a ranking type (`single` or `average`).
    ///
    /// # Errors
    /// `BadRequest` when any component is invalid.
    pub fn ranking(region: &str, ranking_type: &str, event_id: &str) -> Result<Self, GatewayError> {
        let kind = ResourceKind::Ranking;
        let region = normalize_region(kind, region)?;
        let ranking_type = normalize_segment(kind, "ranking type", ranking_type, Case::Lower)?;
        if ranking_type != "single" && ranking_type != "average" {
            return Err(bad_input(
                kind,
                &ranking_type,
                "ranking type must be 'single' or 'average'",
            ));
        }
        let event = normalize_segment(kind, "event id", event_id, Case::Lower)?;
        Ok(Self::build(kind, vec![region, ranking_type, event]))
    }

    /// The championship listing. Use [`Self::with_filter`] with [`FILTER_REGION`] to
    /// restrict it to one region.
    #[must_use]
    pub fn championships() -> Self {
        Self::build(ResourceKind::Championships, Vec::new())
    }

    /// One championship by id.
    ///
    /// # Errors
    /// `BadRequest` when the id is invalid.
    pub fn championship(championship_id: &str) -> Result<Self, GatewayError> {
        let kind = ResourceKind::Championship;
        let id = normalize_segment(kind, "championship id", championship_id, Case::Preserve)?;
        Ok(Self::build(kind, vec![id]))
    }

    /// Attach an optional filter. Keys are case-folded; order of attachment never
    /// changes the resulting identity.
    ///
    /// # Errors
    /// `BadRequest` when the filter is not supported by this kind or the value is invalid.
    pub fn with_filter(mut self, key: &str, value: &str) -> Result<Self, GatewayError> {
        let key = key.trim().to_ascii_lowercase();
        if !self.kind.supports_filter(&key) {
            return Err(GatewayError::bad_request(
                self.canonical.clone(),
                format!("filter '{key}' is not supported for {}", self.kind),
            ));
        }
        let value = match key.as_str() {
            FILTER_REGION => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(GatewayError::bad_request(
                        self.canonical.clone(),
                        "region filter must not be empty",
                    ));
                }
                trimmed.to_lowercase()
            }
            _ => normalize_segment(self.kind, "competition id", value, Case::Preserve)?,
        };
        self.filters.insert(key, value);
        self.canonical = self.render_canonical();
        Ok(self)
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Natural class of this identity.
    #[must_use]
    pub fn class(&self) -> ResourceClass {
        self.kind.class()
    }

    /// Canonical string form, stable across processes.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Value of an attached filter.
    #[must_use]
    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).map(String::as_str)
    }

    /// Path of the upstream document, relative to the upstream base location.
    #[must_use]
    pub fn upstream_path(&self) -> String {
        match (self.kind, self.segments.as_slice()) {
            (ResourceKind::CompetitionsByEvent, [event, page]) if page == "1" => {
                format!("competitions/{event}.json")
            }
            (ResourceKind::CompetitionsByEvent, [event, page]) => {
                format!("competitions/{event}-page-{page}.json")
            }
            (kind, []) => format!("{}.json", kind.path_prefix()),
            (kind, segments) => format!("{}/{}.json", kind.path_prefix(), segments.join("/")),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn bad_input(kind: ResourceKind, raw: &str, reason: impl Into<String>) -> GatewayError {
    GatewayError::bad_request(format!("{kind}:{}", raw.trim()), reason)
}

fn normalize_segment(
    kind: ResourceKind,
    field: &str,
    raw: &str,
    case: Case,
) -> Result<String, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(bad_input(kind, raw, format!("{field} must not be empty")));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(bad_input(
            kind,
            raw,
            format!("{field} contains unsupported characters"),
        ));
    }
    Ok(match case {
        Case::Preserve => trimmed.to_owned(),
        Case::Lower => trimmed.to_ascii_lowercase(),
        Case::Upper => trimmed.to_ascii_uppercase(),
    })
}

fn normalize_region(kind: ResourceKind, raw: &str) -> Result<String, GatewayError> {
    let region = normalize_segment(kind, "region", raw, Case::Preserve)?;
    if region.eq_ignore_ascii_case("world") {
        return Ok("world".to_owned());
    }
    if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(region.to_ascii_uppercase());
    }
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_requests_normalize_to_same_identity() {
        let a = ResourceIdentity::person(" 2003sear02 ").unwrap();
        let b = ResourceIdentity::person("2003SEAR02").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "person:2003SEAR02");

        let a = ResourceIdentity::ranking("World", "SINGLE", "333BF").unwrap();
        let b = ResourceIdentity::ranking("world", "single", "333bf").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.upstream_path(), "rank/world/single/333bf.json");
    }

    #[test]
    fn competition_ids_keep_case() {
        let id = ResourceIdentity::competition_event_results("CubingUSANationals2024", "333")
            .unwrap();
        assert_eq!(
            id.upstream_path(),
            "results/CubingUSANationals2024/333.json"
        );
        assert_eq!(
            id.canonical(),
            "competition_event_results:CubingUSANationals2024/333"
        );
        assert_eq!(id.class(), ResourceClass::CompetitionResults);
    }

    #[test]
    fn upstream_paths_follow_static_api_layout() {
        assert_eq!(ResourceIdentity::events().upstream_path(), "events.json");
        assert_eq!(
            ResourceIdentity::championships().upstream_path(),
            "championships.json"
        );
        assert_eq!(
            ResourceIdentity::competitions_by_date(2024, 3, 5)
                .unwrap()
                .upstream_path(),
            "competitions/2024/03/05.json"
        );
        assert_eq!(
            ResourceIdentity::competitions_by_event("333", 1)
                .unwrap()
                .upstream_path(),
            "competitions/333.json"
        );
        assert_eq!(
            ResourceIdentity::competitions_by_event("333", 3)
                .unwrap()
                .upstream_path(),
            "competitions/333-page-3.json"
        );
        assert_eq!(
            ResourceIdentity::ranking("us", "average", "222")
                .unwrap()
                .upstream_path(),
            "rank/US/average/222.json"
        );
    }

    #[test]
    fn invalid_inputs_are_bad_requests() {
        assert!(matches!(
            ResourceIdentity::person("123"),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(matches!(
            ResourceIdentity::competition("../secrets"),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(matches!(
            ResourceIdentity::competitions_by_date(2024, 13, 1),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(matches!(
            ResourceIdentity::competitions_by_event("333", 0),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(matches!(
            ResourceIdentity::ranking("world", "best", "333"),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(matches!(
            ResourceIdentity::competition("   "),
            Err(GatewayError::BadRequest { .. })
        ));
    }

    #[test]
    fn filters_are_canonical_and_validated() {
        let a = ResourceIdentity::championships()
            .with_filter(" Region ", "Europe")
            .unwrap();
        let b = ResourceIdentity::championships()
            .with_filter("region", "europe")
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "championships?region=europe");
        assert_eq!(a.filter(FILTER_REGION), Some("europe"));
        assert_eq!(a.upstream_path(), "championships.json");

        let unsupported = ResourceIdentity::events().with_filter("region", "world");
        assert!(matches!(
            unsupported,
            Err(GatewayError::BadRequest { .. })
        ));

        let person = ResourceIdentity::person("2003SEAR02")
            .unwrap()
            .with_filter("competition", "WC2023")
            .unwrap();
        assert_eq!(person.canonical(), "person:2003SEAR02?competition=WC2023");
        assert_ne!(person, ResourceIdentity::person("2003SEAR02").unwrap());
    }

    #[test]
    fn kinds_map_to_classes() {
        assert_eq!(ResourceKind::Countries.class(), ResourceClass::Reference);
        assert_eq!(
            ResourceKind::CompetitionsByDate.class(),
            ResourceClass::CompetitionDetail
        );
        assert_eq!(ResourceKind::Championships.class(), ResourceClass::Championship);
        assert!(ResourceClass::CompetitionResults.has_rounds());
        assert!(!ResourceClass::Ranking.has_rounds());
    }
}
