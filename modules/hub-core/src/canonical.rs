//! `canonical.listing@1.0`: the stable contract every inbound adapter
//! produces and every outbound projection consumes.
//!
//! Grounded field-for-field on
//! `original_source/app/canonical/v1/{listing,media,party}.py`. The Python
//! original validates with pydantic at construction time; here deserialization
//! only checks shape (types, required fields) and `validate_canonical` runs
//! the semantic checks afterward, collecting every violation rather than
//! failing fast on the first one, since partner payloads are often wrong in
//! more than one place at once and a single round-trip should show all of
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA: &str = "canonical.listing";
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyV1 {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Minor units (e.g. cents).
    pub amount: i64,
}

fn default_currency() -> String {
    "GBP".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceRuleKind {
    Fixed,
    TimedOffer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRuleV1 {
    #[serde(default = "price_rule_default_kind")]
    pub kind: PriceRuleKind,
    pub price: MoneyV1,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn price_rule_default_kind() -> PriceRuleKind {
    PriceRuleKind::Fixed
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressV1 {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub area: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    Apartment,
    House,
    Villa,
    Land,
    Commercial,
    Other,
}

impl Default for PropertyCategory {
    fn default() -> Self {
        Self::Other
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionStatus {
    Existing,
    UnderConstruction,
    OffPlan,
}

impl Default for ConstructionStatus {
    fn default() -> Self {
        Self::Existing
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyV1 {
    #[serde(default)]
    pub category: PropertyCategory,
    pub subtype: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area_m2: Option<i32>,
    pub lot_m2: Option<i32>,
    #[serde(default)]
    pub construction_status: ConstructionStatus,
    pub year_built: Option<i32>,
    pub completion_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RentPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl Default for RentPeriod {
    fn default() -> Self {
        Self::Month
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentV1 {
    pub price: MoneyV1,
    #[serde(default)]
    pub period: RentPeriod,
    pub deposit: Option<MoneyV1>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Floorplan,
    Document,
}

impl Default for MediaType {
    fn default() -> Self {
        Self::Image
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaV1 {
    pub id: String,
    #[serde(default)]
    #[serde(rename = "type")]
    pub kind: MediaType,
    pub url: String,
    #[serde(default)]
    pub order: i32,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Agent,
    Owner,
    Developer,
    Agency,
}

impl Default for PartyRole {
    fn default() -> Self {
        Self::Agent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyV1 {
    pub id: String,
    #[serde(default)]
    pub role: PartyRole,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub external_ids: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Active,
    Pending,
    Sold,
    Withdrawn,
}

impl Default for ListingStatus {
    fn default() -> Self {
        Self::Draft
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Sale,
    Rent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCanonicalV1 {
    #[serde(default = "schema_field")]
    pub schema: String,
    #[serde(default = "schema_version_field")]
    pub schema_version: String,

    pub canonical_id: String,
    pub source_listing_id: Option<String>,

    #[serde(default)]
    pub status: ListingStatus,
    pub purpose: Purpose,

    pub title: String,
    pub description: Option<String>,

    #[serde(default)]
    pub address: AddressV1,
    #[serde(default)]
    pub property: PropertyV1,

    pub list_price: Option<MoneyV1>,
    pub rent: Option<RentV1>,
    #[serde(default)]
    pub pricing_rules: Vec<PriceRuleV1>,

    pub agent: Option<PartyV1>,
    pub owner: Option<PartyV1>,

    #[serde(default)]
    pub media: Vec<MediaV1>,

    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

fn schema_field() -> String {
    SCHEMA.to_string()
}

fn schema_version_field() -> String {
    SCHEMA_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn validate_money(field: &str, money: &MoneyV1, errors: &mut Vec<ValidationError>) {
    if money.currency.len() != 3 || !money.currency.chars().all(|c| c.is_ascii_uppercase()) {
        errors.push(ValidationError::new(
            format!("{field}.currency"),
            "currency must be a 3-letter uppercase ISO 4217 code",
        ));
    }
    if money.amount < 0 {
        errors.push(ValidationError::new(
            format!("{field}.amount"),
            "amount must be non-negative",
        ));
    }
}

/// Validate structural and semantic constraints against an already-parsed
/// canonical listing, returning every violation found (never short-circuits
/// on the first one).
pub fn validate_semantics(listing: &ListingCanonicalV1) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if listing.schema != SCHEMA {
        errors.push(ValidationError::new("schema", "must be 'canonical.listing'"));
    }
    if listing.schema_version != SCHEMA_VERSION {
        errors.push(ValidationError::new("schema_version", "must be '1.0'"));
    }
    if listing.canonical_id.is_empty() || listing.canonical_id.len() > 80 {
        errors.push(ValidationError::new(
            "canonical_id",
            "must be 1-80 characters",
        ));
    }
    if listing.title.is_empty() || listing.title.len() > 200 {
        errors.push(ValidationError::new("title", "must be 1-200 characters"));
    }

    if let Some(lat) = listing.address.lat {
        if !(-90.0..=90.0).contains(&lat) {
            errors.push(ValidationError::new("address.lat", "must be between -90 and 90"));
        }
    }
    if let Some(lng) = listing.address.lng {
        if !(-180.0..=180.0).contains(&lng) {
            errors.push(ValidationError::new(
                "address.lng",
                "must be between -180 and 180",
            ));
        }
    }

    for bound_field in [
        ("property.bedrooms", listing.property.bedrooms),
        ("property.bathrooms", listing.property.bathrooms),
    ] {
        if let (field, Some(v)) = bound_field {
            if !(0..=100).contains(&v) {
                errors.push(ValidationError::new(field, "must be between 0 and 100"));
            }
        }
    }
    for year_field in [
        ("property.year_built", listing.property.year_built),
        ("property.completion_year", listing.property.completion_year),
    ] {
        if let (field, Some(v)) = year_field {
            if !(1600..=3000).contains(&v) {
                errors.push(ValidationError::new(field, "must be between 1600 and 3000"));
            }
        }
    }
    if matches!(
        listing.property.construction_status,
        ConstructionStatus::UnderConstruction | ConstructionStatus::OffPlan
    ) && listing.property.completion_year.is_none()
    {
        errors.push(ValidationError::new(
            "property.completion_year",
            "required when construction_status is under_construction or off_plan",
        ));
    }

    if let Some(price) = &listing.list_price {
        validate_money("list_price", price, &mut errors);
    }
    if let Some(rent) = &listing.rent {
        validate_money("rent.price", &rent.price, &mut errors);
        if let Some(deposit) = &rent.deposit {
            validate_money("rent.deposit", deposit, &mut errors);
        }
    }
    for (i, rule) in listing.pricing_rules.iter().enumerate() {
        validate_money(&format!("pricing_rules[{i}].price"), &rule.price, &mut errors);
        if rule.kind == PriceRuleKind::TimedOffer {
            match (rule.starts_at, rule.ends_at) {
                (Some(s), Some(e)) if s < e => {}
                (Some(_), Some(_)) => errors.push(ValidationError::new(
                    format!("pricing_rules[{i}]"),
                    "timed_offer requires starts_at < ends_at",
                )),
                _ => errors.push(ValidationError::new(
                    format!("pricing_rules[{i}]"),
                    "timed_offer requires starts_at and ends_at",
                )),
            }
        }
    }

    if listing.purpose == Purpose::Rent && listing.rent.is_none() && listing.list_price.is_none() {
        errors.push(ValidationError::new(
            "rent",
            "purpose='rent' requires rent or list_price",
        ));
    }

    for (i, media) in listing.media.iter().enumerate() {
        if media.id.is_empty() || media.id.len() > 80 {
            errors.push(ValidationError::new(
                format!("media[{i}].id"),
                "must be 1-80 characters",
            ));
        }
        match url::Url::parse(&media.url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            _ => errors.push(ValidationError::new(format!("media[{i}].url"), "must be a valid URL")),
        }
    }

    errors
}

/// Normalize a validated listing for stable hashing and idempotent
/// re-ingest: sort media by `(order, id)`, the one normalization the
/// original applies unconditionally regardless of validation outcome.
pub fn normalize(listing: &mut ListingCanonicalV1) {
    listing.media.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

/// Parse and validate a canonical listing from JSON, collecting every
/// violation. A shape-level deserialize failure (wrong type, missing
/// required field) surfaces as a single `_schema` error rather than a panic.
pub fn validate_canonical(
    value: &serde_json::Value,
) -> Result<ListingCanonicalV1, Vec<ValidationError>> {
    let mut listing: ListingCanonicalV1 = serde_json::from_value(value.clone())
        .map_err(|e| vec![ValidationError::new("_schema", e.to_string())])?;

    let errors = validate_semantics(&listing);
    if !errors.is_empty() {
        return Err(errors);
    }

    normalize(&mut listing);
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_listing() -> serde_json::Value {
        json!({
            "canonical_id": "lst_1",
            "purpose": "sale",
            "title": "Nice flat",
            "list_price": {"currency": "GBP", "amount": 250000},
        })
    }

    #[test]
    fn accepts_minimal_valid_listing() {
        let parsed = validate_canonical(&minimal_listing());
        assert!(parsed.is_ok(), "{:?}", parsed.err());
    }

    #[test]
    fn rejects_rent_purpose_without_price() {
        let mut v = minimal_listing();
        v["purpose"] = json!("rent");
        v.as_object_mut().unwrap().remove("list_price");
        let errors = validate_canonical(&v).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "rent"));
    }

    #[test]
    fn rejects_under_construction_without_completion_year() {
        let mut v = minimal_listing();
        v["property"] = json!({"construction_status": "under_construction"});
        let errors = validate_canonical(&v).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.field == "property.completion_year"));
    }

    #[test]
    fn normalizes_media_order() {
        let mut v = minimal_listing();
        v["media"] = json!([
            {"id": "b", "url": "https://x.test/b.jpg", "order": 0},
            {"id": "a", "url": "https://x.test/a.jpg", "order": 0},
        ]);
        let parsed = validate_canonical(&v).unwrap();
        assert_eq!(parsed.media[0].id, "a");
        assert_eq!(parsed.media[1].id, "b");
    }
}
