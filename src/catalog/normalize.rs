//! Turns one provider record into the canonical listing shape.
//!
//! Normalization never fails: anything missing or unreadable in the source is
//! simply absent in the output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Number;
use std::collections::{BTreeMap, HashSet};

use crate::catalog::types::{PriceDescriptor, RawAttribute, RawEmbedded, RawListing};
use crate::models::{Amenity, ListingFacts, NormalizedListing};

const SITE_ORIGIN: &str = "https://www.sreality.cz";
const API_PATH_PREFIX: &str = "/api/en/v2";
const CITY_TOKEN: &str = "Praha";

static DISTRICT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)praha\s*(\d+)").expect("district pattern is valid"));
static DECIMAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("decimal pattern is valid"));

const TRUTHY: &[&str] = &["yes", "ano", "true"];
const FURNISHED_TRUTHY: &[&str] = &["furnished", "zařízený"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fact {
    Ownership,
    Balcony,
    Terrace,
    PowerEfficiency,
    Elevator,
    UsableArea,
    Cellar,
    Furnished,
}

/// Lower-case English and Czech name fragments for each fact.
const FACT_KEYWORDS: &[(Fact, &[&str])] = &[
    (Fact::Ownership, &["ownership", "vlastnictví"]),
    (Fact::Balcony, &["balcony", "balkón"]),
    (Fact::Terrace, &["terrace", "terasa"]),
    (Fact::PowerEfficiency, &["energy", "energetic", "energetick"]),
    (Fact::Elevator, &["elevator", "výtah", "lift"]),
    (Fact::UsableArea, &["usable area", "užitná plocha", "floor area"]),
    (Fact::Cellar, &["cellar", "sklep", "basement"]),
    (Fact::Furnished, &["furnished", "zařízený", "furniture"]),
];

/// Build the canonical listing for one raw record.
pub fn normalize(raw: &RawListing) -> NormalizedListing {
    let detail = raw.detail.as_deref();

    let (price, price_note) = resolve_price(
        [
            (raw.price.as_ref(), raw.price_czk.as_ref()),
            (
                detail.and_then(|d| d.price.as_ref()),
                detail.and_then(|d| d.price_czk.as_ref()),
            ),
        ]
        .into_iter(),
    );

    let images = collect_images(
        [
            raw.embedded.as_ref(),
            detail.and_then(|d| d.embedded.as_ref()),
        ]
        .into_iter()
        .flatten(),
    );

    let attributes = raw
        .items
        .iter()
        .flatten()
        .chain(detail.and_then(|d| d.items.as_ref()).into_iter().flatten());
    let (amenities, facts) = extract_amenities(attributes);

    let locality = raw.locality.clone().unwrap_or_default();

    NormalizedListing {
        provider_id: raw.hash_id,
        name: raw.name.clone().unwrap_or_default(),
        category: raw.category,
        listing_type: raw.kind,
        price,
        price_note,
        district: derive_district(&locality),
        locality,
        description: raw.description.clone(),
        gps: raw.gps.as_ref().and_then(|gps| gps.coordinates()),
        images,
        amenities,
        facts,
        url: canonical_url(raw),
        raw_data: raw.source.clone(),
    }
}

/// First non-zero price wins, trying the direct field before the currency descriptor
/// of each source in turn. Only a descriptor-derived price carries a note.
fn resolve_price<'a, I>(sources: I) -> (Option<i64>, Option<String>)
where
    I: Iterator<Item = (Option<&'a Number>, Option<&'a PriceDescriptor>)>,
{
    for (direct, descriptor) in sources {
        if let Some(price) = direct.and_then(integer_price) {
            return (Some(price), None);
        }
        if let Some(descriptor) = descriptor {
            if let Some(price) = descriptor.value_raw.as_ref().and_then(integer_price) {
                return (Some(price), price_note(descriptor));
            }
        }
    }
    (None, None)
}

fn integer_price(number: &Number) -> Option<i64> {
    let value = number
        .as_i64()
        .or_else(|| number.as_u64().and_then(|v| i64::try_from(v).ok()))
        .or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })?;
    (value != 0).then_some(value)
}

fn price_note(descriptor: &PriceDescriptor) -> Option<String> {
    match (descriptor.name.as_deref(), descriptor.unit.as_deref()) {
        (Some(name), Some(unit)) => Some(format!("{name} ({unit})")),
        (Some(name), None) => Some(name.to_string()),
        (None, Some(unit)) => Some(format!("({unit})")),
        (None, None) => None,
    }
}

fn collect_images<'a, I>(blocks: I) -> Vec<String>
where
    I: Iterator<Item = &'a RawEmbedded>,
{
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for block in blocks {
        let hrefs = block
            .images
            .iter()
            .flatten()
            .filter_map(|img| img.links.as_ref()?.view.as_ref())
            .map(|view| view.href.as_str());

        for href in hrefs {
            if seen.insert(href) {
                images.push(href.to_string());
            }
        }
    }

    images
}

fn extract_amenities<'a, I>(attributes: I) -> (BTreeMap<String, Amenity>, ListingFacts)
where
    I: Iterator<Item = &'a RawAttribute>,
{
    let mut amenities = BTreeMap::new();
    let mut facts = ListingFacts::default();

    for attr in attributes {
        amenities.insert(
            attr.name.clone(),
            Amenity {
                value: attr.value.clone(),
                kind: attr.kind.clone(),
                unit: attr.unit.clone(),
            },
        );

        let name = attr.name.to_lowercase();
        let text = attr.value_text();
        let lowered = text.to_lowercase();

        for (fact, keywords) in FACT_KEYWORDS {
            if !keywords.iter().any(|kw| name.contains(kw)) {
                continue;
            }
            match fact {
                Fact::Ownership => facts.ownership_type = Some(text.clone()),
                Fact::PowerEfficiency => facts.power_efficiency = Some(text.clone()),
                Fact::Balcony => facts.has_balcony = Some(is_truthy(&lowered)),
                Fact::Terrace => facts.has_terrace = Some(is_truthy(&lowered)),
                Fact::Elevator => facts.has_elevator = Some(is_truthy(&lowered)),
                Fact::Cellar => facts.has_cellar = Some(is_truthy(&lowered)),
                Fact::Furnished => {
                    facts.is_furnished = Some(
                        is_truthy(&lowered) || FURNISHED_TRUTHY.contains(&lowered.as_str()),
                    )
                }
                Fact::UsableArea => {
                    if let Some(area) = first_decimal(&text) {
                        facts.usable_area = Some(area);
                    }
                }
            }
        }
    }

    (amenities, facts)
}

fn is_truthy(lowered: &str) -> bool {
    TRUTHY.contains(&lowered)
}

fn first_decimal(text: &str) -> Option<f64> {
    DECIMAL_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn derive_district(locality: &str) -> Option<String> {
    if !locality.contains(CITY_TOKEN) {
        return None;
    }
    match DISTRICT_PATTERN.captures(locality).and_then(|caps| caps.get(1)) {
        Some(code) => Some(format!("{CITY_TOKEN} {}", code.as_str())),
        None => Some(locality.to_string()),
    }
}

fn canonical_url(raw: &RawListing) -> String {
    match raw
        .links
        .as_ref()
        .and_then(|links| links.self_link.as_ref())
    {
        Some(link) => format!("{SITE_ORIGIN}{}", link.href.replacen(API_PATH_PREFIX, "", 1)),
        None => format!("{SITE_ORIGIN}/detail/{}", raw.hash_id),
    }
}
