//! Feed format plugins (C10): canonical listings -> destination-specific
//! feed bytes. Grounded on `original_source/app/destinations/feeds/base.py`
//! (`HostedFeedPlugin.build`), `app/services/feed_generator.py` (generic XML),
//! and `app/services/feeds/evler101_xml.py` (tag/picture XML for a named
//! destination with its own schema).

use std::collections::HashMap;

use hub_core::ListingCanonicalV1;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

#[derive(Debug, Clone)]
pub struct FeedWarning {
    pub listing_id: String,
    pub code: String,
    pub message: String,
}

/// A listing that never reached the feed body, with why. Distinct from
/// `FeedWarning`, which covers listings that ARE in the feed but with a
/// degraded field (e.g. a missing area mapping).
#[derive(Debug, Clone)]
pub struct FeedSkip {
    pub listing_id: String,
    pub reason: String,
}

pub struct FeedBuildOutput {
    pub bytes: Vec<u8>,
    pub listing_count: usize,
    pub warnings: Vec<FeedWarning>,
    pub skips: Vec<FeedSkip>,
}

pub trait FeedPlugin: Send + Sync {
    fn destination(&self) -> &'static str;
    fn format(&self) -> &'static str;

    fn build(
        &self,
        listings: &[ListingCanonicalV1],
        config: &serde_json::Value,
        area_id_map: &HashMap<String, String>,
    ) -> FeedBuildOutput;
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) {
    writer.write_event(Event::Start(BytesStart::new(tag))).ok();
    writer.write_event(Event::Text(BytesText::new(text))).ok();
    writer.write_event(Event::End(BytesEnd::new(tag))).ok();
}

/// Minimal `<listings><listing>...</listing></listings>` feed, grounded on
/// `feed_generator.py::generate_xml_feed`. The destination-agnostic default
/// for any partner that hasn't asked for a named schema.
pub struct GenericXmlPlugin;

impl FeedPlugin for GenericXmlPlugin {
    fn destination(&self) -> &'static str {
        "xml_v1"
    }

    fn format(&self) -> &'static str {
        "xml"
    }

    fn build(
        &self,
        listings: &[ListingCanonicalV1],
        _config: &serde_json::Value,
        _area_id_map: &HashMap<String, String>,
    ) -> FeedBuildOutput {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Start(BytesStart::new("listings")))
            .ok();

        for listing in listings {
            writer
                .write_event(Event::Start(BytesStart::new("listing")))
                .ok();
            write_text_element(&mut writer, "id", &listing.canonical_id);
            write_text_element(&mut writer, "title", &listing.title);
            write_text_element(
                &mut writer,
                "status",
                serde_json::to_value(listing.status)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default()
                    .as_str(),
            );
            if let Some(price) = &listing.list_price {
                write_text_element(&mut writer, "currency", &price.currency);
                write_text_element(&mut writer, "amount", &price.amount.to_string());
            }
            if listing.address.city.is_some() || listing.address.country.is_some() {
                writer
                    .write_event(Event::Start(BytesStart::new("address")))
                    .ok();
                if let Some(city) = &listing.address.city {
                    write_text_element(&mut writer, "city", city);
                }
                if let Some(country) = &listing.address.country {
                    write_text_element(&mut writer, "country", country);
                }
                writer.write_event(Event::End(BytesEnd::new("address"))).ok();
            }
            writer.write_event(Event::End(BytesEnd::new("listing"))).ok();
        }

        writer.write_event(Event::End(BytesEnd::new("listings"))).ok();

        FeedBuildOutput {
            bytes: writer.into_inner(),
            listing_count: listings.len(),
            warnings: Vec::new(),
            skips: Vec::new(),
        }
    }
}

/// `<ads><ad>...<ad_pictures>...</ad_pictures></ad></ads>` for the named
/// "101evler" destination. Grounded on
/// `app/services/feeds/evler101_xml.py::build_101evler_xml`: scalar tags
/// per listing plus a nested picture list, with an area-id lookup (the
/// hub's own geo catalog, not the destination's) filling the `area_id`
/// tag — listings whose city/area pair isn't mapped get a warning instead
/// of a bogus tag.
pub struct Evler101XmlPlugin;

impl FeedPlugin for Evler101XmlPlugin {
    fn destination(&self) -> &'static str {
        "101evler"
    }

    fn format(&self) -> &'static str {
        "xml"
    }

    fn build(
        &self,
        listings: &[ListingCanonicalV1],
        _config: &serde_json::Value,
        area_id_map: &HashMap<String, String>,
    ) -> FeedBuildOutput {
        let mut writer = Writer::new(Vec::new());
        let mut warnings = Vec::new();
        writer.write_event(Event::Start(BytesStart::new("ads"))).ok();

        let mut count = 0usize;
        for listing in listings {
            writer.write_event(Event::Start(BytesStart::new("ad"))).ok();
            write_text_element(&mut writer, "listing_id", &listing.canonical_id);
            write_text_element(&mut writer, "title", &listing.title);
            if let Some(price) = &listing.list_price {
                write_text_element(&mut writer, "price", &price.amount.to_string());
                write_text_element(&mut writer, "currency", &price.currency);
            }

            let city = listing.address.city.clone().unwrap_or_default().to_lowercase();
            let area = listing
                .address
                .area
                .clone()
                .or_else(|| listing.address.region.clone())
                .unwrap_or_default()
                .to_lowercase();
            let geo_key = format!("{city}:{area}");
            match area_id_map.get(&geo_key) {
                Some(area_id) => write_text_element(&mut writer, "area_id", area_id),
                None => warnings.push(FeedWarning {
                    listing_id: listing.canonical_id.clone(),
                    code: "UNMAPPED_AREA".to_string(),
                    message: format!("no 101evler area mapping for '{geo_key}'"),
                }),
            }

            writer
                .write_event(Event::Start(BytesStart::new("ad_pictures")))
                .ok();
            for media in &listing.media {
                writer
                    .write_event(Event::Start(BytesStart::new("ad_picture")))
                    .ok();
                write_text_element(&mut writer, "picture_url", &media.url);
                write_text_element(&mut writer, "order_by", &(media.order + 1).to_string());
                writer.write_event(Event::End(BytesEnd::new("ad_picture"))).ok();
            }
            writer
                .write_event(Event::End(BytesEnd::new("ad_pictures")))
                .ok();

            writer.write_event(Event::End(BytesEnd::new("ad"))).ok();
            count += 1;
        }

        writer.write_event(Event::End(BytesEnd::new("ads"))).ok();

        FeedBuildOutput {
            bytes: writer.into_inner(),
            listing_count: count,
            warnings,
            skips: Vec::new(),
        }
    }
}

/// Flat CSV feed for partners whose downstream tooling wants a spreadsheet
/// rather than XML — enrichment beyond the original's two destinations,
/// following the same plugin contract.
pub struct CsvV1Plugin;

impl FeedPlugin for CsvV1Plugin {
    fn destination(&self) -> &'static str {
        "csv_v1"
    }

    fn format(&self) -> &'static str {
        "csv"
    }

    fn build(
        &self,
        listings: &[ListingCanonicalV1],
        _config: &serde_json::Value,
        _area_id_map: &HashMap<String, String>,
    ) -> FeedBuildOutput {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["canonical_id", "title", "status", "currency", "amount", "city"])
            .ok();

        for listing in listings {
            let status = serde_json::to_value(listing.status)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            let (currency, amount) = match &listing.list_price {
                Some(p) => (p.currency.clone(), p.amount.to_string()),
                None => (String::new(), String::new()),
            };
            writer
                .write_record([
                    listing.canonical_id.as_str(),
                    listing.title.as_str(),
                    status.as_str(),
                    currency.as_str(),
                    amount.as_str(),
                    listing.address.city.as_deref().unwrap_or(""),
                ])
                .ok();
        }

        let bytes = writer.into_inner().unwrap_or_default();
        FeedBuildOutput {
            bytes,
            listing_count: listings.len(),
            warnings: Vec::new(),
            skips: Vec::new(),
        }
    }
}

pub struct FeedPluginRegistry {
    plugins: HashMap<String, Box<dyn FeedPlugin>>,
}

impl FeedPluginRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            plugins: HashMap::new(),
        };
        registry.register(Box::new(GenericXmlPlugin));
        registry.register(Box::new(Evler101XmlPlugin));
        registry.register(Box::new(CsvV1Plugin));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn FeedPlugin>) {
        self.plugins.insert(plugin.destination().to_string(), plugin);
    }

    pub fn get(&self, destination: &str) -> hub_common::Result<&dyn FeedPlugin> {
        self.plugins
            .get(&destination.to_lowercase())
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                hub_common::HubError::not_found(format!(
                    "no hosted feed plugin registered for destination={destination}"
                ))
            })
    }
}

impl Default for FeedPluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
