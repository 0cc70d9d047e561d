//! Catalog mapping substrate (C8): flat enum/geo lookup tables consumed by
//! every destination projection, plus a versioned release lifecycle
//! (`DestinationCatalogSet`) that bundles edits and applies them atomically.

pub mod geo;
pub mod mappings;
pub mod sets;

pub use geo::{GeoArea, GeoCity, GeoCountry, GeoStore};
pub use mappings::{DestinationEnumMapping, DestinationGeoMapping, MappingStore};
pub use sets::{
    CatalogSetItem, CatalogSetStatus, CatalogSetStore, ImportItemOutcome, ImportRun, NewSetItem,
    SetItemKind,
};
