//! Concrete object kinds
//!
//! Each kind is a static [`ClassDef`](crate::ClassDef) with its property
//! table and record read/write functions.

pub mod attributes;
pub mod bin;
pub mod components;
pub mod trackgroups;

use crate::registry::Registry;
use chrono::{DateTime, TimeZone, Utc};

/// Current time truncated to whole seconds, the resolution stored on disk.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now)
}

pub fn register_all(registry: &mut Registry) {
    for class in [
        &bin::BIN,
        &bin::BIN_VIEW_SETTING,
        &attributes::ATTRIBUTES,
        &components::SEQUENCE,
        &components::SOURCE_CLIP,
        &components::FILLER,
        &components::TIMECODE,
        &components::TRACK_REF,
        &components::PARAM_CLIP,
        &trackgroups::COMPOSITION,
    ] {
        registry.register(class);
    }

    for helper in [
        &bin::SETTING,
        &bin::BIN_ITEM,
        &bin::SIFT_ITEM,
        &components::COMPONENT,
        &components::CLIP,
        &components::CONTROL_POINT,
        &components::PER_POINT,
        &trackgroups::TRACK_GROUP,
        &trackgroups::TRACK,
    ] {
        registry.register_helper(helper);
    }
}
