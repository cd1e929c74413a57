//! Data models for the badevand core
//!
//! - Raw: the provider's camelCase payload with numeric codes
//! - Beach: display-ready records consumed by the map

pub mod beach;
pub mod raw;

pub use beach::{
    BeachRecord, DailyObservation, Municipality, WaterQuality, WaterQualityCounts, WeatherType,
};
pub use raw::{RawBeach, RawObservation, decode_beach_list};
