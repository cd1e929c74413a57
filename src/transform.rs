//! Conversion of the raw provider payload into display-ready records
//!
//! Every function here is total: malformed or missing fields fall back to
//! a neutral value and never drop the record.

use url::Url;

use crate::models::{
    BeachRecord, DailyObservation, Municipality, RawBeach, RawObservation, WaterQuality,
    WeatherType,
};

const CARDINALS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Transform a full provider response
#[must_use]
pub fn transform_beaches(raw: &[RawBeach]) -> Vec<BeachRecord> {
    raw.iter().map(transform_beach).collect()
}

/// Transform a single provider beach
#[must_use]
pub fn transform_beach(raw: &RawBeach) -> BeachRecord {
    BeachRecord {
        id: raw.numeric_id().unwrap_or_default(),
        name: raw.beach_name.clone().unwrap_or_default(),
        municipality: Municipality {
            name: raw.municipality_name.clone().unwrap_or_default(),
            website: sanitize_url(raw.municipality_url.as_deref()),
        },
        description: raw.description.clone().unwrap_or_default(),
        comments: raw.comments.clone().unwrap_or_default(),
        facilities: raw.facilities.clone(),
        links: raw
            .links
            .iter()
            .filter(|link| !link.is_empty())
            .cloned()
            .collect(),
        latitude: raw.latitude.unwrap_or(f64::NAN),
        longitude: raw.longitude.unwrap_or(f64::NAN),
        data: raw.data.iter().map(transform_observation).collect(),
    }
}

/// Transform one day of readings
///
/// The provider does not send weather type or precipitation; they default
/// to `PartlyCloudy` and an empty string.
#[must_use]
pub fn transform_observation(raw: &RawObservation) -> DailyObservation {
    DailyObservation {
        date: raw.date.clone().unwrap_or_default(),
        water_quality: map_water_quality(raw.water_quality),
        water_temperature: format_rounded(raw.water_temperature),
        current_speed: format_decimal(raw.current_speed),
        current_direction: format_rounded(raw.current_direction),
        air_temperature: format_rounded(raw.air_temperature),
        wind_speed: format_rounded(raw.wind_speed),
        wind_direction: format_rounded(raw.wind_direction),
        wind_direction_display: wind_direction_display(
            raw.wind_direction,
            raw.wind_direction_display,
        ),
        weather_type: WeatherType::PartlyCloudy,
        precipitation: String::new(),
    }
}

/// Map a raw numeric quality code; non-integral or missing codes are `Unknown`
#[must_use]
pub fn map_water_quality(code: Option<f64>) -> WaterQuality {
    match code {
        Some(code) if code.is_finite() && code.fract() == 0.0 => {
            WaterQuality::from_code(code as i64)
        }
        _ => WaterQuality::Unknown,
    }
}

/// Round half up, matching how the website rounds display values
#[must_use]
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn format_rounded(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{}", round_half_up(value) as i64),
        _ => String::new(),
    }
}

/// One decimal with a comma separator: `0.25` becomes `"0,3"`
#[must_use]
pub fn format_decimal(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => {
            let tenths = round_half_up(value * 10.0) / 10.0;
            format!("{tenths:.1}").replace('.', ",")
        }
        _ => String::new(),
    }
}

/// 8-point compass name of a direction in degrees
#[must_use]
pub fn degrees_to_cardinal(degrees: f64) -> &'static str {
    if !degrees.is_finite() {
        return CARDINALS[0];
    }
    let index = round_half_up(degrees.rem_euclid(360.0) / 45.0) as usize % CARDINALS.len();
    CARDINALS[index]
}

/// Display values above 360 are provider placeholders; use the raw direction instead
#[must_use]
pub fn wind_direction_display(direction: Option<f64>, display: Option<f64>) -> String {
    match (direction, display) {
        (Some(direction), Some(display)) if display > 360.0 => {
            degrees_to_cardinal(direction).to_string()
        }
        (_, Some(display)) => format_rounded(Some(display)),
        (Some(direction), None) => degrees_to_cardinal(direction).to_string(),
        (None, None) => String::new(),
    }
}

/// Keep only absolute http(s) links, returned verbatim
#[must_use]
pub fn sanitize_url(url: Option<&str>) -> Option<String> {
    let candidate = url?.trim();
    if candidate.is_empty() {
        return None;
    }
    match Url::parse(candidate) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(candidate.to_string()),
        _ => None,
    }
}
