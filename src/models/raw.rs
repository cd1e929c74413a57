//! Raw badevand.dk payload structures
//!
//! Every field is optional or defaulted: the provider reshuffles fields
//! without notice and a missing value must never reject the whole payload.
//! Fields of an unexpected JSON type decode as absent.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// One beach as served by `/api/next/beaches`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBeach {
    pub id: Value,
    #[serde(deserialize_with = "lenient_text")]
    pub country_code: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub municipality_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub municipality_url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub beach_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub longitude: Option<f64>,
    #[serde(deserialize_with = "lenient_text")]
    pub comments: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub facilities: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub links: Option<String>,
    #[serde(deserialize_with = "lenient_observations")]
    pub data: Vec<RawObservation>,
}

/// One day of readings with numeric codes and raw units
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawObservation {
    #[serde(deserialize_with = "lenient_text")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub water_quality_original_value: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub water_quality: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub water_temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub current_speed: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub current_direction: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub air_temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub wind_speed: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub wind_direction: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub wind_direction_display: Option<f64>,
}

/// Decode a provider list element by element
///
/// Elements that are not objects carry no beach and are skipped; object
/// elements always decode.
#[must_use]
pub fn decode_beach_list(items: Vec<Value>) -> Vec<RawBeach> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if !item.is_object() {
                debug!(index, "Skipping non-object beach entry");
                return None;
            }
            match serde_json::from_value(item) {
                Ok(beach) => Some(beach),
                Err(e) => {
                    debug!(index, "Skipping undecodable beach entry: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_from(&Value::deserialize(deserializer)?))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_observations<'de, D>(deserializer: D) -> Result<Vec<RawObservation>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

impl RawBeach {
    /// Numeric identity; string ids holding a number are accepted too
    #[must_use]
    pub fn numeric_id(&self) -> Option<i64> {
        match &self.id {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64)),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_payload() {
        let raw: Vec<RawBeach> = serde_json::from_str(
            r#"[{
                "id": 42,
                "municipalityName": "Aarhus",
                "municipalityUrl": "https://aarhus.dk",
                "beachName": "Bellevue",
                "latitude": 56.2,
                "longitude": 10.24,
                "facilities": null,
                "data": [{"date": "2024-07-01", "waterQuality": 2, "waterTemperature": 17.4}]
            }]"#,
        )
        .unwrap();

        assert_eq!(raw[0].numeric_id(), Some(42));
        assert_eq!(raw[0].beach_name.as_deref(), Some("Bellevue"));
        assert_eq!(raw[0].facilities, None);
        assert_eq!(raw[0].data[0].water_quality, Some(2.0));
        assert_eq!(raw[0].data[0].wind_speed, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let raw: RawBeach = serde_json::from_str(r#"{"id": "7"}"#).unwrap();
        assert_eq!(raw.numeric_id(), Some(7));
        assert!(raw.data.is_empty());
        assert!(raw.latitude.is_none());
    }

    #[test]
    fn test_null_data_decodes_as_empty() {
        let raw: RawBeach =
            serde_json::from_str(r#"{"id": 3, "beachName": "Hornbæk", "data": null}"#).unwrap();
        assert!(raw.data.is_empty());
        assert_eq!(raw.beach_name.as_deref(), Some("Hornbæk"));
    }

    #[test]
    fn test_mistyped_fields_decode_as_absent_or_coerced() {
        let raw: RawBeach = serde_json::from_str(
            r#"{
                "id": 9,
                "beachName": ["not", "a", "name"],
                "latitude": "55.1",
                "longitude": {"deg": 12},
                "municipalityUrl": false,
                "data": [
                    {"date": "2024-07-01", "waterQuality": "2", "windSpeed": "fast"},
                    "garbage",
                    {"date": 20240702, "waterQuality": null}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(raw.beach_name, None);
        assert_eq!(raw.latitude, Some(55.1));
        assert_eq!(raw.longitude, None);
        assert_eq!(raw.municipality_url, None);
        assert_eq!(raw.data.len(), 2);
        assert_eq!(raw.data[0].water_quality, Some(2.0));
        assert_eq!(raw.data[0].wind_speed, None);
        assert_eq!(raw.data[1].date.as_deref(), Some("20240702"));
        assert_eq!(raw.data[1].water_quality, None);
    }

    #[test]
    fn test_decode_beach_list_skips_non_objects_only() {
        let items: Vec<Value> = serde_json::from_str(
            r#"[{"id": 1, "latitude": 55.0}, 17, null, {"id": 2, "data": null}]"#,
        )
        .unwrap();
        let beaches = decode_beach_list(items);
        assert_eq!(beaches.len(), 2);
        assert_eq!(beaches[0].numeric_id(), Some(1));
        assert_eq!(beaches[1].numeric_id(), Some(2));
    }
}
