//! Beach records as consumed by the map and detail views

use serde::{Deserialize, Serialize};

/// Water-quality classification of a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterQuality {
    Good,
    Bad,
    Unknown,
    Closed,
}

impl WaterQuality {
    /// Map the provider's numeric code; anything outside {1, 2, 4} is `Unknown`
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => WaterQuality::Bad,
            2 => WaterQuality::Good,
            4 => WaterQuality::Closed,
            _ => WaterQuality::Unknown,
        }
    }

    /// Human-readable label shown next to the quality badge
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            WaterQuality::Bad => "Bad water quality",
            WaterQuality::Good => "Good water quality",
            WaterQuality::Unknown => "Unknown water quality",
            WaterQuality::Closed => "The beach is closed",
        }
    }
}

/// Weather classification used by the forecast icons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherType {
    Sun,
    LightlyCloudy,
    PartlyCloudy,
    Cloudy,
    IndividualRainShowersPeriodsOfSun,
    SomeThunderstormsPeriodsOfSunshine,
    SomeRainOrSleetPeriodsOfSun,
    SomeSnowPeriodsOfSun,
    LightRain,
    Rain,
    ThunderAndRain,
    Sludge,
    Snow,
    ThunderAndSnow,
    Fog,
}

/// Municipality responsible for a beach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    pub name: String,
    /// Only http(s) links survive sanitization
    pub website: Option<String>,
}

/// One day of readings, display-ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: String,
    pub water_quality: WaterQuality,
    pub water_temperature: String,
    /// One decimal with a comma separator, e.g. "0,3"
    pub current_speed: String,
    pub current_direction: String,
    pub air_temperature: String,
    pub wind_speed: String,
    pub wind_direction: String,
    pub wind_direction_display: String,
    pub weather_type: WeatherType,
    pub precipitation: String,
}

/// A single beach with its observation history, most recent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeachRecord {
    pub id: i64,
    pub name: String,
    pub municipality: Municipality,
    pub description: String,
    pub comments: String,
    pub facilities: Option<String>,
    pub links: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub data: Vec<DailyObservation>,
}

impl BeachRecord {
    /// Today's reading, if the provider sent any
    #[must_use]
    pub fn today(&self) -> Option<&DailyObservation> {
        self.data.first()
    }

    /// Today's quality, `Unknown` when there is no reading
    #[must_use]
    pub fn today_quality(&self) -> WaterQuality {
        self.today()
            .map_or(WaterQuality::Unknown, |today| today.water_quality)
    }

    /// Reading for a selected day, falling back to today
    #[must_use]
    pub fn observation_for(&self, date: Option<&str>) -> Option<&DailyObservation> {
        date.and_then(|date| self.data.iter().find(|datum| datum.date == date))
            .or_else(|| self.today())
    }

    /// Great-circle distance from a position in kilometers
    #[must_use]
    pub fn distance_km_from(&self, latitude: f64, longitude: f64) -> f64 {
        haversine::distance(
            haversine::Location {
                latitude,
                longitude,
            },
            haversine::Location {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            haversine::Units::Kilometers,
        )
    }
}

/// Breakdown of beaches by today's water quality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterQualityCounts {
    pub good: usize,
    pub bad: usize,
    pub unknown: usize,
    pub closed: usize,
}

impl WaterQualityCounts {
    /// Count today's quality over a set of beaches
    pub fn tally<'a, I>(beaches: I) -> Self
    where
        I: IntoIterator<Item = &'a BeachRecord>,
    {
        beaches.into_iter().fold(Self::default(), |mut counts, beach| {
            counts.add(beach.today_quality());
            counts
        })
    }

    pub fn add(&mut self, quality: WaterQuality) {
        match quality {
            WaterQuality::Good => self.good += 1,
            WaterQuality::Bad => self.bad += 1,
            WaterQuality::Unknown => self.unknown += 1,
            WaterQuality::Closed => self.closed += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.good + self.bad + self.unknown + self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn observation(date: &str, quality: WaterQuality) -> DailyObservation {
        DailyObservation {
            date: date.to_string(),
            water_quality: quality,
            water_temperature: "17".to_string(),
            current_speed: "0,2".to_string(),
            current_direction: "90".to_string(),
            air_temperature: "21".to_string(),
            wind_speed: "4".to_string(),
            wind_direction: "270".to_string(),
            wind_direction_display: "270".to_string(),
            weather_type: WeatherType::PartlyCloudy,
            precipitation: String::new(),
        }
    }

    fn beach(id: i64, data: Vec<DailyObservation>) -> BeachRecord {
        BeachRecord {
            id,
            name: format!("Beach {id}"),
            municipality: Municipality {
                name: "Aarhus".to_string(),
                website: None,
            },
            description: String::new(),
            comments: String::new(),
            facilities: None,
            links: vec![],
            latitude: 56.15,
            longitude: 10.21,
            data,
        }
    }

    #[rstest]
    #[case(0, WaterQuality::Unknown)]
    #[case(1, WaterQuality::Bad)]
    #[case(2, WaterQuality::Good)]
    #[case(3, WaterQuality::Unknown)]
    #[case(4, WaterQuality::Closed)]
    #[case(5, WaterQuality::Unknown)]
    #[case(-1, WaterQuality::Unknown)]
    #[case(i64::MAX, WaterQuality::Unknown)]
    fn test_water_quality_from_code(#[case] code: i64, #[case] expected: WaterQuality) {
        assert_eq!(WaterQuality::from_code(code), expected);
    }

    #[test]
    fn test_labels() {
        assert_eq!(WaterQuality::Closed.label(), "The beach is closed");
        assert_eq!(WaterQuality::Good.label(), "Good water quality");
    }

    #[test]
    fn test_today_defaults_to_unknown_without_data() {
        let empty = beach(1, vec![]);
        assert!(empty.today().is_none());
        assert_eq!(empty.today_quality(), WaterQuality::Unknown);
    }

    #[test]
    fn test_observation_for_selected_day() {
        let record = beach(
            1,
            vec![
                observation("2024-07-01", WaterQuality::Good),
                observation("2024-07-02", WaterQuality::Bad),
            ],
        );
        assert_eq!(
            record.observation_for(Some("2024-07-02")).map(|d| d.water_quality),
            Some(WaterQuality::Bad)
        );
        assert_eq!(
            record.observation_for(Some("1999-01-01")).map(|d| d.date.as_str()),
            Some("2024-07-01")
        );
        assert_eq!(
            record.observation_for(None).map(|d| d.date.as_str()),
            Some("2024-07-01")
        );
    }

    #[test]
    fn test_tally_counts_today_only() {
        let beaches = vec![
            beach(1, vec![observation("d", WaterQuality::Good), observation("e", WaterQuality::Bad)]),
            beach(2, vec![observation("d", WaterQuality::Good)]),
            beach(3, vec![observation("d", WaterQuality::Closed)]),
            beach(4, vec![]),
        ];
        let counts = WaterQualityCounts::tally(&beaches);
        assert_eq!(
            counts,
            WaterQualityCounts {
                good: 2,
                bad: 0,
                unknown: 1,
                closed: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_distance_km_from() {
        let record = beach(1, vec![]);
        let distance = record.distance_km_from(56.16, 10.22);
        assert!(distance > 1.0 && distance < 2.0);
    }
}
