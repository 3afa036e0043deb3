use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const HORSE_RACING: &str = "4a2788f8-e825-4d36-9894-efd4baf1cfae";
pub const GREYHOUND_RACING: &str = "9daef0d7-bf3c-4f50-921d-8e818c60fe61";
pub const HARNESS_RACING: &str = "161d9be2-e909-4326-8c2c-35ed71fb460b";

/// Body of `GET /?method=nextraces`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub status: u16,
    pub data: RaceData,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceData {
    #[serde(default)]
    pub next_to_go_ids: Vec<String>,
    pub race_summaries: HashMap<String, RaceSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSummary {
    #[serde(default)]
    pub race_id: String,
    #[serde(default)]
    pub race_name: String,
    #[serde(default)]
    pub race_number: u32,
    #[serde(default)]
    pub meeting_id: String,
    #[serde(default)]
    pub meeting_name: String,
    /// Empty when upstream omits it; such races group as "Unknown".
    #[serde(default)]
    pub category_id: String,
    pub advertised_start: AdvertisedStart,
    #[serde(default)]
    pub race_form: Option<RaceForm>,
    #[serde(default)]
    pub venue_id: String,
    #[serde(default)]
    pub venue_name: String,
    #[serde(default)]
    pub venue_state: String,
    #[serde(default)]
    pub venue_country: String,
}

impl RaceSummary {
    /// Scheduled start, epoch seconds.
    pub fn start_secs(&self) -> i64 {
        self.advertised_start.seconds
    }

    pub fn category(&self) -> Option<Category> {
        Category::from_id(&self.category_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedStart {
    pub seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceForm {
    pub distance: u32,
    pub distance_type: Descriptor,
    pub distance_type_id: String,
    pub track_condition: Descriptor,
    pub track_condition_id: String,
    pub weather: Weather,
    pub weather_id: String,
    pub race_comment: Option<String>,
    pub race_comment_alternative: Option<String>,
}

/// Id/name pair the API uses for distance units and track conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub id: String,
    pub name: String,
    pub short_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weather {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub icon_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Horse,
    Greyhound,
    Harness,
}

impl Category {
    /// Display order used when grouping.
    pub const ORDER: [Category; 3] = [Category::Horse, Category::Greyhound, Category::Harness];

    pub fn id(&self) -> &'static str {
        match self {
            Category::Horse => HORSE_RACING,
            Category::Greyhound => GREYHOUND_RACING,
            Category::Harness => HARNESS_RACING,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Horse => "Horse Racing",
            Category::Greyhound => "Greyhound Racing",
            Category::Harness => "Harness Racing",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|c| c.id() == id)
    }

    /// Accepts a category id or the short aliases `horse`, `greyhound`, `harness`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horse" => Some(Category::Horse),
            "greyhound" => Some(Category::Greyhound),
            "harness" => Some(Category::Harness),
            other => Self::from_id(other),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Some(CategoryFilter::All);
        }
        Category::parse(s).map(CategoryFilter::Only)
    }

    pub fn matches(&self, race: &RaceSummary) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => race.category_id == c.id(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CountryFilter {
    #[default]
    All,
    Only(String),
}

impl CountryFilter {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            CountryFilter::All
        } else {
            CountryFilter::Only(s.to_string())
        }
    }

    pub fn matches(&self, race: &RaceSummary) -> bool {
        match self {
            CountryFilter::All => true,
            CountryFilter::Only(code) => race.venue_country == *code,
        }
    }
}

impl fmt::Display for CountryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountryFilter::All => f.write_str("all"),
            CountryFilter::Only(code) => f.write_str(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VenueGroup {
    pub venue: String,
    pub state: String,
    pub races: Vec<RaceSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub name: String,
    pub category_id: String,
    pub venues: Vec<VenueGroup>,
}
