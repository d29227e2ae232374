// Reference data used by the validator and the stitcher: airport locations,
// hub lists and the transit visa heuristic. Loadable from JSON so the tables
// can be corrected without a rebuild.

use crate::model::is_iata_code;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Error, Debug)]
pub enum ReferenceDataError {
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid airport code in reference data: {0:?}")]
    InvalidAirportCode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportInfo {
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub airports: HashMap<String, AirportInfo>,
    pub large_hubs: HashSet<String>,
    pub known_hubs: HashSet<String>,
    pub transit_visa_countries: HashSet<String>,
}

// (code, country, city, latitude, longitude)
const BUILTIN_AIRPORTS: &[(&str, &str, &str, f64, f64)] = &[
    ("JNB", "ZA", "Johannesburg", -26.1337, 28.2420),
    ("HLA", "ZA", "Johannesburg", -25.9385, 27.9261),
    ("CPT", "ZA", "Cape Town", -33.9715, 18.6021),
    ("DUR", "ZA", "Durban", -29.6144, 31.1197),
    ("PLZ", "ZA", "Port Elizabeth", -33.9849, 25.6173),
    ("GRJ", "ZA", "George", -34.0056, 22.3789),
    ("ADD", "ET", "Addis Ababa", 8.9779, 38.7993),
    ("NBO", "KE", "Nairobi", -1.3192, 36.9278),
    ("KGL", "RW", "Kigali", -1.9686, 30.1395),
    ("DAR", "TZ", "Dar es Salaam", -6.8781, 39.2026),
    ("MPM", "MZ", "Maputo", -25.9208, 32.5726),
    ("WDH", "NA", "Windhoek", -22.4799, 17.4709),
    ("GBE", "BW", "Gaborone", -24.5552, 25.9182),
    ("HRE", "ZW", "Harare", -17.9318, 31.0928),
    ("LUN", "ZM", "Lusaka", -15.3308, 28.4526),
    ("MRU", "MU", "Mauritius", -20.4302, 57.6836),
    ("LOS", "NG", "Lagos", 6.5774, 3.3212),
    ("ACC", "GH", "Accra", 5.6052, -0.1668),
    ("CAI", "EG", "Cairo", 30.1219, 31.4056),
    ("CMN", "MA", "Casablanca", 33.3675, -7.5898),
    ("DXB", "AE", "Dubai", 25.2532, 55.3657),
    ("DWC", "AE", "Dubai", 24.8963, 55.1614),
    ("AUH", "AE", "Abu Dhabi", 24.4330, 54.6511),
    ("DOH", "QA", "Doha", 25.2731, 51.6081),
    ("IST", "TR", "Istanbul", 41.2753, 28.7519),
    ("SAW", "TR", "Istanbul", 40.8986, 29.3092),
    ("LHR", "GB", "London", 51.4700, -0.4543),
    ("LGW", "GB", "London", 51.1537, -0.1821),
    ("STN", "GB", "London", 51.8860, 0.2389),
    ("MAN", "GB", "Manchester", 53.3537, -2.2750),
    ("CDG", "FR", "Paris", 49.0097, 2.5479),
    ("ORY", "FR", "Paris", 48.7262, 2.3652),
    ("AMS", "NL", "Amsterdam", 52.3105, 4.7683),
    ("FRA", "DE", "Frankfurt", 50.0379, 8.5622),
    ("MUC", "DE", "Munich", 48.3537, 11.7750),
    ("ZRH", "CH", "Zurich", 47.4582, 8.5555),
    ("LIS", "PT", "Lisbon", 38.7756, -9.1354),
    ("MAD", "ES", "Madrid", 40.4983, -3.5676),
    ("FCO", "IT", "Rome", 41.8003, 12.2389),
    ("JFK", "US", "New York", 40.6413, -73.7781),
    ("EWR", "US", "New York", 40.6895, -74.1745),
    ("ATL", "US", "Atlanta", 33.6407, -84.4277),
    ("IAD", "US", "Washington", 38.9531, -77.4565),
    ("LAX", "US", "Los Angeles", 33.9416, -118.4085),
    ("YYZ", "CA", "Toronto", 43.6777, -79.6248),
    ("GRU", "BR", "Sao Paulo", -23.4356, -46.4731),
    ("SIN", "SG", "Singapore", 1.3644, 103.9915),
    ("HKG", "HK", "Hong Kong", 22.3080, 113.9185),
    ("BKK", "TH", "Bangkok", 13.6900, 100.7501),
    ("DEL", "IN", "Delhi", 28.5562, 77.1000),
    ("BOM", "IN", "Mumbai", 19.0896, 72.8656),
    ("NRT", "JP", "Tokyo", 35.7720, 140.3929),
    ("HND", "JP", "Tokyo", 35.5494, 139.7798),
    ("SYD", "AU", "Sydney", -33.9399, 151.1753),
    ("PER", "AU", "Perth", -31.9385, 115.9672),
    ("AKL", "NZ", "Auckland", -37.0082, 174.7850),
];

const BUILTIN_LARGE_HUBS: &[&str] = &[
    "LHR", "CDG", "FRA", "AMS", "IST", "DXB", "DOH", "JFK", "ATL", "LAX", "SIN", "HKG", "NRT",
    "HND",
];

const BUILTIN_KNOWN_HUBS: &[&str] = &[
    "JNB", "CPT", "ADD", "NBO", "KGL", "CAI", "LOS", "DXB", "DOH", "AUH", "IST", "LHR", "CDG",
    "AMS", "FRA", "MUC", "ZRH", "SIN", "HKG",
];

// Countries that typically require a visa even for airside transit
const BUILTIN_TRANSIT_VISA_COUNTRIES: &[&str] = &["US", "GB", "CA", "AU", "NZ"];

impl Default for ReferenceData {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ReferenceData {
    pub fn builtin() -> Self {
        let airports = BUILTIN_AIRPORTS
            .iter()
            .map(|&(code, country, city, latitude, longitude)| {
                (
                    code.to_string(),
                    AirportInfo {
                        country: country.to_string(),
                        city: city.to_string(),
                        latitude,
                        longitude,
                    },
                )
            })
            .collect();

        let to_set = |codes: &[&str]| codes.iter().map(|c| c.to_string()).collect();

        Self {
            airports,
            large_hubs: to_set(BUILTIN_LARGE_HUBS),
            known_hubs: to_set(BUILTIN_KNOWN_HUBS),
            transit_visa_countries: to_set(BUILTIN_TRANSIT_VISA_COUNTRIES),
        }
    }

    /// Parses a JSON dataset. Sections missing from the document keep the
    /// built-in values.
    pub fn from_json(json: &str) -> Result<Self, ReferenceDataError> {
        let data: ReferenceData = serde_json::from_str(json)?;
        data.check_codes()?;
        Ok(data)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceDataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn check_codes(&self) -> Result<(), ReferenceDataError> {
        let codes = self
            .airports
            .keys()
            .chain(self.large_hubs.iter())
            .chain(self.known_hubs.iter());
        for code in codes {
            if !is_iata_code(code) {
                return Err(ReferenceDataError::InvalidAirportCode(code.clone()));
            }
        }
        Ok(())
    }

    pub fn airport(&self, code: &str) -> Option<&AirportInfo> {
        self.airports.get(code)
    }

    pub fn country_of(&self, code: &str) -> Option<&str> {
        self.airport(code).map(|a| a.country.as_str())
    }

    pub fn is_large_hub(&self, code: &str) -> bool {
        self.large_hubs.contains(code)
    }

    pub fn is_known_hub(&self, code: &str) -> bool {
        self.known_hubs.contains(code)
    }

    pub fn requires_transit_visa(&self, country: &str) -> bool {
        self.transit_visa_countries.contains(country)
    }

    /// True when both codes are distinct airports serving the same city.
    pub fn same_city(&self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        match (self.airport(a), self.airport(b)) {
            (Some(x), Some(y)) => x.city == y.city && x.country == y.country,
            _ => false,
        }
    }

    /// Unknown airports count as international.
    pub fn is_international(&self, a: &str, b: &str) -> bool {
        match (self.country_of(a), self.country_of(b)) {
            (Some(x), Some(y)) => x != y,
            _ => true,
        }
    }

    /// Great circle distance in kilometres, if both airports are known.
    pub fn distance_km(&self, a: &str, b: &str) -> Option<f64> {
        let from = self.airport(a)?;
        let to = self.airport(b)?;

        let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (to.longitude - from.longitude).to_radians();

        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        Some(2.0 * EARTH_RADIUS_KM * h.sqrt().asin())
    }
}
