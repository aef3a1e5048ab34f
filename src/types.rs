use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiError;

pub const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

pub const SEASON_FLAGS: [&str; 5] = ["SPRING", "SUMMER", "MONSOON", "AUTUMN", "WINTER"];

// ---------- Request/Response types ----------

// FLAT request: every feature arrives as a top-level key. Values may be
// numbers, strings ("nan"/"null"/"" are missing-value sentinels) or null;
// the preprocessing pipeline owns coercion, so we keep the raw JSON here
// and echo it back untouched in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl InputRecord {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// The required YEAR field. Absent or non-numeric is a client error,
    /// checked before any inference work starts.
    pub fn validate(&self) -> Result<i32, ApiError> {
        match self.fields.get("YEAR") {
            Some(v) => coerce_numeric(v)
                .filter(|y| y.is_finite())
                .map(|y| y as i32)
                .ok_or_else(|| ApiError::Validation("field YEAR must be numeric".into())),
            None => Err(ApiError::Validation("missing required field YEAR".into())),
        }
    }

    /// Value of a field with missing-value sentinels collapsed to 0.
    /// Returns None only when the field is absent entirely.
    pub fn coerced(&self, name: &str) -> Option<f64> {
        self.fields.get(name).map(|v| coerce_numeric(v).unwrap_or(0.0))
    }

    /// Value of a field only if the caller genuinely supplied a finite
    /// number (used to decide whether derived quantities apply). Unlike
    /// `coerced`, null and the missing-value sentinels count as absent
    /// here, not as 0.
    pub fn supplied(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("nan")
                {
                    None
                } else {
                    t.parse::<f64>().ok().filter(|v| v.is_finite())
                }
            }
            _ => None,
        }
    }

    /// Binary indicator check, matching the one-hot convention: set means
    /// exactly 1.
    pub fn flag(&self, name: &str) -> bool {
        self.coerced(name) == Some(1.0)
    }
}

impl Default for InputRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Sentinel-aware numeric coercion: JSON null and the textual placeholders
/// ""/"null"/"nan" (any case) all read as 0. Anything unparseable also
/// reads as 0 rather than failing the request.
fn coerce_numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("nan") {
                Some(0.0)
            } else {
                Some(t.parse::<f64>().unwrap_or(0.0))
            }
        }
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionOutput {
    pub prediction: f64,
    pub input_data: InputRecord,
    pub confidence: String,
    pub regional_info: Option<Value>,
}

// ---------- Regional statistics ----------

/// Per-subdivision aggregates derived once from the training dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalStats {
    pub avg_annual_rainfall: f64,
    pub monsoon_rainfall_pct: f64,
    pub rain_probability: f64,
    pub sample_count: usize,
}

// ---------- Subdivisions ----------

/// The 36 Indian meteorological subdivisions. One-hot flags on the input
/// are resolved through this enum instead of assembling column names from
/// strings at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subdivision {
    AndamanNicobarIslands,
    ArunachalPradesh,
    AssamMeghalaya,
    Bihar,
    Chhattisgarh,
    CoastalAndhraPradesh,
    CoastalKarnataka,
    EastMadhyaPradesh,
    EastRajasthan,
    EastUttarPradesh,
    GangeticWestBengal,
    GujaratRegion,
    HaryanaDelhiChandigarh,
    HimachalPradesh,
    JammuKashmir,
    Jharkhand,
    Kerala,
    KonkanGoa,
    Lakshadweep,
    MadhyaMaharashtra,
    Matathwada,
    NagaManiMizoTripura,
    NorthInteriorKarnataka,
    Orissa,
    Punjab,
    Rayalseema,
    SaurashtraKutch,
    SouthInteriorKarnataka,
    SubHimalayanWestBengalSikkim,
    TamilNadu,
    Telangana,
    Uttarakhand,
    Vidarbha,
    WestMadhyaPradesh,
    WestRajasthan,
    WestUttarPradesh,
}

use Subdivision::*;

impl Subdivision {
    pub const ALL: [Subdivision; 36] = [
        AndamanNicobarIslands,
        ArunachalPradesh,
        AssamMeghalaya,
        Bihar,
        Chhattisgarh,
        CoastalAndhraPradesh,
        CoastalKarnataka,
        EastMadhyaPradesh,
        EastRajasthan,
        EastUttarPradesh,
        GangeticWestBengal,
        GujaratRegion,
        HaryanaDelhiChandigarh,
        HimachalPradesh,
        JammuKashmir,
        Jharkhand,
        Kerala,
        KonkanGoa,
        Lakshadweep,
        MadhyaMaharashtra,
        Matathwada,
        NagaManiMizoTripura,
        NorthInteriorKarnataka,
        Orissa,
        Punjab,
        Rayalseema,
        SaurashtraKutch,
        SouthInteriorKarnataka,
        SubHimalayanWestBengalSikkim,
        TamilNadu,
        Telangana,
        Uttarakhand,
        Vidarbha,
        WestMadhyaPradesh,
        WestRajasthan,
        WestUttarPradesh,
    ];

    /// One-hot column name in the dataset and the request schema.
    pub fn column(self) -> &'static str {
        match self {
            AndamanNicobarIslands => "SUBDIVISION_ANDAMAN_NICOBAR_ISLANDS",
            ArunachalPradesh => "SUBDIVISION_ARUNACHAL_PRADESH",
            AssamMeghalaya => "SUBDIVISION_ASSAM_MEGHALAYA",
            Bihar => "SUBDIVISION_BIHAR",
            Chhattisgarh => "SUBDIVISION_CHHATTISGARH",
            CoastalAndhraPradesh => "SUBDIVISION_COASTAL_ANDHRA_PRADESH",
            CoastalKarnataka => "SUBDIVISION_COASTAL_KARNATAKA",
            EastMadhyaPradesh => "SUBDIVISION_EAST_MADHYA_PRADESH",
            EastRajasthan => "SUBDIVISION_EAST_RAJASTHAN",
            EastUttarPradesh => "SUBDIVISION_EAST_UTTAR_PRADESH",
            GangeticWestBengal => "SUBDIVISION_GANGETIC_WEST_BENGAL",
            GujaratRegion => "SUBDIVISION_GUJARAT_REGION",
            HaryanaDelhiChandigarh => "SUBDIVISION_HARYANA_DELHI_CHANDIGARH",
            HimachalPradesh => "SUBDIVISION_HIMACHAL_PRADESH",
            JammuKashmir => "SUBDIVISION_JAMMU_KASHMIR",
            Jharkhand => "SUBDIVISION_JHARKHAND",
            Kerala => "SUBDIVISION_KERALA",
            KonkanGoa => "SUBDIVISION_KONKAN_GOA",
            Lakshadweep => "SUBDIVISION_LAKSHADWEEP",
            MadhyaMaharashtra => "SUBDIVISION_MADHYA_MAHARASHTRA",
            Matathwada => "SUBDIVISION_MATATHWADA",
            NagaManiMizoTripura => "SUBDIVISION_NAGA_MANI_MIZO_TRIPURA",
            NorthInteriorKarnataka => "SUBDIVISION_NORTH_INTERIOR_KARNATAKA",
            Orissa => "SUBDIVISION_ORISSA",
            Punjab => "SUBDIVISION_PUNJAB",
            Rayalseema => "SUBDIVISION_RAYALSEEMA",
            SaurashtraKutch => "SUBDIVISION_SAURASHTRA_KUTCH",
            SouthInteriorKarnataka => "SUBDIVISION_SOUTH_INTERIOR_KARNATAKA",
            SubHimalayanWestBengalSikkim => "SUBDIVISION_SUB_HIMALAYAN_WEST_BENGAL_SIKKIM",
            TamilNadu => "SUBDIVISION_TAMIL_NADU",
            Telangana => "SUBDIVISION_TELANGANA",
            Uttarakhand => "SUBDIVISION_UTTARAKHAND",
            Vidarbha => "SUBDIVISION_VIDARBHA",
            WestMadhyaPradesh => "SUBDIVISION_WEST_MADHYA_PRADESH",
            WestRajasthan => "SUBDIVISION_WEST_RAJASTHAN",
            WestUttarPradesh => "SUBDIVISION_WEST_UTTAR_PRADESH",
        }
    }

    /// Human-readable name used in the dataset's SUBDIVISION column, the
    /// regional-stats map, and API responses.
    pub fn name(self) -> &'static str {
        match self {
            AndamanNicobarIslands => "ANDAMAN & NICOBAR ISLANDS",
            ArunachalPradesh => "ARUNACHAL PRADESH",
            AssamMeghalaya => "ASSAM & MEGHALAYA",
            Bihar => "BIHAR",
            Chhattisgarh => "CHHATTISGARH",
            CoastalAndhraPradesh => "COASTAL ANDHRA PRADESH",
            CoastalKarnataka => "COASTAL KARNATAKA",
            EastMadhyaPradesh => "EAST MADHYA PRADESH",
            EastRajasthan => "EAST RAJASTHAN",
            EastUttarPradesh => "EAST UTTAR PRADESH",
            GangeticWestBengal => "GANGETIC WEST BENGAL",
            GujaratRegion => "GUJARAT REGION",
            HaryanaDelhiChandigarh => "HARYANA DELHI & CHANDIGARH",
            HimachalPradesh => "HIMACHAL PRADESH",
            JammuKashmir => "JAMMU & KASHMIR",
            Jharkhand => "JHARKHAND",
            Kerala => "KERALA",
            KonkanGoa => "KONKAN & GOA",
            Lakshadweep => "LAKSHADWEEP",
            MadhyaMaharashtra => "MADHYA MAHARASHTRA",
            Matathwada => "MATATHWADA",
            NagaManiMizoTripura => "NAGA MANI MIZO TRIPURA",
            NorthInteriorKarnataka => "NORTH INTERIOR KARNATAKA",
            Orissa => "ORISSA",
            Punjab => "PUNJAB",
            Rayalseema => "RAYALSEEMA",
            SaurashtraKutch => "SAURASHTRA & KUTCH",
            SouthInteriorKarnataka => "SOUTH INTERIOR KARNATAKA",
            SubHimalayanWestBengalSikkim => "SUB HIMALAYAN WEST BENGAL & SIKKIM",
            TamilNadu => "TAMIL NADU",
            Telangana => "TELANGANA",
            Uttarakhand => "UTTARAKHAND",
            Vidarbha => "VIDARBHA",
            WestMadhyaPradesh => "WEST MADHYA PRADESH",
            WestRajasthan => "WEST RAJASTHAN",
            WestUttarPradesh => "WEST UTTAR PRADESH",
        }
    }

    /// Regions whose monsoon rainfall dwarfs the national average; the
    /// adjuster boosts monsoon-season predictions for these.
    pub fn is_high_rainfall(self) -> bool {
        matches!(self, Kerala | CoastalKarnataka | KonkanGoa | AssamMeghalaya)
    }

    /// First subdivision whose one-hot flag is set on the record. Records
    /// are expected to set at most one; extra flags are ignored.
    pub fn from_record(record: &InputRecord) -> Option<Subdivision> {
        Self::ALL.iter().copied().find(|s| record.flag(s.column()))
    }

    /// Resolve a user-supplied identifier: the display name, the one-hot
    /// column name, or the column name without its prefix all match.
    pub fn parse(ident: &str) -> Option<Subdivision> {
        let ident = ident.trim();
        Self::ALL.iter().copied().find(|s| {
            s.name().eq_ignore_ascii_case(ident)
                || s.column().eq_ignore_ascii_case(ident)
                || s.column()["SUBDIVISION_".len()..].eq_ignore_ascii_case(ident)
        })
    }
}
