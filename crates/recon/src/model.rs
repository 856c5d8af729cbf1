use std::fmt;

use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

pub const COL_UNIT: &str = "unit";
pub const COL_SUBUNIT: &str = "subunit";
pub const COL_SITE: &str = "site";
pub const COL_POINT_NAME: &str = "point_name";
pub const COL_YEAR: &str = "year";
pub const COL_LAT: &str = "lat";
pub const COL_LON: &str = "lon";
pub const COL_ORIG_LAT: &str = "orig_lat";
pub const COL_ORIG_LON: &str = "orig_lon";
pub const COL_LATITUDE: &str = "latitude";
pub const COL_LONGITUDE: &str = "longitude";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// One component of an identity key.
///
/// Grouping compares key parts with null-aware equality: two `Missing`
/// parts are equal, and `Missing` never equals a `Value`. Empty cells load
/// as `Missing`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Missing,
    Value(String),
}

impl KeyPart {
    pub fn from_cell(raw: &str) -> Self {
        if raw.is_empty() {
            Self::Missing
        } else {
            Self::Value(raw.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Cell text: empty for `Missing`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Missing => "",
            Self::Value(v) => v,
        }
    }

    /// Rule-side comparison: an empty expected string selects `Missing`.
    pub fn matches(&self, expected: &str) -> bool {
        match self {
            Self::Missing => expected.is_empty(),
            Self::Value(v) => v == expected,
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "(none)"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for KeyPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Missing => serializer.serialize_none(),
            Self::Value(v) => serializer.serialize_some(v),
        }
    }
}

/// (unit, subunit, site, point_name). The only notion of point identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityKey {
    pub unit: KeyPart,
    pub subunit: KeyPart,
    pub site: KeyPart,
    pub point_name: KeyPart,
}

impl IdentityKey {
    pub fn new(unit: &str, subunit: &str, site: &str, point_name: &str) -> Self {
        Self {
            unit: KeyPart::from_cell(unit),
            subunit: KeyPart::from_cell(subunit),
            site: KeyPart::from_cell(site),
            point_name: KeyPart::from_cell(point_name),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope {
            unit: self.unit.clone(),
            site: self.site.clone(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.unit, self.subunit, self.site, self.point_name)
    }
}

/// Organizational scope for collision detection. Collisions are only resolved within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Scope {
    pub unit: KeyPart,
    pub site: KeyPart,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.unit, self.site)
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A latitude/longitude pair in decimal degrees (WGS-84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Exact-equality key. `-0.0` and `0.0` collapse to one key.
    pub fn exact_key(&self) -> (u64, u64) {
        ((self.lat + 0.0).to_bits(), (self.lon + 0.0).to_bits())
    }

    pub fn within(&self, other: &Coordinate, tolerance_deg: f64) -> bool {
        (self.lat - other.lat).abs() < tolerance_deg && (self.lon - other.lon).abs() < tolerance_deg
    }

    pub fn rounded(&self, decimals: u32) -> Self {
        Self {
            lat: round_to(self.lat, decimals),
            lon: round_to(self.lon, decimals),
        }
    }
}

/// Renders as `lat,lon`, e.g. `32.0004,35.0004`.
impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", format_degrees(self.lat), format_degrees(self.lon))
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Shortest round-trip decimal, always with a fractional part (`32.0`, not `32`).
pub fn format_degrees(value: f64) -> String {
    format!("{value:?}")
}

// ---------------------------------------------------------------------------
// Years
// ---------------------------------------------------------------------------

/// Campaign year as a two-digit code, `2015` → `"15"`.
pub fn year_code(year: i32) -> String {
    format!("{:02}", year.rem_euclid(100))
}

/// Sorted, de-duplicated two-digit codes joined with `;`.
pub fn year_codes(years: &[i32]) -> String {
    let mut codes: Vec<String> = years.iter().map(|&y| year_code(y)).collect();
    codes.sort();
    codes.dedup();
    codes.join(";")
}

/// Insert into a sorted, de-duplicated year list.
pub fn insert_year(years: &mut Vec<i32>, year: i32) {
    if let Err(pos) = years.binary_search(&year) {
        years.insert(pos, year);
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// One observation row.
#[derive(Debug, Clone)]
pub struct Record {
    /// Zero-based position in the input, used for first-seen ordering.
    pub position: usize,
    pub key: IdentityKey,
    pub year_raw: String,
    pub year: Option<i32>,
    /// Textual coordinate exactly as it arrived, written back as `orig_lat`/`orig_lon`.
    pub orig_lat: String,
    pub orig_lon: String,
    /// Working coordinate; `None` when either axis failed to parse.
    pub coordinate: Option<Coordinate>,
    /// Pass-through values aligned with `Table::extra_headers`.
    pub extra: Vec<String>,
}

/// Where each input column ends up in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Unit,
    Subunit,
    Site,
    PointName,
    Year,
    OrigLat,
    OrigLon,
    Extra(usize),
}

/// In-memory observation table. Column order is preserved for output.
#[derive(Debug, Clone)]
pub struct Table {
    pub layout: Vec<Column>,
    pub extra_headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    /// A table with the same columns and a different set of rows.
    pub fn with_rows(&self, rows: Vec<Record>) -> Self {
        Self {
            layout: self.layout.clone(),
            extra_headers: self.extra_headers.clone(),
            rows,
        }
    }

    pub fn extra_index(&self, name: &str) -> Option<usize> {
        self.extra_headers.iter().position(|h| h == name)
    }

    /// Output headers: input columns (with `lat`/`lon` renamed to
    /// `orig_lat`/`orig_lon`) followed by `latitude`, `longitude`.
    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = self
            .layout
            .iter()
            .map(|col| match col {
                Column::Unit => COL_UNIT.to_string(),
                Column::Subunit => COL_SUBUNIT.to_string(),
                Column::Site => COL_SITE.to_string(),
                Column::PointName => COL_POINT_NAME.to_string(),
                Column::Year => COL_YEAR.to_string(),
                Column::OrigLat => COL_ORIG_LAT.to_string(),
                Column::OrigLon => COL_ORIG_LON.to_string(),
                Column::Extra(i) => self.extra_headers[*i].clone(),
            })
            .collect();
        headers.push(COL_LATITUDE.to_string());
        headers.push(COL_LONGITUDE.to_string());
        headers
    }

    /// Output cells for one record, aligned with `headers()`.
    pub fn cells(&self, record: &Record) -> Vec<String> {
        let mut cells: Vec<String> = self
            .layout
            .iter()
            .map(|col| match col {
                Column::Unit => record.key.unit.as_str().to_string(),
                Column::Subunit => record.key.subunit.as_str().to_string(),
                Column::Site => record.key.site.as_str().to_string(),
                Column::PointName => record.key.point_name.as_str().to_string(),
                Column::Year => record.year_raw.clone(),
                Column::OrigLat => record.orig_lat.clone(),
                Column::OrigLon => record.orig_lon.clone(),
                Column::Extra(i) => record.extra.get(*i).cloned().unwrap_or_default(),
            })
            .collect();
        match record.coordinate {
            Some(c) => {
                cells.push(format_degrees(c.lat));
                cells.push(format_degrees(c.lon));
            }
            None => {
                cells.push(String::new());
                cells.push(String::new());
            }
        }
        cells
    }

    pub fn rows_with_coordinates(&self) -> usize {
        self.rows.iter().filter(|r| r.coordinate.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Distinct point-coordinate combinations
// ---------------------------------------------------------------------------

/// A deduplicated (identity key, coordinate) pair with the years it was observed in.
#[derive(Debug, Clone, Serialize)]
pub struct PointCombination {
    pub key: IdentityKey,
    pub coordinate: Coordinate,
    /// Sorted, unique.
    pub years: Vec<i32>,
    pub row_count: usize,
}

/// One distinct coordinate inside a point group.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinateObservation {
    pub coordinate: Coordinate,
    /// Sorted, unique.
    pub years: Vec<i32>,
    pub row_count: usize,
}
