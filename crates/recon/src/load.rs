use crate::error::ReconError;
use crate::model::*;

/// Columns every input must carry, besides a coordinate pair.
pub const REQUIRED_COLUMNS: [&str; 5] = [COL_UNIT, COL_SUBUNIT, COL_SITE, COL_POINT_NAME, COL_YEAR];

/// Which header pair the working coordinate is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinateSource {
    /// Raw export: `lat`, `lon`.
    Raw { lat: usize, lon: usize },
    /// Previously cleaned: `orig_lat`, `orig_lon`, `latitude`, `longitude`.
    Cleaned { lat: usize, lon: usize, orig_lat: usize, orig_lon: usize },
}

/// Parse CSV text into a table.
///
/// Required columns are checked before any row is read. Coordinates that
/// fail to parse become `None`; parsed ones are rounded to `decimals`.
pub fn load_csv(csv_data: &str, decimals: u32) -> Result<Table, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let position = |name: &str| headers.iter().position(|h| h == name);

    for column in REQUIRED_COLUMNS {
        if position(column).is_none() {
            return Err(ReconError::MissingColumn { column: column.into() });
        }
    }

    let source = match (position(COL_LAT), position(COL_LON)) {
        (Some(lat), Some(lon)) => CoordinateSource::Raw { lat, lon },
        (lat, lon) => {
            let cleaned = (
                position(COL_ORIG_LAT),
                position(COL_ORIG_LON),
                position(COL_LATITUDE),
                position(COL_LONGITUDE),
            );
            match cleaned {
                (Some(orig_lat), Some(orig_lon), Some(lat), Some(lon)) => {
                    CoordinateSource::Cleaned { lat, lon, orig_lat, orig_lon }
                }
                _ => {
                    let column = if lat.is_none() { COL_LAT } else { COL_LON };
                    return Err(ReconError::MissingColumn { column: column.into() });
                }
            }
        }
    };

    let (layout, extra_headers, extra_sources) = build_layout(&headers, source);

    let idx = |name: &str| position(name).unwrap_or(0);
    let unit_idx = idx(COL_UNIT);
    let subunit_idx = idx(COL_SUBUNIT);
    let site_idx = idx(COL_SITE);
    let point_idx = idx(COL_POINT_NAME);
    let year_idx = idx(COL_YEAR);
    let (lat_idx, lon_idx, orig_lat_idx, orig_lon_idx) = match source {
        CoordinateSource::Raw { lat, lon } => (lat, lon, lat, lon),
        CoordinateSource::Cleaned { lat, lon, orig_lat, orig_lon } => (lat, lon, orig_lat, orig_lon),
    };

    let mut rows = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("");

        let coordinate = match (parse_degrees(cell(lat_idx)), parse_degrees(cell(lon_idx))) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon).rounded(decimals)),
            _ => None,
        };

        rows.push(Record {
            position: row_index,
            key: IdentityKey::new(cell(unit_idx), cell(subunit_idx), cell(site_idx), cell(point_idx)),
            year_raw: cell(year_idx).to_string(),
            year: parse_year(cell(year_idx)),
            orig_lat: cell(orig_lat_idx).to_string(),
            orig_lon: cell(orig_lon_idx).to_string(),
            coordinate,
            extra: extra_sources.iter().map(|&i| cell(i).to_string()).collect(),
        });
    }

    Ok(Table { layout, extra_headers, rows })
}

/// Map input headers to output columns. Returns the layout, the names of
/// pass-through columns and their input positions.
fn build_layout(headers: &[String], source: CoordinateSource) -> (Vec<Column>, Vec<String>, Vec<usize>) {
    let mut layout = Vec::new();
    let mut extra_headers = Vec::new();
    let mut extra_sources = Vec::new();
    let mut seen_key = [false; 5];

    for (i, header) in headers.iter().enumerate() {
        let key_slot = REQUIRED_COLUMNS.iter().position(|c| c == header);
        if let Some(slot) = key_slot {
            if !seen_key[slot] {
                seen_key[slot] = true;
                layout.push(match slot {
                    0 => Column::Unit,
                    1 => Column::Subunit,
                    2 => Column::Site,
                    3 => Column::PointName,
                    _ => Column::Year,
                });
                continue;
            }
        }

        let coordinate_column = match source {
            CoordinateSource::Raw { lat, lon } => {
                if i == lat {
                    Some(Some(Column::OrigLat))
                } else if i == lon {
                    Some(Some(Column::OrigLon))
                } else if [COL_ORIG_LAT, COL_ORIG_LON, COL_LATITUDE, COL_LONGITUDE, COL_LAT, COL_LON]
                    .contains(&header.as_str())
                {
                    // Stale derived columns; regenerated on output.
                    Some(None)
                } else {
                    None
                }
            }
            CoordinateSource::Cleaned { lat, lon, orig_lat, orig_lon } => {
                if i == orig_lat {
                    Some(Some(Column::OrigLat))
                } else if i == orig_lon {
                    Some(Some(Column::OrigLon))
                } else if i == lat || i == lon {
                    Some(None)
                } else {
                    None
                }
            }
        };

        match coordinate_column {
            Some(Some(col)) => layout.push(col),
            Some(None) => {}
            None => {
                layout.push(Column::Extra(extra_headers.len()));
                extra_headers.push(header.clone());
                extra_sources.push(i);
            }
        }
    }

    (layout, extra_headers, extra_sources)
}

/// Numeric coercion for a coordinate cell. Blank or non-numeric → `None`.
pub fn parse_degrees(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Accepts `2015` and `2015.0`. Anything else → `None`.
pub fn parse_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(year) = trimmed.parse::<i32>() {
        return Some(year);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "\
unit,subunit,site,point_name,lat,lon,year,species
Maquis,,Ofer,Ofer Far 5,32.73293057,35.01422596,2015.0,Sylvia
Maquis,North,Ofer,Ofer Near 1,n/a,35.1,2014,
";

    #[test]
    fn load_raw_export() {
        let table = load_csv(RAW, 6).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.extra_headers, vec!["species"]);

        let first = &table.rows[0];
        assert!(first.key.subunit.is_missing());
        assert_eq!(first.year, Some(2015));
        assert_eq!(first.coordinate, Some(Coordinate::new(32.732931, 35.014226)));
        assert_eq!(first.orig_lat, "32.73293057");

        let second = &table.rows[1];
        assert_eq!(second.coordinate, None);
        assert_eq!(second.position, 1);
    }

    #[test]
    fn output_headers_rename_coordinates() {
        let table = load_csv(RAW, 6).unwrap();
        assert_eq!(
            table.headers(),
            vec![
                "unit", "subunit", "site", "point_name", "orig_lat", "orig_lon", "year",
                "species", "latitude", "longitude"
            ]
        );
        let cells = table.cells(&table.rows[0]);
        assert_eq!(cells[6], "2015.0");
        assert_eq!(cells[8], "32.732931");
    }

    #[test]
    fn load_cleaned_file() {
        let data = "\
unit,subunit,site,point_name,orig_lat,orig_lon,year,latitude,longitude
Maquis,,Ofer,P1,32.0,35.0,2010,32.0004,35.0004
";
        let table = load_csv(data, 6).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.coordinate, Some(Coordinate::new(32.0004, 35.0004)));
        assert_eq!(row.orig_lat, "32.0");
        assert_eq!(
            table.headers(),
            vec!["unit", "subunit", "site", "point_name", "orig_lat", "orig_lon", "year", "latitude", "longitude"]
        );
    }

    #[test]
    fn missing_required_column() {
        let err = load_csv("unit,subunit,site,lat,lon,year\n", 6).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column } if column == "point_name"));
    }

    #[test]
    fn missing_coordinate_column() {
        let err = load_csv("unit,subunit,site,point_name,lat,year\n", 6).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column } if column == "lon"));
    }

    #[test]
    fn ragged_row_is_csv_error() {
        let data = "unit,subunit,site,point_name,lat,lon,year\nA,,S,P,1,2\n";
        let err = load_csv(data, 6).unwrap_err();
        assert!(matches!(err, ReconError::Csv(_)));
    }

    #[test]
    fn year_parsing() {
        assert_eq!(parse_year("2015"), Some(2015));
        assert_eq!(parse_year("2015.0"), Some(2015));
        assert_eq!(parse_year(" 2009 "), Some(2009));
        assert_eq!(parse_year("2015.5"), None);
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("spring"), None);
    }

    #[test]
    fn degree_parsing() {
        assert_eq!(parse_degrees("35.1"), Some(35.1));
        assert_eq!(parse_degrees(""), None);
        assert_eq!(parse_degrees("NaN"), None);
        assert_eq!(parse_degrees("abc"), None);
    }
}
