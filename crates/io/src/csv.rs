// CSV read/write for observation tables and review sheets

use std::io::{Read, Write};
use std::path::Path;

use georecon::cleaning::FlaggedGroup;
use georecon::conflicts::CrossScopeCollision;
use georecon::model::{year_codes, KeyPart, Table};

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| format!("{}: {e}", path.display()))?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn write_records<W: Write>(out: W, header: &[String], rows: Vec<Vec<String>>) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);
    writer.write_record(header).map_err(|e| e.to_string())?;
    for row in rows {
        writer.write_record(&row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

fn create(path: &Path) -> Result<std::fs::File, String> {
    std::fs::File::create(path).map_err(|e| format!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Observation table
// ---------------------------------------------------------------------------

pub fn write_table_to<W: Write>(table: &Table, out: W) -> Result<(), String> {
    let rows = table.rows.iter().map(|r| table.cells(r)).collect();
    write_records(out, &table.headers(), rows)
}

pub fn write_table(table: &Table, path: &Path) -> Result<(), String> {
    write_table_to(table, create(path)?)
}

// ---------------------------------------------------------------------------
// Flagged discrepancies
// ---------------------------------------------------------------------------

pub fn flagged_header(slots: usize) -> Vec<String> {
    let mut header: Vec<String> = [
        "unit",
        "subunit",
        "site",
        "point_name",
        "max_distance_meters",
        "coordinate_count",
        "row_count",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for i in 1..=slots {
        header.push(format!("coordinates_{i}"));
    }
    for i in 1..=slots {
        header.push(format!("years_{i}"));
    }
    for i in 1..=slots {
        for field in ["unit", "subunit", "site", "name", "distance_m", "years"] {
            header.push(format!("nearest_point_{i}_{field}"));
        }
    }
    header
}

/// One decimal, or `inf` when a coordinate was unusable.
pub fn format_meters(meters: f64) -> String {
    if meters.is_finite() {
        format!("{meters:.1}")
    } else {
        "inf".to_string()
    }
}

pub fn flagged_row(group: &FlaggedGroup, slots: usize) -> Vec<String> {
    let key = &group.key;
    let mut row = vec![
        key.unit.as_str().to_string(),
        key.subunit.as_str().to_string(),
        key.site.as_str().to_string(),
        key.point_name.as_str().to_string(),
        format_meters(group.max_distance_m),
        group.coordinates.len().to_string(),
        group.row_count.to_string(),
    ];
    let slot = |i: usize| group.coordinates.get(i);

    for i in 0..slots {
        row.push(slot(i).map(|c| c.coordinate.to_string()).unwrap_or_default());
    }
    for i in 0..slots {
        row.push(slot(i).map(|c| year_codes(&c.years)).unwrap_or_default());
    }
    for i in 0..slots {
        match slot(i).and_then(|c| c.nearest.as_ref()) {
            Some(n) => {
                row.push(n.key.unit.as_str().to_string());
                row.push(n.key.subunit.as_str().to_string());
                row.push(n.key.site.as_str().to_string());
                row.push(n.key.point_name.as_str().to_string());
                row.push(format_meters(n.distance_m));
                row.push(year_codes(&n.years));
            }
            None => row.extend(std::iter::repeat(String::new()).take(6)),
        }
    }
    row
}

pub fn write_flagged_to<W: Write>(flagged: &[FlaggedGroup], slots: usize, out: W) -> Result<(), String> {
    let rows = flagged.iter().map(|g| flagged_row(g, slots)).collect();
    write_records(out, &flagged_header(slots), rows)
}

pub fn write_flagged(flagged: &[FlaggedGroup], slots: usize, path: &Path) -> Result<(), String> {
    write_flagged_to(flagged, slots, create(path)?)
}

// ---------------------------------------------------------------------------
// Cross-scope conflicts
// ---------------------------------------------------------------------------

pub const CONFLICT_HEADER: [&str; 7] = [
    "coordinates",
    "conflict_count",
    "units",
    "sites",
    "point_names",
    "years",
    "suggested_fix",
];

fn join_unique<'a>(parts: impl Iterator<Item = &'a KeyPart>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for p in parts {
        if !seen.contains(&p.as_str()) {
            seen.push(p.as_str());
        }
    }
    seen.join(";")
}

pub fn conflict_row(collision: &CrossScopeCollision) -> Vec<String> {
    vec![
        collision.bucket.to_string(),
        collision.point_names.len().to_string(),
        join_unique(collision.scopes.iter().map(|s| &s.unit)),
        join_unique(collision.scopes.iter().map(|s| &s.site)),
        join_unique(collision.point_names.iter()),
        year_codes(&collision.years),
        format!(
            "Review manually; most recent name is '{}'",
            collision.suggested_name.as_str()
        ),
    ]
}

pub fn write_conflicts_to<W: Write>(collisions: &[CrossScopeCollision], out: W) -> Result<(), String> {
    let header: Vec<String> = CONFLICT_HEADER.iter().map(|s| s.to_string()).collect();
    let rows = collisions.iter().map(conflict_row).collect();
    write_records(out, &header, rows)
}

pub fn write_conflicts(collisions: &[CrossScopeCollision], path: &Path) -> Result<(), String> {
    write_conflicts_to(collisions, create(path)?)
}
