// JSON audit report export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use georecon::AuditReport;

pub fn report_to_string(report: &AuditReport) -> Result<String, String> {
    serde_json::to_string_pretty(report).map_err(|e| e.to_string())
}

pub fn export_report(report: &AuditReport, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use georecon::{run_csv, NullReporter, ReconConfig, Stage};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_report_export() {
        let data = "unit,subunit,site,point_name,lat,lon,year\nU,,S,P,32.0,35.0,2010\nU,,S,P,95.0,35.0,2011\n";
        let report = run_csv(&ReconConfig::default(), data, "obs.csv", Stage::Clean, &mut NullReporter)
            .unwrap()
            .report;

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        export_report(&report, &path).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["meta"]["stage"], "clean");
        // Unmeasurable spread serializes as null.
        assert!(parsed["flagged"][0]["max_distance_m"].is_null());
        assert!(parsed["summary"]["conflicts"].is_null());
    }
}
