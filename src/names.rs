// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Name Resolver (C2): loads an `IP -> display name` mapping from an external
//! CSV file, tolerating absence of the file and malformed individual rows.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

/// `ip -> name` mapping loaded from `camera_names.csv`.
pub struct NameMap {
    entries: HashMap<String, String>,
}

impl NameMap {
    pub fn get(&self, ip: &str) -> Option<&str> {
        self.entries.get(ip).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load the name map from `path`. A missing file yields an empty map rather
/// than an error — the CSV is an optional convenience, not a requirement.
/// The header row is skipped; rows with fewer than two non-empty columns are
/// silently dropped so a single malformed line never aborts the rest of the
/// file.
pub fn load_csv_names(path: &Path) -> NameMap {
    if !path.exists() {
        return NameMap { entries: HashMap::new() };
    }

    let mut entries = HashMap::new();
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read camera_names.csv, ignoring");
            return NameMap { entries };
        }
    };
    // Tolerate a UTF-8 BOM, matching the `utf-8-sig` decoding the original
    // tooling used.
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed camera_names.csv row");
                continue;
            }
        };
        let ip = record.get(0).map(str::trim).unwrap_or("");
        let name = record.get(1).map(str::trim).unwrap_or("");
        if ip.is_empty() {
            continue;
        }
        entries.insert(ip.to_string(), name.to_string());
    }

    NameMap { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_map() {
        let map = load_csv_names(Path::new("/nonexistent/camera_names.csv"));
        assert!(map.is_empty());
    }

    #[test]
    fn parses_header_and_rows_tolerating_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera_names.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "ip,name,note").unwrap();
        writeln!(f, "10.0.0.5,Lobby,extra").unwrap();
        writeln!(f, "10.0.0.6,Back Door").unwrap();
        drop(f);

        let map = load_csv_names(&path);
        assert_eq!(map.get("10.0.0.5"), Some("Lobby"));
        assert_eq!(map.get("10.0.0.6"), Some("Back Door"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn bom_prefixed_header_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera_names.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"\xEF\xBB\xBFip,name\n10.0.0.9,Gate\n").unwrap();
        drop(f);

        let map = load_csv_names(&path);
        assert_eq!(map.get("10.0.0.9"), Some("Gate"));
    }

    #[test]
    fn blank_ip_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera_names.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "ip,name").unwrap();
        writeln!(f, ",Ghost").unwrap();
        writeln!(f, "10.0.0.7,Side Gate").unwrap();
        drop(f);

        let map = load_csv_names(&path);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("10.0.0.7"), Some("Side Gate"));
    }
}
