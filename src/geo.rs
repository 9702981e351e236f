//! ZIP centroids backing the `calculate_zip_distance` database function.

use std::path::Path;

use anyhow::{Context, anyhow};

#[derive(Debug, Clone, PartialEq)]
pub struct ZipCentroid {
    pub zip5: String,
    pub lat: f64,
    pub lon: f64,
}

/// First run of five digits, so `"10001-1234"` and `" 02139"` both normalize.
pub fn normalize_zip5(s: &str) -> Option<String> {
    let mut digits = String::with_capacity(5);
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 5 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    (digits.len() == 5).then_some(digits)
}

pub fn read_geonames_file(path: &Path) -> anyhow::Result<Vec<ZipCentroid>> {
    let data = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_geonames(&data).with_context(|| format!("parse {}", path.display()))
}

/// GeoNames postal export: tab separated, postal code in column 2, lat/lon in 10 and 11.
pub fn parse_geonames(data: &str) -> anyhow::Result<Vec<ZipCentroid>> {
    let mut out = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 11 {
            return Err(anyhow!(
                "line {} has too few columns ({})",
                lineno + 1,
                parts.len()
            ));
        }
        let Some(zip5) = normalize_zip5(parts[1]) else {
            continue;
        };
        let lat: f64 = parts[9]
            .trim()
            .parse()
            .with_context(|| format!("line {}: latitude", lineno + 1))?;
        let lon: f64 = parts[10]
            .trim()
            .parse()
            .with_context(|| format!("line {}: longitude", lineno + 1))?;
        out.push(ZipCentroid { zip5, lat, lon });
    }
    Ok(out)
}
