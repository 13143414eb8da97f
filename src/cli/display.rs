//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use chrono::Utc;

use crate::cluster::CloudletSummary;
use crate::config::{Pipelines, ValidationResult, ValidationSeverity};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

// ============================================================================
// Cloudlet display
// ============================================================================

/// Format the cloudlet listing of a broker
pub fn format_cloudlet_list(cloudlets: &[CloudletSummary]) -> String {
    let headers = &["NAME", "UUID", "ENDPOINT", "CPU", "MEM", "LOCATION", "LAST SEEN"];
    let now = Utc::now();
    let rows: Vec<Vec<String>> = cloudlets
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.uuid.to_string(),
                c.endpoint.clone(),
                format!("{:.1}/{:.1}", c.resources.cpu_used, c.resources.cpu_avail),
                format_bytes(c.resources.mem_avail),
                c.location
                    .map(|l| format!("{:.2},{:.2}", l.latitude, l.longitude))
                    .unwrap_or_else(|| "-".to_string()),
                c.last_update
                    .map(|t| format!("{}s ago", (now - t).num_seconds().max(0)))
                    .unwrap_or_else(|| "never".to_string()),
            ]
        })
        .collect();

    format_table(headers, rows)
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0}{}", value, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

// ============================================================================
// Matcher display
// ============================================================================

/// Format available stages and the configured pipelines
pub fn format_matchers<'a>(
    stages: impl IntoIterator<Item = &'a str>,
    pipelines: &Pipelines,
) -> String {
    let mut output = String::from("Available stages:\n");
    for stage in stages {
        output.push_str(&format!("  {}\n", stage));
    }

    output.push_str("\nConfigured pipelines:\n");
    let rows: Vec<Vec<String>> = pipelines
        .values()
        .map(|p| vec![p.class().to_string(), p.names().join(" -> ")])
        .collect();
    output.push_str(&format_table(&["CLASS", "STAGES"], rows));
    output
}

// ============================================================================
// Validation display
// ============================================================================

pub fn format_validation_result(result: &ValidationResult) -> String {
    let mut output = String::new();
    for msg in &result.messages {
        let marker = match msg.severity {
            ValidationSeverity::Error => "✗",
            ValidationSeverity::Warning => "!",
        };
        output.push_str(&format!("{} {}\n", marker, msg));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{CloudletResources, GeoLocation};
    use crate::config::{resolve_pipelines, validate_config, BrokerConfig};
    use crate::matcher::StageRegistry;
    use uuid::Uuid;

    #[test]
    fn test_format_table_empty() {
        assert_eq!(format_table(&["A"], vec![]), "No resources found.\n");
    }

    #[test]
    fn test_format_table_aligns_columns() {
        let table = format_table(
            &["name", "cpu"],
            vec![
                vec!["a".into(), "1".into()],
                vec!["longer".into(), "2".into()],
            ],
        );
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "NAME     CPU");
        assert_eq!(lines[1].trim_end(), "a        1");
    }

    #[test]
    fn test_format_cloudlet_list() {
        let summary = CloudletSummary {
            uuid: Uuid::nil(),
            name: "edge-a".into(),
            endpoint: "http://edge-a/api/v1/deploy".into(),
            location: Some(GeoLocation::new(40.44, -79.94)),
            resources: CloudletResources {
                cpu_avail: 4.0,
                cpu_used: 1.0,
                mem_avail: 2.0 * 1024.0 * 1024.0 * 1024.0,
                ..Default::default()
            },
            last_update: None,
        };

        let output = format_cloudlet_list(&[summary]);

        assert!(output.contains("edge-a"));
        assert!(output.contains("1.0/4.0"));
        assert!(output.contains("2.0GiB"));
        assert!(output.contains("40.44,-79.94"));
        assert!(output.contains("never"));
    }

    #[test]
    fn test_format_matchers() {
        let registry = StageRegistry::with_builtins();
        let pipelines = resolve_pipelines(&BrokerConfig::default(), &registry).unwrap();

        let output = format_matchers(registry.names(), &pipelines);

        assert!(output.contains("  balance-cpu-mem\n"));
        assert!(output.contains("network -> location -> random"));
    }

    #[test]
    fn test_format_validation_result() {
        let mut config = BrokerConfig::default();
        config
            .matchers
            .insert("batch".into(), vec!["random".into(), "nope".into()]);
        let result = validate_config(&config, &StageRegistry::with_builtins());

        let output = format_validation_result(&result);

        assert!(output.contains("✗ [UNKNOWN_STAGE]"));
        assert!(output.contains("! [SHADOWED_STAGES]"));
    }
}
