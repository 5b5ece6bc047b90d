//! Plain-text renderings of a batch: the `info` table and the `apply` summary.

use std::fmt::Write;

use crate::batch::VmOutcome;
use crate::config::GlobalDefaults;
use crate::declaration::Batch;
use crate::resolve::SpecResolver;

const COLUMNS: [&str; 7] = [
    "SERVERS",
    "SYSTEM",
    "RAM",
    "CPUS",
    "BRIDGE",
    "MAC ADDRESS",
    "DISK SIZE",
];

/// Resolve every declaration and lay the results out as a table.
/// Declarations that fail to resolve get a row carrying the error.
pub fn render_info(title: &str, batch: &Batch, defaults: &GlobalDefaults) -> String {
    let resolver = SpecResolver::new(defaults);
    let mut rows = Vec::with_capacity(batch.vms.len());
    let mut problems = Vec::new();

    for (index, decl) in batch.vms.iter().enumerate() {
        let mut name = resolver.vm_name(index, decl);
        if decl.is_ignored() {
            name.push_str(" (ignored)");
        }
        match resolver.resolve(index, decl) {
            Ok(spec) => rows.push([
                name,
                spec.os_variant,
                format!("{} MB", spec.ram),
                spec.vcpus,
                spec.bridge,
                spec.mac_address,
                format!("{} GB", spec.disk_size),
            ]),
            Err(e) => {
                let mut row: [String; 7] = Default::default();
                row[0] = name;
                row[1] = "-".into();
                problems.push(e.to_string());
                rows.push(row);
            }
        }
    }

    let mut out = render_table(&title.to_uppercase(), &rows);
    for problem in problems {
        let _ = writeln!(out, "error: {problem}");
    }
    out
}

fn render_table(title: &str, rows: &[[String; 7]]) -> String {
    let mut widths = COLUMNS.map(str::len);
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    write_row(&mut out, &widths, COLUMNS.iter().copied());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(&mut out, &widths, rule.iter().map(String::as_str));
    for row in rows {
        write_row(&mut out, &widths, row.iter().map(String::as_str));
    }
    out
}

fn write_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}

/// One line per VM: name, status, and the disk path or the reason.
pub fn render_summary(outcomes: &[VmOutcome]) -> String {
    let name_width = outcomes.iter().map(|o| o.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for o in outcomes {
        let detail = match (o.error(), o.staging().and_then(|s| s.dest_image.as_ref())) {
            (Some(e), _) => e.to_string(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::new(),
        };
        let line = format!("{:<name_width$}  {:<16}  {detail}", o.name, o.status.label());
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::batch::VmStatus;
    use crate::config::tests::test_defaults;
    use crate::declaration::parse_batch;
    use crate::error::KvmError;

    fn defaults() -> GlobalDefaults {
        test_defaults(Path::new("/srv/artifacts"), Some(Path::new("/images")))
    }

    #[test]
    fn info_table_lists_resolved_values() {
        let yaml = r#"
vms:
  - info:
      name: web-1
      image: rocky9.1
      ram: 1536
      os: rocky9
    storage:
      disk:
        format: qcow2
        size: 30
  - info:
      image: rocky9.1
    storage:
      disk:
        format: qcow2
"#;
        let batch = parse_batch(yaml, Path::new("servers.yml")).unwrap();
        let table = render_info("servers.yml", &batch, &defaults());
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines[0], "SERVERS.YML");
        assert!(lines[1].starts_with("SERVERS"));
        assert!(lines[1].contains("MAC ADDRESS"));
        assert!(lines[3].starts_with("web-1"));
        assert!(lines[3].contains("rocky9"));
        assert!(lines[3].contains("1536 MB"));
        assert!(lines[3].contains("30 GB"));
        assert!(lines[4].starts_with("kvm-2"));
        assert!(lines[4].contains("generic"));
        assert!(lines[4].contains("2048 MB"));
        assert!(lines[4].contains("20 GB"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn info_table_reports_unresolvable_rows() {
        let yaml = "vms:\n  - info:\n      name: bad\n  - info:\n      name: skip\n      ignore: true\n    storage:\n      disk:\n        format: raw\n";
        let batch = parse_batch(yaml, Path::new("servers.yml")).unwrap();
        let table = render_info("servers.yml", &batch, &defaults());

        assert!(table.contains("\nbad "));
        assert!(table.contains("skip (ignored)"));
        assert!(table.contains("error: bad: missing required field `storage.disk.format`"));
    }

    #[test]
    fn summary_shows_reason_for_failures() {
        let outcomes = vec![
            VmOutcome {
                index: 0,
                name: "web-1".into(),
                status: VmStatus::Unresolved(KvmError::MissingField {
                    vm: "web-1".into(),
                    field: "storage.disk.format",
                }),
            },
            VmOutcome {
                index: 1,
                name: "kvm-2".into(),
                status: VmStatus::Ignored,
            },
        ];
        let summary = render_summary(&outcomes);
        let lines: Vec<_> = summary.lines().collect();
        assert!(lines[0].starts_with("web-1  unresolved"));
        assert!(lines[0].ends_with("missing required field `storage.disk.format`"));
        assert_eq!(lines[1], "kvm-2  ignored");
    }
}
