// panwctl - CLI utilities for Palo Alto Networks firewalls and Panorama
// Copyright (C) 2025 panwctl authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Aligned columns with a header, for interactive use
    Table,
    /// One bare field per line, for piping into another panwctl invocation
    Terse,
    /// The response as received (XML or CLI text)
    Raw,
}

/// Aligned table: header, a `=` rule per column, then rows. Column widths
/// follow the longest cell.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx < widths.len() {
                widths[idx] = widths[idx].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    for (idx, header) in headers.iter().enumerate() {
        if idx > 0 {
            out.push_str("  ");
        }
        out.push_str(&format!("{:width$}", header, width = widths[idx]));
    }
    out.push('\n');
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            out.push_str("  ");
        }
        out.push_str(&"=".repeat(*width));
    }
    out.push('\n');
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx > 0 {
                out.push_str("  ");
            }
            out.push_str(&format!("{:width$}", cell, width = widths[idx]));
        }
        out.push('\n');
    }
    out
}

/// One value per line, no header.
pub fn terse<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for value in values {
        out.push_str(value.as_ref());
        out.push('\n');
    }
    out
}

/// Per-host frame used when printing opaque blobs (configs, command output)
/// for several targets in one run.
pub fn banner(host: &str) -> String {
    let rule = "=".repeat(host.len() + 4);
    format!("{rule}\n= {host} =\n{rule}")
}

/// Section marker for one command's output inside a host block.
pub fn section(title: &str) -> String {
    format!("=== {title} ===")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_to_widest_cell() {
        let rows = vec![
            vec!["fw01".to_string(), "up".to_string()],
            vec!["fw-long-name".to_string(), "down".to_string()],
        ];
        let out = table(&["Host", "State"], &rows);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Host          State");
        assert_eq!(lines[1], "============  =====");
        assert_eq!(lines[2], "fw01          up   ");
        assert_eq!(lines[3], "fw-long-name  down ");
    }

    #[test]
    fn terse_is_one_value_per_line() {
        let out = terse(["fw01", "fw02"]);
        assert_eq!(out, "fw01\nfw02\n");
    }

    #[test]
    fn banner_frames_the_host() {
        assert_eq!(banner("fw01"), "========\n= fw01 =\n========");
    }
}
