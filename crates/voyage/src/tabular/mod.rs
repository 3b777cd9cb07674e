//! Tabular override store.
//!
//! Dry runs write operator-editable CSV files describing what would be
//! migrated; a later run reads them back and applies the edits. This module
//! owns the file format: parsing, writing, directory loading and the
//! interpretation of `Include` cells.
//!
//! # Example
//!
//! ```ignore
//! use voyage::tabular::{self, OverrideFile};
//!
//! let tables = tabular::load_directory("mappings".as_ref());
//! if let Some(groups) = tables.get(OverrideFile::Groups.file_name()) {
//!     for record in groups.records() {
//!         println!("{:?} included={}", record.get("Group Name"), record.is_included());
//!     }
//! }
//! ```

mod csv;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

pub use csv::{escape_field, parse_records, write_records};

/// Name of the decision column. Always the first column of written files.
pub const INCLUDE_COLUMN: &str = "Include";

/// Errors raised while reading tabular files.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("file has no header row")]
    MissingHeader,

    #[error("row {row} has {found} cells but the header has {expected}")]
    RowTooLong {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

/// Decide whether an `Include` cell means "include".
///
/// Absent or blank cells are included. Otherwise only `yes`, `true` and `1`
/// (case-insensitive, surrounding whitespace ignored) include; any other value
/// excludes.
pub fn is_included(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => true,
        Some(v) => ["yes", "true", "1"].iter().any(|t| v.eq_ignore_ascii_case(t)),
    }
}

/// The override files a dry run produces and a migration recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverrideFile {
    Projects,
    QualityGates,
    QualityProfiles,
    Groups,
    GlobalPermissions,
    PermissionTemplates,
    Portfolios,
}

impl OverrideFile {
    pub const ALL: [OverrideFile; 7] = [
        OverrideFile::Projects,
        OverrideFile::QualityGates,
        OverrideFile::QualityProfiles,
        OverrideFile::Groups,
        OverrideFile::GlobalPermissions,
        OverrideFile::PermissionTemplates,
        OverrideFile::Portfolios,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            OverrideFile::Projects => "projects.csv",
            OverrideFile::QualityGates => "gate-mappings.csv",
            OverrideFile::QualityProfiles => "profile-mappings.csv",
            OverrideFile::Groups => "group-mappings.csv",
            OverrideFile::GlobalPermissions => "global-permissions.csv",
            OverrideFile::PermissionTemplates => "template-mappings.csv",
            OverrideFile::Portfolios => "portfolio-mappings.csv",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.file_name() == name)
    }
}

/// A parsed table: ordered headers and rows aligned to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Parse CSV text. The first record is the header row.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut records = parse_records(text)?.into_iter();
        let headers: Vec<String> = records
            .next()
            .ok_or(TableError::MissingHeader)?
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut table = Self {
            headers,
            rows: Vec::new(),
        };
        for (i, record) in records.enumerate() {
            if record.len() > table.headers.len() {
                return Err(TableError::RowTooLong {
                    row: i + 2,
                    expected: table.headers.len(),
                    found: record.len(),
                });
            }
            table.push_row(record);
        }
        Ok(table)
    }

    /// Append a row, padding missing trailing cells with empty strings.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len().max(row.len()), String::new());
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a column exists (header names compare case-insensitively).
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |values| Record {
            table: self,
            values,
        })
    }

    /// Serialize back to CSV text.
    pub fn to_csv(&self) -> String {
        write_records(&self.headers, &self.rows)
    }
}

/// One row of a [`Table`], addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    values: &'a [String],
}

impl<'a> Record<'a> {
    /// Cell value by header name; `None` if the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column_index(column)?;
        self.values.get(idx).map(String::as_str)
    }

    /// Trimmed, non-empty cell value.
    pub fn value(&self, column: &str) -> Option<&'a str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_included(&self) -> bool {
        is_included(self.get(INCLUDE_COLUMN))
    }
}

/// Read and parse a single CSV file.
pub fn read_file(path: &Path) -> Result<Table, TableError> {
    let text = fs::read_to_string(path).map_err(|e| TableError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Table::parse(&text)
}

/// Load every `*.csv` file in `dir`, keyed by file name.
///
/// Files that cannot be read or parsed, and files with no data rows, are
/// skipped with a warning. A missing directory yields an empty map.
pub fn load_directory(dir: &Path) -> BTreeMap<String, Table> {
    let mut tables = BTreeMap::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Mappings directory not readable, no overrides loaded");
            return tables;
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };

        match read_file(&path) {
            Ok(table) if table.is_empty() => {
                tracing::warn!(file = %name, "Skipping empty mappings file");
            }
            Ok(table) => {
                if OverrideFile::from_file_name(&name).is_none() {
                    tracing::debug!(file = %name, "Unrecognized mappings file, it will be ignored");
                }
                tables.insert(name, table);
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Skipping unreadable mappings file");
            }
        }
    }

    tables
}
