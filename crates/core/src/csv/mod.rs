//! CSV boundary parsing for the two input datasets.
//!
//! Rows are parsed into strongly typed records here; nothing downstream of
//! this module touches raw CSV. Header names come from configuration because
//! observed deployments localize them.

use crate::config::{MappingColumns, UsersColumns};
use crate::error::{DirsyncError, Result};
use crate::models::mapping::MappingRow;
use crate::models::user::DirectoryUser;

/// Parse the users dataset into [`DirectoryUser`] records, in row order.
pub fn read_users(bytes: &[u8], columns: &UsersColumns) -> Result<Vec<DirectoryUser>> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr
        .headers()
        .map_err(|e| DirsyncError::Input(format!("users dataset has no header row: {e}")))?
        .clone();

    let name_idx = column_index(&headers, &columns.name, "users")?;
    let email_idx = column_index(&headers, &columns.email, "users")?;
    let group_idx = column_index(&headers, &columns.group, "users")?;

    let mut users = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| {
            DirsyncError::Input(format!("users dataset row {}: {e}", line + 2))
        })?;
        users.push(DirectoryUser {
            name: field(&record, name_idx),
            email: field(&record, email_idx),
            group: field(&record, group_idx),
        });
    }
    Ok(users)
}

/// Parse the mapping dataset into [`MappingRow`] records, in row order.
/// Scope and roles fields are split on commas and trimmed here.
pub fn read_mappings(bytes: &[u8], columns: &MappingColumns) -> Result<Vec<MappingRow>> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr
        .headers()
        .map_err(|e| DirsyncError::Input(format!("mapping dataset has no header row: {e}")))?
        .clone();

    let group_idx = column_index(&headers, &columns.group, "mapping")?;
    let scope_idx = column_index(&headers, &columns.scope, "mapping")?;
    let roles_idx = column_index(&headers, &columns.roles, "mapping")?;

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| {
            DirsyncError::Input(format!("mapping dataset row {}: {e}", line + 2))
        })?;
        rows.push(MappingRow {
            group: field(&record, group_idx),
            scopes: split_list(&field(&record, scope_idx)),
            roles: split_list(&field(&record, roles_idx)),
        });
    }
    Ok(rows)
}

fn column_index(headers: &csv::StringRecord, name: &str, dataset: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| {
            DirsyncError::Input(format!("{dataset} dataset is missing column '{name}'"))
        })
}

fn field(record: &csv::StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or_default().trim().to_string()
}

fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }
}
