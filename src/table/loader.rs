//! Table loader: turns raw grid rows into the credential store and catalogs.
//!
//! Layout: row 0 is the header. Columns 0..=3 are identifier, title, role and
//! bot alias; columns 4.. are free-form attributes named by the header.
//! Every cell is normalized before use. Sheets trims trailing empty cells, so
//! a row only needs the columns its role reads; missing attributes are absent.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::DataFormatError;
use crate::pipeline::normalize::normalize;
use crate::table::{Attributes, Role, Tables};

const ID_COL: usize = 0;
const TITLE_COL: usize = 1;
const ROLE_COL: usize = 2;
const ALIAS_COL: usize = 3;

/// First column holding a named attribute.
pub const ATTRIBUTE_OFFSET: usize = 4;

/// Build the three maps from a raw grid.
///
/// Fails if the header is missing or too short, if a row lacks the columns
/// its role needs, or if a row is longer than the header.
pub fn load_tables(rows: &[Vec<String>]) -> Result<Tables, DataFormatError> {
    let (header, body) = rows.split_first().ok_or(DataFormatError::MissingHeader)?;
    let header: Vec<String> = header.iter().map(|c| normalize(c)).collect();

    if header.len() < ATTRIBUTE_OFFSET {
        return Err(DataFormatError::ShortHeader {
            found: header.len(),
            required: ATTRIBUTE_OFFSET,
        });
    }

    let mut tables = Tables::default();
    // Bot alias -> id of the row that registered it
    let mut alias_owners: HashMap<String, String> = HashMap::new();

    for (offset, raw) in body.iter().enumerate() {
        // 1-based sheet row number, header included
        let row_number = offset + 2;
        let row: Vec<String> = raw.iter().map(|c| normalize(c)).collect();

        if row.iter().all(String::is_empty) {
            debug!(row = row_number, "Skipping blank row");
            continue;
        }
        require_columns(&row, ROLE_COL + 1, row_number)?;
        if row.len() > header.len() {
            return Err(DataFormatError::LongRow {
                row: row_number,
                found: row.len(),
                named: header.len(),
            });
        }

        let id = row[ID_COL].clone();
        if id.is_empty() {
            return Err(DataFormatError::EmptyIdentifier { row: row_number });
        }

        let attributes: Attributes = header
            .iter()
            .zip(row.iter())
            .skip(ATTRIBUTE_OFFSET)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut entity = Attributes::new();
        entity.insert("title".to_string(), row[TITLE_COL].clone());
        entity.extend(attributes.clone());
        if tables.entities.insert(id.clone(), entity).is_some() {
            warn!(row = row_number, id = %id, "Duplicate entity, later row wins");
            tables.credentials.remove(&id);
            alias_owners.retain(|alias, owner| {
                if *owner != id {
                    return true;
                }
                tables.bots.remove(alias);
                false
            });
        }

        let Some(role) = Role::parse(&row[ROLE_COL]) else {
            warn!(
                row = row_number,
                id = %id,
                role = %row[ROLE_COL],
                "Unrecognized role, entity will not be able to send commands"
            );
            continue;
        };

        if role == Role::Bot {
            require_columns(&row, ALIAS_COL + 1, row_number)?;
            let alias = row[ALIAS_COL].clone();
            if alias.is_empty() {
                return Err(DataFormatError::MissingAlias { row: row_number });
            }
            if tables.bots.insert(alias.clone(), attributes).is_some() {
                warn!(row = row_number, alias = %alias, "Duplicate bot alias, later row wins");
            }
            alias_owners.insert(alias, id.clone());
        }

        tables.credentials.insert(id, role);
    }

    info!(
        senders = tables.credentials.len(),
        bots = tables.bots.len(),
        entities = tables.entities.len(),
        "Loaded tables"
    );

    Ok(tables)
}

fn require_columns(row: &[String], required: usize, row_number: usize) -> Result<(), DataFormatError> {
    if row.len() < required {
        return Err(DataFormatError::ShortRow {
            row: row_number,
            found: row.len(),
            required,
        });
    }
    Ok(())
}
