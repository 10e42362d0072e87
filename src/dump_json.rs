//! Purpose: JSON renderers for the `info`, `schema`, and `dump` commands.
//! Exports: `info_json`, `schema_json`, `rows_json`, `insert_table_name`.
//! Role: Presentation only; every value comes from the `api` accessors.
//! Invariants: A cell that fails to decode renders as an `{"error": ...}` object and
//! never aborts the surrounding table.
//! Invariants: Backlink columns are labelled `<- Table.column` after their origin; other
//! columns without a readable name are labelled `column N`.

use std::fmt::Write as _;

use realm_reader::api::{
    ColumnType, Error, ErrorKind, Group, RealmFile, Table, TableSpec, Timestamp, Value as Cell,
};
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;

use crate::error_json;

pub(crate) fn info_json(file: &RealmFile, group: &Group<'_>) -> Result<Value, Error> {
    let header = file.header();
    let mut map = Map::new();
    if let Some(path) = file.path() {
        map.insert("path".to_string(), json!(path.display().to_string()));
    }
    map.insert("file_size".to_string(), json!(file.len()));
    map.insert(
        "header".to_string(),
        json!({
            "top_refs": header.top_refs,
            "flags": header.flags,
            "selected": header.selected_slot(),
        }),
    );
    map.insert("logical_file_size".to_string(), json!(group.logical_file_size()?));
    map.insert("file_format_version".to_string(), json!(group.file_format_version()));

    let mut tables = Vec::new();
    for index in 0..group.table_count() {
        let counts = group
            .table(index)
            .and_then(|table| Ok((table.column_count(), table.row_count()?)));
        let mut entry = match counts {
            Ok((columns, rows)) => json!({ "columns": columns, "rows": rows }),
            Err(err) => error_json(&err),
        };
        insert_table_name(&mut entry, group, index);
        tables.push(entry);
    }
    map.insert("tables".to_string(), Value::Array(tables));
    Ok(Value::Object(map))
}

pub(crate) fn schema_json(group: &Group<'_>, spec: &TableSpec<'_>) -> Value {
    let columns = (0..spec.column_count())
        .map(|column| column_json(group, spec, column))
        .collect::<Vec<_>>();
    json!({ "columns": columns })
}

fn column_json(group: &Group<'_>, spec: &TableSpec<'_>, column: usize) -> Value {
    let column_spec = match spec.column(column) {
        Ok(column_spec) => column_spec,
        Err(err) => return json!({ "index": column, "error": error_json(&err)["error"] }),
    };
    let mut map = Map::new();
    map.insert("index".to_string(), json!(column));
    map.insert("name".to_string(), json!(column_spec.name));
    map.insert("type".to_string(), json!(column_spec.column_type));
    map.insert("attributes".to_string(), json!(column_spec.attr));
    match column_spec.column_type {
        ColumnType::Link | ColumnType::LinkList => {
            let target = spec
                .link_target_table_index(column)
                .and_then(|target| group.table_name(target));
            map.insert("link_target".to_string(), or_error(target.map(|name| json!(name))));
        }
        ColumnType::BackLink => {
            let origin = backlink_label(group, spec, column);
            map.insert("backlink_origin".to_string(), or_error(origin.map(|origin| json!(origin))));
        }
        ColumnType::Table => {
            let nested = spec.subspec(column).map(|nested| schema_json(group, &nested));
            map.insert("subtable".to_string(), or_error(nested));
        }
        _ => {}
    }
    Value::Object(map)
}

/// Up to `limit` rows, plus the full row count.
pub(crate) fn rows_json(group: &Group<'_>, table: &Table<'_>, limit: usize) -> Value {
    let rows = match table.row_count() {
        Ok(rows) => rows,
        Err(err) => return error_json(&err),
    };
    let labels = (0..table.column_count())
        .map(|column| column_label(group, table.spec(), column))
        .collect::<Vec<_>>();

    let records = (0..rows.min(limit))
        .map(|row| {
            let mut record = Map::new();
            for (column, label) in labels.iter().enumerate() {
                let cell = cell_json(group, table, column, row, limit);
                record.insert(label.clone(), or_error(cell));
            }
            Value::Object(record)
        })
        .collect::<Vec<_>>();
    json!({ "rows": rows, "records": records })
}

fn cell_json(
    group: &Group<'_>,
    table: &Table<'_>,
    column: usize,
    row: usize,
    limit: usize,
) -> Result<Value, Error> {
    if table.spec().column_type(column)? == ColumnType::Table {
        return Ok(match table.get_subtable(column, row)? {
            Some(subtable) => rows_json(group, &subtable, limit),
            None => json!({ "rows": 0, "records": [] }),
        });
    }
    let value = match table.get_value(column, row)? {
        Cell::Null => Value::Null,
        Cell::Int(value) => json!(value),
        Cell::Bool(value) => json!(value),
        Cell::OldDateTime(seconds) => json!(rfc3339(Timestamp::new(seconds, 0))?),
        Cell::Float(value) => json!(value),
        Cell::Double(value) => json!(value),
        Cell::String(value) => json!(value),
        Cell::Binary(bytes) => json!(hex(bytes)),
        Cell::Timestamp(stamp) => json!(rfc3339(stamp)?),
        Cell::Link(target) => json!(target),
        Cell::LinkList(targets) => json!(targets),
        Cell::BackLinks(origins) => json!(origins),
        Cell::Subtable(rows) => json!({ "rows": rows }),
    };
    Ok(value)
}

/// Sets `name` on a table entry; a name that fails to decode leaves `name` null
/// and reports the failure under `name_error`.
pub(crate) fn insert_table_name(entry: &mut Value, group: &Group<'_>, index: usize) {
    match group.table_name(index) {
        Ok(name) => entry["name"] = json!(name),
        Err(err) => {
            let mut body = error_json(&err);
            entry["name"] = Value::Null;
            entry["name_error"] = body["error"].take();
        }
    }
}

fn column_label(group: &Group<'_>, spec: &TableSpec<'_>, column: usize) -> String {
    if let Ok(Some(name)) = spec.column_name(column) {
        return name.to_string();
    }
    match spec.column_type(column) {
        Ok(ColumnType::BackLink) => {
            backlink_label(group, spec, column).unwrap_or_else(|_| format!("<- column {column}"))
        }
        _ => format!("column {column}"),
    }
}

fn backlink_label(group: &Group<'_>, spec: &TableSpec<'_>, column: usize) -> Result<String, Error> {
    let target = spec.link_target_table_index(column)?;
    let origin = spec.backlink_origin_column_index(column)?;
    let origin_table = group.table(target)?;
    let origin_name = origin_table.spec().column_name(origin)?.unwrap_or("?");
    Ok(format!("<- {}.{origin_name}", group.table_name(target)?))
}

fn rfc3339(stamp: Timestamp) -> Result<String, Error> {
    stamp.to_offset_date_time()?.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Range)
            .with_message("timestamp cannot be rendered as RFC 3339")
            .with_source(err)
    })
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn or_error(result: Result<Value, Error>) -> Value {
    result.unwrap_or_else(|err| error_json(&err))
}
