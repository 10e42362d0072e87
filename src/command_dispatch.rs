//! Purpose: Hold top-level CLI command dispatch for `realm-reader`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `--table` selects a single table by name; an unknown name is a usage error.

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Info { file } => {
            let realm = RealmFile::open(&file)?;
            let group = realm.group()?;
            emit_json(dump_json::info_json(&realm, &group)?);
            Ok(RunOutcome::ok())
        }
        Command::Schema { file, table } => {
            let realm = RealmFile::open(&file)?;
            let group = realm.group()?;
            let mut tables = Vec::new();
            for index in selected_tables(&group, table.as_deref())? {
                let mut entry = match group.table(index) {
                    Ok(table) => dump_json::schema_json(&group, table.spec()),
                    Err(err) => error_json(&err),
                };
                dump_json::insert_table_name(&mut entry, &group, index);
                tables.push(entry);
            }
            emit_json(json!({ "tables": tables }));
            Ok(RunOutcome::ok())
        }
        Command::Dump { file, table, limit } => {
            let realm = RealmFile::open(&file)?;
            let group = realm.group()?;
            let mut tables = Vec::new();
            for index in selected_tables(&group, table.as_deref())? {
                let mut entry = match group.table(index) {
                    Ok(table) => dump_json::rows_json(&group, &table, limit),
                    Err(err) => error_json(&err),
                };
                dump_json::insert_table_name(&mut entry, &group, index);
                tables.push(entry);
            }
            emit_json(json!({ "tables": tables }));
            Ok(RunOutcome::ok())
        }
    }
}

fn selected_tables(group: &Group<'_>, name: Option<&str>) -> Result<Vec<usize>, Error> {
    let Some(name) = name else {
        return Ok((0..group.table_count()).collect());
    };
    match group.table_index(name)? {
        Some(index) => Ok(vec![index]),
        None => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("no table named {name:?}"))
            .with_hint("List tables with `realm-reader info <FILE>`.")),
    }
}
