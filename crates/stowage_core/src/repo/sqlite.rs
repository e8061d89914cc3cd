//! SQLite-backed entity repository.
//!
//! # Responsibility
//! - Map entities onto one relational table described by `TableSchema`.
//! - Run each repository scope inside one SQLite transaction.
//! - Push filters, ordering and slicing into SQL.
//!
//! # Invariants
//! - A scope always has an open transaction; `commit`/`rollback` end it and
//!   immediately begin the next one.
//! - Dropping a scope rolls its open transaction back.
//! - One connection hosts at most one live scope, since SQLite transactions
//!   do not nest.
//!
//! # See also
//! - `repo::sqlite_compile` for the SQL translation.

use crate::db::{quote_identifier, TableSchema};
use crate::model::record::Record;
use crate::model::schema::{Entity, EntityId, EntitySchema, FieldType};
use crate::model::value::{parse_timestamp, FieldValue};
use crate::query::{Query, QueryExecutor, QuerySpec};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::sqlite_compile::{compile_count, compile_select, select_list, to_sql_value};
use crate::repo::EntityRepository;
use log::{debug, info, warn};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::marker::PhantomData;
use std::time::Instant;
use uuid::Uuid;

const BACKEND_NAME: &str = "Sqlite";

/// Query executor issuing one SQL statement per materialization.
#[derive(Debug, Clone, Copy)]
pub struct SqliteExecutor<'conn> {
    conn: &'conn Connection,
    table: &'static TableSchema,
}

impl<'conn> SqliteExecutor<'conn> {
    pub fn new(conn: &'conn Connection, table: &'static TableSchema) -> Self {
        Self { conn, table }
    }
}

impl<E: Entity> QueryExecutor<E> for SqliteExecutor<'_> {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn fetch(&self, spec: &QuerySpec) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let compiled = compile_select(self.table.name, spec);
        let mut stmt = self.conn.prepare(&compiled.sql)?;
        let mut rows = stmt.query(params_from_iter(compiled.params.iter()))?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(decode_row(spec.schema, row)?.to_entity()?);
        }

        debug!(
            "event=sql_fetch module=repo status=ok table={} rows={} duration_ms={} sql={}",
            self.table.name,
            entities.len(),
            started_at.elapsed().as_millis(),
            compiled.sql
        );
        Ok(entities)
    }

    fn count(&self, spec: &QuerySpec) -> RepoResult<usize> {
        let compiled = compile_count(self.table.name, spec);
        let count: i64 = self.conn.query_row(
            &compiled.sql,
            params_from_iter(compiled.params.iter()),
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Repository scope bound to one SQLite transaction.
pub struct SqliteRepository<'conn, E: Entity> {
    conn: &'conn Connection,
    table: &'static TableSchema,
    tx: Option<Transaction<'conn>>,
    pending: usize,
    _entity: PhantomData<fn() -> E>,
}

impl<'conn, E: Entity> SqliteRepository<'conn, E> {
    /// Opens a scope on `conn` for entities stored in `table`.
    ///
    /// # Errors
    /// - `InvalidSchema` when `table` cannot hold `E` (see
    ///   [`check_mapping`]).
    /// - `Db` when the transaction cannot begin, e.g. another scope is
    ///   already live on `conn`.
    pub fn open(conn: &'conn Connection, table: &'static TableSchema) -> RepoResult<Self> {
        check_mapping(E::schema(), table)?;
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Deferred)?;
        debug!(
            "event=repo_scope_open module=repo status=ok backend={} table={}",
            BACKEND_NAME, table.name
        );
        Ok(Self {
            conn,
            table,
            tx: Some(tx),
            pending: 0,
            _entity: PhantomData,
        })
    }

    fn exists(&self, id: EntityId) -> RepoResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            quote_identifier(self.table.name),
            quote_identifier(E::schema().id_field)
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.exists([id_value(id)])?)
    }

    /// Runs `UPDATE ... SET <changes> WHERE id = ?`, returning rows changed.
    fn update_columns(&self, id: EntityId, changes: &[(&'static str, FieldValue)]) -> RepoResult<usize> {
        let assignments = changes
            .iter()
            .enumerate()
            .map(|(index, (name, _))| format!("{} = ?{}", quote_identifier(name), index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_identifier(self.table.name),
            assignments,
            quote_identifier(E::schema().id_field),
            changes.len() + 1
        );

        let mut params = changes
            .iter()
            .map(|(_, value)| to_sql_value(value))
            .collect::<Vec<_>>();
        params.push(id_value(id));
        Ok(self.conn.execute(&sql, params_from_iter(params))?)
    }

    /// Ends the current transaction and begins the next one.
    fn finish(&mut self, commit: bool) -> RepoResult<()> {
        let outcome = match self.tx.take() {
            Some(tx) if commit => tx.commit(),
            Some(tx) => tx.rollback(),
            None => Ok(()),
        };
        self.pending = 0;
        self.tx = Some(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Deferred,
        )?);
        Ok(outcome?)
    }

    fn log_scope_event(&self, event: &str, status: &str, writes: usize) {
        info!(
            "event={} module=repo status={} backend={} table={} writes={}",
            event, status, BACKEND_NAME, self.table.name, writes
        );
    }
}

impl<'conn, E: Entity> EntityRepository<E> for SqliteRepository<'conn, E> {
    type Executor = SqliteExecutor<'conn>;

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn insert(&mut self, entity: &E) -> RepoResult<()> {
        let id = entity.id();
        if self.exists(id)? {
            return Err(RepoError::AlreadyExists(id));
        }

        let schema = E::schema();
        let record = Record::from_entity(entity)?;
        let placeholders = (1..=schema.fields.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(self.table.name),
            select_list(schema),
            placeholders
        );
        let params = schema
            .fields
            .iter()
            .map(|field| to_sql_value(record.get(field.name)));
        self.conn.execute(&sql, params_from_iter(params))?;
        self.pending += 1;
        Ok(())
    }

    fn get(&self, id: EntityId) -> RepoResult<E> {
        let schema = E::schema();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            select_list(schema),
            quote_identifier(self.table.name),
            quote_identifier(schema.id_field)
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let record = stmt
            .query_row([id_value(id)], |row| Ok(decode_row(schema, row)))
            .optional()?
            .ok_or_else(|| RepoError::not_found(id))??;
        record.to_entity()
    }

    fn update(&mut self, entity: &E) -> RepoResult<()> {
        let id = entity.id();
        let schema = E::schema();
        let record = Record::from_entity(entity)?;
        let changes = schema
            .fields
            .iter()
            .filter(|field| field.name != schema.id_field)
            .map(|field| (field.name, record.get(field.name).clone()))
            .collect::<Vec<_>>();

        let changed = if changes.is_empty() {
            usize::from(self.exists(id)?)
        } else {
            self.update_columns(id, &changes)?
        };
        if changed == 0 {
            return Err(RepoError::not_found(id));
        }
        self.pending += 1;
        Ok(())
    }

    fn update_attrs(&mut self, id: EntityId, changes: &[(&str, FieldValue)]) -> RepoResult<()> {
        let changes = E::schema().validate_changes(changes)?;
        let changed = if changes.is_empty() {
            usize::from(self.exists(id)?)
        } else {
            self.update_columns(id, &changes)?
        };
        if changed == 0 {
            return Err(RepoError::not_found(id));
        }
        self.pending += 1;
        Ok(())
    }

    fn delete(&mut self, id: EntityId) -> RepoResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_identifier(self.table.name),
            quote_identifier(E::schema().id_field)
        );
        self.conn.execute(&sql, [id_value(id)])?;
        self.pending += 1;
        Ok(())
    }

    fn commit(&mut self) -> RepoResult<()> {
        let writes = self.pending;
        match self.finish(true) {
            Ok(()) => {
                self.log_scope_event("repo_commit", "ok", writes);
                Ok(())
            }
            Err(err) => {
                self.log_scope_event("repo_commit", "error", writes);
                Err(err)
            }
        }
    }

    fn rollback(&mut self) -> RepoResult<()> {
        let writes = self.pending;
        self.finish(false)?;
        self.log_scope_event("repo_rollback", "ok", writes);
        Ok(())
    }

    fn pending_len(&self) -> usize {
        self.pending
    }

    fn objects(&self) -> Query<E, Self::Executor> {
        Query::new(SqliteExecutor::new(self.conn, self.table))
    }
}

impl<E: Entity> Drop for SqliteRepository<'_, E> {
    fn drop(&mut self) {
        if self.pending > 0 {
            self.log_scope_event("repo_scope_exit", "rolled_back", self.pending);
        }
        if let Some(tx) = self.tx.take() {
            if let Err(err) = tx.rollback() {
                warn!(
                    "event=repo_scope_exit module=repo status=error backend={} table={} error={}",
                    BACKEND_NAME, self.table.name, err
                );
            }
        }
    }
}

/// Checks that `table` can store every field of `schema`.
///
/// # Errors
/// - `InvalidSchema` when the table is malformed, its primary key is not
///   the identity field, a field has no column of the same type, a
///   nullable field maps onto a `NOT NULL` column, or an extra column is
///   `NOT NULL` (inserts could never fill it).
pub fn check_mapping(schema: &EntitySchema, table: &TableSchema) -> RepoResult<()> {
    table
        .validate()
        .map_err(|err| RepoError::InvalidSchema(err.to_string()))?;
    schema.id_descriptor()?;

    let mismatch = |reason: String| -> RepoResult<()> {
        Err(RepoError::InvalidSchema(format!(
            "`{}` cannot store `{}` entities: {}",
            table.name, schema.table, reason
        )))
    };

    match table.primary_key() {
        Some(key) if key.name == schema.id_field => {}
        Some(key) => {
            return mismatch(format!(
                "primary key `{}` is not the identity field `{}`",
                key.name, schema.id_field
            ))
        }
        None => return mismatch("missing primary key".to_string()),
    }

    for field in schema.fields {
        let Some(column) = table.column(field.name) else {
            return mismatch(format!("no column for field `{}`", field.name));
        };
        if column.column_type != field.field_type {
            return mismatch(format!(
                "column `{}` is {} but the field is {}",
                column.name, column.column_type, field.field_type
            ));
        }
        if field.nullable && !column.nullable {
            return mismatch(format!("nullable field `{}` maps to a NOT NULL column", field.name));
        }
    }

    if let Some(extra) = table
        .columns
        .iter()
        .find(|column| schema.field(column.name).is_none() && !column.nullable)
    {
        return mismatch(format!("unmapped column `{}` is NOT NULL", extra.name));
    }
    Ok(())
}

fn id_value(id: EntityId) -> Value {
    to_sql_value(&FieldValue::Uuid(id))
}

/// Decodes one row selected with `select_list(schema)`.
fn decode_row(schema: &EntitySchema, row: &Row<'_>) -> RepoResult<Record> {
    let mut values = Vec::with_capacity(schema.fields.len());
    for (index, field) in schema.fields.iter().enumerate() {
        let raw = row.get_ref(index)?;
        let value = decode_value(field.field_type, raw).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "`{}.{}` holds a {} value, expected {}",
                schema.table,
                field.name,
                raw.data_type(),
                field.field_type
            ))
        })?;
        if value.is_null() && !field.nullable {
            return Err(RepoError::InvalidData(format!(
                "`{}.{}` is null but not nullable",
                schema.table, field.name
            )));
        }
        values.push((field.name, value));
    }
    Ok(Record::from_values(values))
}

fn decode_value(field_type: FieldType, raw: ValueRef<'_>) -> Option<FieldValue> {
    match (field_type, raw) {
        (_, ValueRef::Null) => Some(FieldValue::Null),
        (FieldType::Integer, ValueRef::Integer(number)) => Some(FieldValue::Integer(number)),
        (FieldType::Boolean, ValueRef::Integer(0)) => Some(FieldValue::Boolean(false)),
        (FieldType::Boolean, ValueRef::Integer(1)) => Some(FieldValue::Boolean(true)),
        (FieldType::Text, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .map(|text| FieldValue::Text(text.to_string())),
        (FieldType::Uuid, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| Uuid::parse_str(text).ok())
            .map(FieldValue::Uuid),
        (FieldType::Timestamp, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
            .ok()
            .and_then(parse_timestamp)
            .map(FieldValue::Timestamp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{check_mapping, SqliteRepository};
    use crate::db::{ensure_table, open_db, open_db_in_memory, ColumnDef, TableSchema};
    use crate::model::schema::{Entity, EntityId, EntitySchema, FieldDescriptor, FieldType};
    use crate::repo::error::RepoError;
    use crate::repo::EntityRepository;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    const SCHEMA: EntitySchema = EntitySchema {
        table: "tasks",
        id_field: "id",
        fields: &[
            FieldDescriptor::required("id", FieldType::Uuid),
            FieldDescriptor::required("title", FieldType::Text),
            FieldDescriptor::required("done", FieldType::Boolean),
        ],
    };

    const TABLE: TableSchema = TableSchema {
        name: "tasks",
        columns: &[
            ColumnDef::primary_key("id", FieldType::Uuid),
            ColumnDef::required("title", FieldType::Text),
            ColumnDef::required("done", FieldType::Boolean),
            ColumnDef::nullable("notes", FieldType::Text),
        ],
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: Uuid,
        title: String,
        done: bool,
    }

    impl Entity for Task {
        fn schema() -> &'static EntitySchema {
            &SCHEMA
        }

        fn id(&self) -> EntityId {
            self.id
        }
    }

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            done: false,
        }
    }

    #[test]
    fn mapping_accepts_extra_nullable_columns() {
        check_mapping(&SCHEMA, &TABLE).unwrap();
    }

    #[test]
    fn mapping_rejects_type_and_key_mismatches() {
        const WRONG_TYPE: TableSchema = TableSchema {
            name: "tasks",
            columns: &[
                ColumnDef::primary_key("id", FieldType::Uuid),
                ColumnDef::required("title", FieldType::Text),
                ColumnDef::required("done", FieldType::Text),
            ],
        };
        const WRONG_KEY: TableSchema = TableSchema {
            name: "tasks",
            columns: &[
                ColumnDef::required("id", FieldType::Uuid),
                ColumnDef::primary_key("title", FieldType::Text),
                ColumnDef::required("done", FieldType::Boolean),
            ],
        };
        const MISSING_COLUMN: TableSchema = TableSchema {
            name: "tasks",
            columns: &[
                ColumnDef::primary_key("id", FieldType::Uuid),
                ColumnDef::required("title", FieldType::Text),
            ],
        };

        for table in [&WRONG_TYPE, &WRONG_KEY, &MISSING_COLUMN] {
            assert!(matches!(
                check_mapping(&SCHEMA, table),
                Err(RepoError::InvalidSchema(_))
            ));
        }
    }

    #[test]
    fn booleans_are_stored_as_integers() {
        let conn = open_db_in_memory().unwrap();
        ensure_table(&conn, &TABLE).unwrap();
        let mut item = task("store");
        item.done = true;

        let mut repo = SqliteRepository::<Task>::open(&conn, &TABLE).unwrap();
        repo.insert(&item).unwrap();
        repo.commit().unwrap();

        let stored: (String, i64) = conn
            .query_row("SELECT id, done FROM tasks", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(stored, (item.id.to_string(), 1));
    }

    #[test]
    fn scope_sees_own_writes_and_rollback_discards_them() {
        let conn = open_db_in_memory().unwrap();
        ensure_table(&conn, &TABLE).unwrap();
        let item = task("draft");

        let mut repo = SqliteRepository::<Task>::open(&conn, &TABLE).unwrap();
        repo.insert(&item).unwrap();
        assert_eq!(repo.get(item.id).unwrap(), item);
        assert_eq!(repo.pending_len(), 1);

        repo.rollback().unwrap();
        assert_eq!(repo.pending_len(), 0);
        assert!(matches!(repo.get(item.id), Err(RepoError::NotFound(_))));
    }

    #[test]
    fn other_connections_see_only_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.sqlite3");
        let writer_conn = open_db(&path).unwrap();
        ensure_table(&writer_conn, &TABLE).unwrap();
        let reader_conn = open_db(&path).unwrap();
        let item = task("shared");

        let mut writer = SqliteRepository::<Task>::open(&writer_conn, &TABLE).unwrap();
        writer.insert(&item).unwrap();
        {
            let reader = SqliteRepository::<Task>::open(&reader_conn, &TABLE).unwrap();
            assert!(matches!(reader.get(item.id), Err(RepoError::NotFound(_))));
        }

        writer.commit().unwrap();
        let reader = SqliteRepository::<Task>::open(&reader_conn, &TABLE).unwrap();
        assert_eq!(reader.get(item.id).unwrap(), item);
    }

    #[test]
    fn second_scope_on_one_connection_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        ensure_table(&conn, &TABLE).unwrap();
        let _first = SqliteRepository::<Task>::open(&conn, &TABLE).unwrap();
        assert!(matches!(
            SqliteRepository::<Task>::open(&conn, &TABLE),
            Err(RepoError::Db(_))
        ));
    }

    #[test]
    fn corrupt_rows_surface_invalid_data() {
        let conn = open_db_in_memory().unwrap();
        ensure_table(&conn, &TABLE).unwrap();
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO tasks (id, title, done) VALUES (?1, 'x', 7)",
            [id.to_string()],
        )
        .unwrap();

        let repo = SqliteRepository::<Task>::open(&conn, &TABLE).unwrap();
        assert!(matches!(repo.get(id), Err(RepoError::InvalidData(_))));
    }
}
