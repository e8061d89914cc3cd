#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use stowage_core::{ColumnDef, Entity, EntityId, EntitySchema, FieldDescriptor, FieldType, TableSchema};
use uuid::Uuid;

pub const NAMESPACE: Uuid = Uuid::from_u128(0xdbe2dff9_122e_4718_924f_710073c33b53);

pub const WIDGET_SCHEMA: EntitySchema = EntitySchema {
    table: "widgets",
    id_field: "id",
    fields: &[
        FieldDescriptor::required("id", FieldType::Uuid),
        FieldDescriptor::required("foo", FieldType::Text),
        FieldDescriptor::required("num", FieldType::Integer),
        FieldDescriptor::required("is_odd", FieldType::Boolean),
        FieldDescriptor::optional("oddish", FieldType::Boolean),
        FieldDescriptor::required("created_at", FieldType::Timestamp),
        FieldDescriptor::optional("finished_at", FieldType::Timestamp),
    ],
};

pub const WIDGET_TABLE: TableSchema = TableSchema {
    name: "widgets",
    columns: &[
        ColumnDef::primary_key("id", FieldType::Uuid),
        ColumnDef::required("foo", FieldType::Text),
        ColumnDef::required("num", FieldType::Integer),
        ColumnDef::required("is_odd", FieldType::Boolean),
        ColumnDef::nullable("oddish", FieldType::Boolean),
        ColumnDef::required("created_at", FieldType::Timestamp),
        ColumnDef::nullable("finished_at", FieldType::Timestamp),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: Uuid,
    pub foo: String,
    pub num: i64,
    pub is_odd: bool,
    pub oddish: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Entity for Widget {
    fn schema() -> &'static EntitySchema {
        &WIDGET_SCHEMA
    }

    fn id(&self) -> EntityId {
        self.id
    }
}

/// Deterministic widget number `n`: odd widgets are `baz{n}` with
/// `oddish = Some(true)`, even ones `bar{n}` with no `oddish`, and each is
/// created one hour before the previous one.
pub fn widget(n: i64) -> Widget {
    let is_odd = n % 2 == 1;
    let base = Utc.with_ymd_and_hms(2023, 12, 15, 12, 0, 0).unwrap();
    Widget {
        id: Uuid::new_v5(&NAMESPACE, n.to_string().as_bytes()),
        foo: if is_odd {
            format!("baz{n}")
        } else {
            format!("bar{n}")
        },
        num: n,
        is_odd,
        oddish: is_odd.then_some(true),
        created_at: base - Duration::hours(n),
        finished_at: None,
    }
}

/// Widgets 0 through 5.
pub fn widgets() -> Vec<Widget> {
    (0..6).map(widget).collect()
}

/// Sorted by `num`, for comparing unordered query results.
pub fn by_num(mut items: Vec<Widget>) -> Vec<Widget> {
    items.sort_by_key(|item| item.num);
    items
}

/// Generates one `#[test]` per scenario and backend.
///
/// Each scenario is a generic function taking an `open` closure that starts
/// a fresh repository scope and a `clear` closure that wipes the backend
/// behind any live query.
#[macro_export]
macro_rules! backend_scenarios {
    ($($scenario:ident),* $(,)?) => {
        mod in_memory {
            use stowage_core::{MemoryDatabase, MemoryRepository};
            use $crate::common::Widget;

            $(
                #[test]
                fn $scenario() {
                    let db = MemoryDatabase::new();
                    super::$scenario(
                        || MemoryRepository::<Widget>::open(&db).unwrap(),
                        || db.clear(),
                    );
                }
            )*
        }

        mod file {
            use stowage_core::{FileDatabase, FileRepository};
            use $crate::common::Widget;

            $(
                #[test]
                fn $scenario() {
                    let dir = tempfile::tempdir().unwrap();
                    let db = FileDatabase::open(dir.path().join("widgets.json")).unwrap();
                    super::$scenario(
                        || FileRepository::<Widget>::open(&db).unwrap(),
                        || db.clear().unwrap(),
                    );
                }
            )*
        }

        mod sqlite {
            use stowage_core::{ensure_table, open_db_in_memory, SqliteRepository};
            use $crate::common::{Widget, WIDGET_TABLE};

            $(
                #[test]
                fn $scenario() {
                    let conn = open_db_in_memory().unwrap();
                    ensure_table(&conn, &WIDGET_TABLE).unwrap();
                    super::$scenario(
                        || SqliteRepository::<Widget>::open(&conn, &WIDGET_TABLE).unwrap(),
                        || {
                            conn.execute("DELETE FROM widgets", []).unwrap();
                        },
                    );
                }
            )*
        }
    };
}
