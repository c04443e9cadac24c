mod common;

use anyhow::Result;
use common::{create_temp_db, Note, TestTable};
use rust_sqlite_records::{
    Comparator, CreateMode, Database, Error, Record, RowCount, TableBuilder, Value,
};
use uuid::Uuid;

#[test]
fn insert_then_select_returns_the_record() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let record = TestTable::new(1, "test");

    db.query::<TestTable>()?.insert(&record)?;

    assert_eq!(db.query::<TestTable>()?.select()?, vec![record]);
    Ok(())
}

#[test]
fn count_matches_select_for_any_predicates() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;
    for (id, string) in [(1, "a"), (2, "a"), (3, "b")] {
        query.insert(&TestTable::new(id, string))?;
    }

    assert_eq!(query.count()?, 3);
    assert_eq!(query.count()?, query.select()?.len() as i64);

    query.where_eq("string", "a")?;
    assert_eq!(query.count()?, 2);
    assert_eq!(query.count()?, query.select()?.len() as i64);

    query.where_op("id", ">", 5)?;
    assert_eq!(query.count()?, 0);
    assert!(query.select()?.is_empty());
    Ok(())
}

#[test]
fn where_eq_combines_with_and() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let query = db.query::<TestTable>()?;
    for (id, string) in [(1, "a"), (2, "a"), (3, "b")] {
        query.insert(&TestTable::new(id, string))?;
    }

    let mut query = db.query::<TestTable>()?;
    let rows = query.where_eq("string", "a")?.where_eq("id", 2)?.select()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 2);
    assert_eq!(query.predicate_count(), 2);

    // predicates persist across terminal operations until cleared
    assert_eq!(query.count()?, 1);
    assert_eq!(query.clear().count()?, 3);
    Ok(())
}

#[test]
fn comparator_predicates() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;
    for id in 1..=5 {
        query.insert(&TestTable::new(id, &format!("player{id}")))?;
    }

    assert_eq!(query.where_cmp("id", Comparator::GreaterThanOrEqual, 4)?.count()?, 2);
    assert_eq!(query.clear().where_op("id", "<>", 1)?.count()?, 4);
    assert_eq!(query.clear().where_op("string", "LIKE", "player%")?.count()?, 5);

    let err = query.clear().where_op("string", " throw ", "test").unwrap_err();
    assert!(matches!(err, Error::Comparator(_)));
    assert_eq!(query.predicate_count(), 0);
    Ok(())
}

#[test]
fn like_patterns_work_on_non_text_columns() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;
    for id in [1, 2, 12, 21] {
        query.insert(&TestTable::new(id, "test"))?;
    }

    let mut ids: Vec<i64> = query.where_op("id", "like", "1%")?.select()?.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 12]);

    // non-text values still go through the column type
    assert_eq!(query.clear().where_cmp("id", Comparator::Like, 2)?.count()?, 1);
    Ok(())
}

#[test]
fn uuid_predicates_are_coerced_through_the_column() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let record = TestTable::new(1, "test");
    let mut query = db.query::<TestTable>()?;
    query.insert(&record)?;
    query.insert(&TestTable::new(2, "test"))?;

    let found = query.where_eq("uuid", record.uuid)?.select_unique()?;
    assert_eq!(found, record);

    // the canonical text form matches as well
    let found = query
        .clear()
        .where_eq("uuid_indirect", record.uuid_indirect.to_string())?
        .select_unique()?;
    assert_eq!(found, record);

    let err = query.clear().where_eq("uuid", "not a uuid").unwrap_err();
    assert!(matches!(err, Error::Marshal { ref column, .. } if column == "uuid"));
    Ok(())
}

#[test]
fn unknown_columns_are_rejected() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;

    let err = query.where_eq("nope", 1).unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "nope"));

    let err = query.update(&TestTable::new(1, "x"), &["string", "nope"]).unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }));
    Ok(())
}

#[test]
fn select_unique_requires_exactly_one_row() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;

    assert!(matches!(
        query.select_unique(),
        Err(Error::NotUnique { found: RowCount::None, .. })
    ));
    assert_eq!(query.select_unique_or_none()?, None);

    let first = TestTable::new(1, "same");
    query.insert(&first)?;
    assert_eq!(query.select_unique()?, first);
    assert_eq!(query.select_unique_or_none()?, Some(first.clone()));

    query.insert(&TestTable::new(2, "same"))?;
    assert!(matches!(
        query.where_eq("string", "same")?.select_unique(),
        Err(Error::NotUnique { found: RowCount::Many, .. })
    ));
    assert_eq!(query.select_unique_or_none()?, None);
    Ok(())
}

#[test]
fn update_changes_only_the_named_columns_of_matching_rows() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let one = TestTable::new(1, "test");
    let two = TestTable::new(2, "test");
    let mut query = db.query::<TestTable>()?;
    query.insert(&one)?;
    query.insert(&two)?;

    let replacement = TestTable::new(99, "changed");
    let changed = query.where_eq("id", 1)?.update(&replacement, &["string"])?;
    assert_eq!(changed, 1);

    let updated = query.select_unique()?;
    assert_eq!(updated.id, 1);
    assert_eq!(updated.string, "changed");
    assert_eq!(updated.uuid, one.uuid);
    assert_eq!(updated.uuid_indirect, one.uuid_indirect);

    let untouched = query.clear().where_eq("id", 2)?.select_unique()?;
    assert_eq!(untouched, two);
    Ok(())
}

#[test]
fn update_without_columns_writes_every_column() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;
    query.insert(&TestTable::new(1, "before"))?;

    let mut after = TestTable::new(1, "after");
    after.uuid = Uuid::new_v4();
    query.where_eq("id", 1)?.update(&after, &[])?;

    assert_eq!(query.select_unique()?, after);
    Ok(())
}

#[test]
fn delete_without_predicates_empties_the_table() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut query = db.query::<TestTable>()?;
    for id in 1..=3 {
        query.insert(&TestTable::new(id, "test"))?;
    }

    assert_eq!(query.where_eq("id", 2)?.delete()?, 1);
    assert_eq!(query.clear().count()?, 2);

    assert_eq!(query.delete()?, 2);
    assert_eq!(query.count()?, 0);
    Ok(())
}

#[test]
fn duplicate_primary_key_is_a_constraint_error() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let query = db.query::<TestTable>()?;
    query.insert(&TestTable::new(1, "first"))?;

    let err = query.insert(&TestTable::new(1, "second")).unwrap_err();
    assert!(err.is_constraint(), "unexpected error: {err}");
    assert_eq!(query.count()?, 1);
    Ok(())
}

#[test]
fn optional_columns_store_null() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let mut notes = db.query::<Note>()?;
    notes.insert(&Note {
        id: None,
        author: "alex".into(),
        body: None,
    })?;

    let stored = notes.where_eq("author", "alex")?.select_unique()?;
    assert_eq!(stored.id, Some(1));
    assert_eq!(stored.body, None);

    let raw = db.execute(
        "UPDATE notes SET body = ? WHERE body IS NULL",
        &[],
        &[Value::from("filled")],
    )?;
    assert_eq!(raw, 1);
    assert_eq!(notes.select_unique()?.body.as_deref(), Some("filled"));
    Ok(())
}

#[test]
fn templated_statements_substitute_then_bind() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    let query = db.query::<TestTable>()?;
    for id in 1..=4 {
        query.insert(&TestTable::new(id, "test"))?;
    }

    let rows: Vec<TestTable> = db.query_as(
        "SELECT * FROM {{table}} WHERE {{key}} > ? ORDER BY {{key}}",
        &[("table", "test1"), ("key", "id")],
        &[Value::from(2)],
    )?;
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 4]);

    let mut stmt = db.build_statement("SELECT * FROM test1 WHERE id = ?", &[], &[Value::from(1)])?;
    let rows: Vec<TestTable> = db.row_to_objects(stmt.raw_query())?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn row_to_objects_reports_unconvertible_values() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    db.execute(
        "INSERT INTO test1(id, string, uuid, uuid_indirect) VALUES(1, 'x', 'garbage', 'garbage')",
        &[],
        &[],
    )?;

    let err = db.query::<TestTable>()?.select().unwrap_err();
    assert!(matches!(err, Error::Marshal { ref column, .. } if column == "uuid"));
    Ok(())
}

#[derive(Debug, Default)]
struct Unregistered {
    id: i64,
}

impl Record for Unregistered {
    fn table() -> TableBuilder<Self> {
        TableBuilder::<Self>::new("unregistered").field("id", |r| &r.id, |r| &mut r.id)
    }
}

#[test]
fn queries_need_a_registered_record_type() -> Result<()> {
    let (db, _dir) = create_temp_db()?;
    assert!(matches!(db.query::<Unregistered>(), Err(Error::Schema { .. })));

    db.register::<Unregistered>()?;
    db.query::<Unregistered>()?.insert(&Unregistered { id: 5 })?;
    assert_eq!(db.query::<Unregistered>()?.select_unique()?.id, 5);
    Ok(())
}

#[test]
fn strict_create_mode_fails_on_existing_tables() -> Result<()> {
    let (db, dir) = create_temp_db()?;
    db.close()?;

    let strict = common::config_in(&dir).with_create_mode(CreateMode::Strict);
    let err = Database::builder(strict).table::<TestTable>().open().unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));

    // the tolerant default reopens the same file fine
    let db = common::open(common::config_in(&dir))?;
    assert_eq!(db.query::<TestTable>()?.count()?, 0);
    Ok(())
}

#[test]
fn data_survives_reopening() -> Result<()> {
    let (db, dir) = create_temp_db()?;
    let record = TestTable::new(1, "persisted");
    db.query::<TestTable>()?.insert(&record)?;
    db.close()?;

    let db = common::open(common::config_in(&dir))?;
    assert_eq!(db.query::<TestTable>()?.select()?, vec![record]);
    Ok(())
}
