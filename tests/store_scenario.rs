// End-to-end store and query scenarios over memory and file media.
use std::collections::BTreeMap;

use basalt::api::{
    ColumnDef, Database, ErrorKind, FileMedium, JoinConfig, KeyRef, MemoryMedium, Row,
    SelectConfig, TableSchema, TypeTag, Value,
};

fn users_schema() -> TableSchema {
    TableSchema::new(
        "users",
        vec![
            ColumnDef::new("name", TypeTag::String).required(),
            ColumnDef::new("surname", TypeTag::String).required(),
            ColumnDef::new("accept", TypeTag::Boolean)
                .required()
                .with_default(true),
            ColumnDef::new("age", TypeTag::Number),
        ],
    )
}

fn products_schema() -> TableSchema {
    TableSchema::new(
        "products",
        vec![
            ColumnDef::new("name", TypeTag::String).required(),
            ColumnDef::new("price", TypeTag::Number).required(),
            ColumnDef::new("currency", TypeTag::String).required(),
            ColumnDef::new("user_id", TypeTag::String).required(),
        ],
    )
}

fn user(name: &str, surname: &str, accept: bool, age: i32) -> [(&'static str, Value); 4] {
    [
        ("name", Value::from(name)),
        ("surname", Value::from(surname)),
        ("accept", Value::from(accept)),
        ("age", Value::from(age)),
    ]
}

fn product(name: &str, price: i32, user_id: &str) -> [(&'static str, Value); 4] {
    [
        ("name", Value::from(name)),
        ("price", Value::from(price)),
        ("currency", Value::from("PLN")),
        ("user_id", Value::from(user_id)),
    ]
}

#[test]
fn users_products_scenario() {
    let mut medium = MemoryMedium::new();
    let mut db = Database::create(&mut medium, "test").expect("create db");
    db.create_table(users_schema()).expect("users");
    db.create_table(products_schema()).expect("products");

    let dima_rejected = db.insert("users", user("Dima", "Medynskyi", false, 28)).expect("insert");
    let dima = db.insert("users", user("Dima", "Medynskyi", true, 28)).expect("insert");
    let maks = db.insert("users", user("Maks", "Medynskyi", true, 22)).expect("insert");
    let maryna = db.insert("users", user("Maryna", "Medynska", true, 30)).expect("insert");

    let renamed = db
        .update("users", [("name", Value::from("Maksim"))], |row: &Row| {
            row.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase() == "maks")
        })
        .expect("update");
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].id(), maks.id());

    db.insert("products", product("Product1", 100, dima.id())).expect("p1");
    db.insert("products", product("Product2", 120, maks.id())).expect("p2");
    db.insert("products", product("Product3", 150, "test")).expect("p3");

    let rows = db
        .select(SelectConfig::all("users"))
        .expect("select")
        .where_rows(|row| {
            row.value("surname")
                .and_then(Value::as_str)
                .is_some_and(|surname| surname.to_lowercase().starts_with('m'))
        })
        .left_join(
            JoinConfig::new("products", "_id", "user_id")
                .key(KeyRef::new("name").with_alias("product_name"))
                .key("price")
                .key("currency"),
        )
        .expect("join")
        .filter([
            "_id",
            "name",
            "surname",
            "product_name",
            "price",
            "currency",
            "accept",
        ])
        .order_by("accept", false)
        .expect("order")
        .exec();

    let ids: Vec<&str> = rows
        .iter()
        .map(|row| row["_id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec![dima.id(), maks.id(), maryna.id(), dima_rejected.id()]);

    assert_eq!(rows[0]["product_name"], Value::from("Product1"));
    assert_eq!(rows[0]["price"], Value::from(100));
    assert_eq!(rows[1]["name"], Value::from("Maksim"));
    assert_eq!(rows[1]["product_name"], Value::from("Product2"));
    assert_eq!(rows[1]["currency"], Value::from("PLN"));
    for row in &rows[2..] {
        assert!(!row.contains_key("product_name"));
        assert!(!row.contains_key("price"));
    }
    assert_eq!(rows[3]["accept"], Value::Bool(false));
    assert!(rows.iter().all(|row| !row.contains_key("age")));
}

#[test]
fn select_star_matches_schema_plus_id() {
    let mut db = Database::create(MemoryMedium::new(), "shape").expect("create db");
    db.create_table(users_schema()).expect("users");
    db.insert(
        "users",
        [
            ("name", Value::from("Ada")),
            ("surname", Value::from("L")),
            ("age", Value::from(36)),
        ],
    )
    .expect("insert");

    let rows = db.select(SelectConfig::all("users")).expect("select").exec();
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "accept", "age", "name", "surname"]);
    assert_eq!(rows[0]["accept"], Value::Bool(true));
}

#[test]
fn query_snapshot_is_point_in_time() {
    let mut db = Database::create(MemoryMedium::new(), "pit").expect("create db");
    db.create_table(users_schema()).expect("users");
    db.insert("users", user("A", "B", true, 1)).expect("insert");

    let query = db.select(SelectConfig::all("users")).expect("select");
    db.insert("users", user("C", "D", true, 2)).expect("insert");

    assert_eq!(query.count(), 1);
    assert_eq!(db.select(SelectConfig::all("users")).expect("select").count(), 2);
}

#[test]
fn aggregates_follow_current_result() {
    let mut db = Database::create(MemoryMedium::new(), "agg").expect("create db");
    db.create_table(users_schema()).expect("users");
    for (name, age) in [("a", 20), ("b", 30), ("c", 40)] {
        db.insert("users", user(name, "s", true, age)).expect("insert");
    }

    let query = db
        .select(SelectConfig::all("users"))
        .expect("select")
        .where_rows(|row| row.value("name") != Some(&Value::from("c")));
    assert_eq!(query.count(), 2);
    assert_eq!(query.avg("age").expect("avg"), Some(25.0));
    assert_eq!(query.min("age").expect("min"), Some(20.0));
    assert_eq!(query.max("age").expect("max"), Some(30.0));
    assert_eq!(query.avg("surname").expect("avg"), None);

    let err = query.avg("weight").expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::OrderByKeyNotFound);
}

#[test]
fn remove_partition_is_exact() {
    let mut db = Database::create(MemoryMedium::new(), "rm").expect("create db");
    db.create_table(users_schema()).expect("users");
    let mut original = Vec::new();
    for age in 0..10 {
        original.push(db.insert("users", user("n", "s", age % 2 == 0, age)).expect("insert"));
    }

    let even = |row: &Row| row.get("accept") == Some(&Value::Bool(true));
    let removed = db.remove("users", Some(&even)).expect("remove");
    let kept = db.rows("users").expect("rows");

    assert_eq!(removed.len() + kept.len(), original.len());
    assert!(removed.iter().all(even));
    assert!(kept.iter().all(|row| !even(row)));
    let mut all: Vec<Row> = removed.into_iter().chain(kept).collect();
    all.sort_by_key(|row| row.get("age").and_then(Value::as_f64).unwrap_or(-1.0) as i64);
    assert_eq!(all, original);
}

#[test]
fn file_medium_persists_across_reopen() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join("store");

    let inserted = {
        let mut db = Database::create(FileMedium::new(&dir), "durable").expect("create db");
        db.create_table(users_schema()).expect("users");
        db.insert("users", user("Ada", "L", true, 36)).expect("insert")
    };

    let err = Database::create(FileMedium::new(&dir), "durable").err().expect("err");
    assert_eq!(err.kind(), ErrorKind::InstanceAlreadyExists);

    let db = Database::open(FileMedium::new(&dir), "durable").expect("open");
    assert_eq!(db.tables().expect("tables"), vec![users_schema()]);
    assert_eq!(db.rows("users").expect("rows"), vec![inserted]);

    let mut medium = db.into_medium();
    Database::delete(&mut medium, "durable").expect("delete");
    let err = Database::open(medium, "durable").err().expect("err");
    assert_eq!(err.kind(), ErrorKind::InstanceNotFound);
}

#[test]
fn exec_rows_are_independent_copies() {
    let mut db = Database::create(MemoryMedium::new(), "copy").expect("create db");
    db.create_table(users_schema()).expect("users");
    db.insert("users", user("Ada", "L", true, 36)).expect("insert");

    let query = db.select(SelectConfig::all("users")).expect("select");
    let mut first: Vec<BTreeMap<String, Value>> = query.exec();
    first[0].insert("name".to_string(), Value::from("Eve"));
    assert_eq!(query.exec()[0]["name"], Value::from("Ada"));
    assert_eq!(db.rows("users").expect("rows")[0].get("name"), Some(&Value::from("Ada")));
}
