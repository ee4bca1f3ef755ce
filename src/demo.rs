//! Purpose: Seed and query the users/products demo database.
//! Exports: `run_demo`.
//! Role: End-to-end walkthrough used by `basalt demo`.
//! Invariants: Any existing database with the same name is replaced.
use std::collections::BTreeMap;

use basalt::api::{
    ColumnDef, Database, Error, JoinConfig, KeyRef, Medium, Row, SelectConfig, TableSchema,
    TypeTag, Value,
};

pub(crate) fn run_demo<M: Medium>(
    mut medium: M,
    name: &str,
) -> Result<Vec<BTreeMap<String, Value>>, Error> {
    Database::<M>::delete(&mut medium, name)?;
    let mut db = Database::create(medium, name)?;

    db.create_table(TableSchema::new(
        "users",
        vec![
            ColumnDef::new("name", TypeTag::String).required(),
            ColumnDef::new("surname", TypeTag::String).required(),
            ColumnDef::new("accept", TypeTag::Boolean)
                .required()
                .with_default(true),
            ColumnDef::new("age", TypeTag::Number),
        ],
    ))?;
    db.create_table(TableSchema::new(
        "products",
        vec![
            ColumnDef::new("name", TypeTag::String).required(),
            ColumnDef::new("price", TypeTag::Number).required(),
            ColumnDef::new("currency", TypeTag::String).required(),
            ColumnDef::new("user_id", TypeTag::String).required(),
        ],
    ))?;

    let user = |name: &str, surname: &str, accept: bool, age: i32| {
        [
            ("name", Value::from(name)),
            ("surname", Value::from(surname)),
            ("accept", Value::from(accept)),
            ("age", Value::from(age)),
        ]
    };
    db.insert("users", user("Dima", "Medynskyi", false, 28))?;
    let dima = db.insert("users", user("Dima", "Medynskyi", true, 28))?;
    db.insert("users", user("Maks", "Medynskyi", true, 22))?;
    db.insert("users", user("Maryna", "Medynska", true, 30))?;

    let renamed = db.update("users", [("name", Value::from("Maksim"))], |row: &Row| {
        row.get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.to_lowercase() == "maks")
    })?;
    let maksim_id = renamed
        .first()
        .map(|row| row.id().to_string())
        .unwrap_or_default();

    let product = |name: &str, price: i32, user_id: &str| {
        [
            ("name", Value::from(name)),
            ("price", Value::from(price)),
            ("currency", Value::from("PLN")),
            ("user_id", Value::from(user_id)),
        ]
    };
    db.insert("products", product("Product1", 100, dima.id()))?;
    db.insert("products", product("Product2", 120, &maksim_id))?;
    db.insert("products", product("Product3", 150, "test"))?;

    let rows = db
        .select(SelectConfig::all("users"))?
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
        )?
        .filter([
            "_id",
            "name",
            "surname",
            "product_name",
            "price",
            "currency",
            "accept",
        ])
        .order_by("accept", false)?
        .exec();
    tracing::info!(database = name, rows = rows.len(), "demo query complete");
    Ok(rows)
}
