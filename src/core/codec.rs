//! Purpose: Encode and decode whole database snapshots to the medium's string form.
//! Exports: `encode`, `decode`, `encode_value`, `decode_value`, `save`, `load`, `FORMAT_VERSION`.
//! Role: Only bridge between in-memory values and the medium's text representation.
//! Invariants: Every stored value is written as `{"type": <tag>, "value": ...}` and
//! Invariants: restored from its tag, so NaN/Infinity/null/undefined survive round-trips.
//! Invariants: Callables are rejected at encode time; nothing is written on failure.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::error::{Error, ErrorKind};
use crate::core::medium::Medium;
use crate::core::schema::{ColumnDef, ID_FIELD, Row, Snapshot, Table, TableSchema};
use crate::core::value::{TypeTag, Value, format_number};

/// Document version written by `encode`. Older readers refuse anything newer.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDoc {
    format: u32,
    tables: Vec<TableDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableDoc {
    name: String,
    columns: Vec<ColumnDoc>,
    rows: Vec<BTreeMap<String, TaggedDoc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ColumnDoc {
    name: String,
    #[serde(rename = "type")]
    tag: String,
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<TaggedDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TaggedDoc {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

pub fn encode(snapshot: &Snapshot) -> Result<String, Error> {
    let tables = snapshot
        .tables
        .iter()
        .map(encode_table)
        .collect::<Result<Vec<_>, _>>()?;
    let doc = SnapshotDoc {
        format: FORMAT_VERSION,
        tables,
    };
    serde_json::to_string(&doc).map_err(|err| {
        Error::new(ErrorKind::Codec)
            .with_message("failed to serialize snapshot")
            .with_source(err)
    })
}

pub fn decode(input: &str) -> Result<Snapshot, Error> {
    let doc: SnapshotDoc = serde_json::from_str(input).map_err(|err| {
        Error::new(ErrorKind::Codec)
            .with_message("failed to parse snapshot")
            .with_source(err)
    })?;
    if doc.format != FORMAT_VERSION {
        return Err(Error::new(ErrorKind::Codec)
            .with_message(format!(
                "stored document has format {}, this build reads format {FORMAT_VERSION}",
                doc.format
            ))
            .with_hint("Open it with the basalt release that wrote it."));
    }
    let tables = doc
        .tables
        .into_iter()
        .map(decode_table)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Snapshot { tables })
}

/// Encodes the snapshot first, then hands the medium a single full overwrite.
pub fn save<M: Medium + ?Sized>(medium: &mut M, key: &str, snapshot: &Snapshot) -> Result<(), Error> {
    let encoded = encode(snapshot)?;
    tracing::debug!(key, bytes = encoded.len(), tables = snapshot.tables.len(), "save snapshot");
    medium.set(key, &encoded)
}

pub fn load<M: Medium + ?Sized>(medium: &M, key: &str) -> Result<Option<Snapshot>, Error> {
    match medium.get(key)? {
        Some(encoded) => {
            tracing::debug!(key, bytes = encoded.len(), "load snapshot");
            decode(&encoded).map(Some)
        }
        None => Ok(None),
    }
}

fn encode_table(table: &Table) -> Result<TableDoc, Error> {
    let columns = table
        .schema
        .columns
        .iter()
        .map(|column| {
            let default = column
                .default
                .as_ref()
                .map(encode_tagged)
                .transpose()
                .map_err(|err| err.with_table(&table.schema.name).with_column(&column.name))?;
            Ok(ColumnDoc {
                name: column.name.clone(),
                tag: column.tag.as_str().to_string(),
                required: column.required,
                default,
                comment: column.comment.clone(),
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut doc = BTreeMap::new();
        for (name, value) in row.fields() {
            let tagged = encode_tagged(value)
                .map_err(|err| err.with_table(&table.schema.name).with_column(name))?;
            doc.insert(name.clone(), tagged);
        }
        doc.insert(ID_FIELD.to_string(), encode_tagged(&Value::String(row.id().to_string()))?);
        rows.push(doc);
    }

    Ok(TableDoc {
        name: table.schema.name.clone(),
        columns,
        rows,
    })
}

fn decode_table(doc: TableDoc) -> Result<Table, Error> {
    let table_name = doc.name;
    let columns = doc
        .columns
        .into_iter()
        .map(|column| {
            let tag = column.tag.parse::<TypeTag>()?;
            let default = column.default.map(decode_tagged).transpose()?;
            Ok(ColumnDef {
                name: column.name,
                tag,
                required: column.required,
                default,
                comment: column.comment,
            })
        })
        .collect::<Result<Vec<_>, Error>>()
        .map_err(|err| err.with_table(&table_name))?;

    let mut rows = Vec::with_capacity(doc.rows.len());
    for mut fields in doc.rows {
        let id = match fields.remove(ID_FIELD).map(decode_tagged).transpose()? {
            Some(Value::String(id)) => id,
            _ => {
                return Err(Error::new(ErrorKind::Codec)
                    .with_message("row is missing a string \"_id\"")
                    .with_table(&table_name));
            }
        };
        let fields = fields
            .into_iter()
            .map(|(name, tagged)| decode_tagged(tagged).map(|value| (name, value)))
            .collect::<Result<BTreeMap<_, _>, Error>>()
            .map_err(|err| err.with_table(&table_name))?;
        rows.push(Row::new(id, fields));
    }

    Ok(Table {
        schema: TableSchema::new(table_name, columns),
        rows,
    })
}

/// Tagged JSON form of one value.
pub fn encode_value(value: &Value) -> Result<serde_json::Value, Error> {
    let tagged = encode_tagged(value)?;
    serde_json::to_value(tagged).map_err(|err| Error::new(ErrorKind::Codec).with_source(err))
}

pub fn decode_value(value: &serde_json::Value) -> Result<Value, Error> {
    let tagged: TaggedDoc = serde_json::from_value(value.clone()).map_err(|err| {
        Error::new(ErrorKind::Codec)
            .with_message("expected a tagged value")
            .with_source(err)
    })?;
    decode_tagged(tagged)
}

fn encode_tagged(value: &Value) -> Result<TaggedDoc, Error> {
    let tag = value.tag();
    let payload = match value {
        Value::Undefined => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(json!(b)),
        Value::Number(n) if n.is_finite() => Some(json!(n)),
        Value::Number(n) => Some(json!(format_number(*n))),
        Value::BigInt(n) => Some(json!(n.to_string())),
        Value::String(s) | Value::Symbol(s) => Some(json!(s)),
        Value::Function(callable) => {
            return Err(Error::new(ErrorKind::Codec)
                .with_message(format!("function \"{}\" cannot be persisted", callable.name())));
        }
        Value::Array(items) => {
            let items = items.iter().map(encode_tagged).collect::<Result<Vec<_>, _>>()?;
            Some(to_json(items)?)
        }
        Value::Object(map) => {
            let map = map
                .iter()
                .map(|(k, v)| encode_tagged(v).map(|tagged| (k.clone(), tagged)))
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Some(to_json(map)?)
        }
    };
    Ok(TaggedDoc {
        tag: tag.as_str().to_string(),
        value: payload,
    })
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|err| Error::new(ErrorKind::Codec).with_source(err))
}

fn decode_tagged(doc: TaggedDoc) -> Result<Value, Error> {
    let tag = doc.tag.parse::<TypeTag>()?;
    let payload = doc.value.unwrap_or(serde_json::Value::Null);
    let malformed = || {
        Error::new(ErrorKind::Codec).with_message(format!(
            "malformed \"{tag}\" value: {payload}"
        ))
    };

    let value = match tag {
        TypeTag::Undefined => Value::Undefined,
        TypeTag::Null => Value::Null,
        TypeTag::NaN => Value::Number(f64::NAN),
        TypeTag::Infinity => match payload.as_str() {
            Some("Infinity") => Value::Number(f64::INFINITY),
            Some("-Infinity") => Value::Number(f64::NEG_INFINITY),
            _ => return Err(malformed()),
        },
        TypeTag::Boolean => match &payload {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::String(s) if s == "true" => Value::Bool(true),
            serde_json::Value::String(s) if s == "false" => Value::Bool(false),
            _ => return Err(malformed()),
        },
        TypeTag::Number => match payload.as_f64() {
            Some(n) => Value::Number(n),
            None => return Err(malformed()),
        },
        TypeTag::BigInt => match payload.as_str().and_then(|s| s.parse::<i128>().ok()) {
            Some(n) => Value::BigInt(n),
            None => return Err(malformed()),
        },
        TypeTag::String => match payload.as_str() {
            Some(s) => Value::String(s.to_string()),
            None => return Err(malformed()),
        },
        TypeTag::Symbol => match payload.as_str() {
            Some(s) => Value::Symbol(s.to_string()),
            None => return Err(malformed()),
        },
        TypeTag::Function => {
            return Err(Error::new(ErrorKind::Codec)
                .with_message("stored snapshot contains a function value"));
        }
        TypeTag::Array => {
            let items: Vec<TaggedDoc> = serde_json::from_value(payload.clone()).map_err(|err| malformed().with_source(err))?;
            Value::Array(items.into_iter().map(decode_tagged).collect::<Result<_, _>>()?)
        }
        TypeTag::Object => {
            let map: BTreeMap<String, TaggedDoc> =
                serde_json::from_value(payload.clone()).map_err(|err| malformed().with_source(err))?;
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| decode_tagged(v).map(|value| (k, value)))
                    .collect::<Result<_, _>>()?,
            )
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{FORMAT_VERSION, decode, decode_value, encode, encode_value};
    use crate::core::error::ErrorKind;
    use crate::core::schema::{ColumnDef, Row, Snapshot, Table, TableSchema};
    use crate::core::value::{Callable, TypeTag, Value};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn sentinels_are_written_with_their_tag() {
        assert_eq!(
            encode_value(&Value::from(f64::NAN)).expect("nan"),
            json!({"type": "NaN", "value": "NaN"})
        );
        assert_eq!(
            encode_value(&Value::from(f64::NEG_INFINITY)).expect("inf"),
            json!({"type": "Infinity", "value": "-Infinity"})
        );
        assert_eq!(
            encode_value(&Value::Undefined).expect("undefined"),
            json!({"type": "undefined"})
        );
        assert_eq!(
            encode_value(&Value::Null).expect("null"),
            json!({"type": "null", "value": null})
        );
    }

    #[test]
    fn user_strings_that_look_like_sentinels_stay_strings() {
        for text in ["NaN", "Infinity", "-Infinity", "null", "undefined", "true"] {
            let encoded = encode_value(&Value::from(text)).expect("encode");
            let decoded = decode_value(&encoded).expect("decode");
            assert_eq!(decoded, Value::from(text));
            assert_eq!(decoded.tag(), TypeTag::String);
        }
    }

    #[test]
    fn boolean_accepts_string_payloads() {
        let decoded = decode_value(&json!({"type": "boolean", "value": "false"})).expect("decode");
        assert_eq!(decoded, Value::Bool(false));
        let err = decode_value(&json!({"type": "boolean", "value": "nope"})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn unknown_tag_is_unknown_type() {
        let err = decode_value(&json!({"type": "integer", "value": 1})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::UnknownType);
    }

    #[test]
    fn callables_are_rejected_even_when_nested() {
        let f = Value::Function(Callable::new("cb", |_| Value::Null));
        let err = encode_value(&Value::Array(vec![Value::from(1), f])).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn snapshot_round_trip_keeps_schema_and_rows() {
        let schema = TableSchema::new(
            "metrics",
            vec![
                ColumnDef::new("label", TypeTag::String).required(),
                ColumnDef::new("ok", TypeTag::Boolean).with_default(true).with_comment("health"),
                ColumnDef::new("ratio", TypeTag::NaN),
                ColumnDef::new("big", TypeTag::BigInt),
            ],
        );
        let mut fields = BTreeMap::new();
        fields.insert("label".to_string(), Value::from("a"));
        fields.insert("ok".to_string(), Value::from(false));
        fields.insert("ratio".to_string(), Value::from(f64::NAN));
        fields.insert("big".to_string(), Value::from(170141183460469231731687303715884105727_i128));
        let snapshot = Snapshot {
            tables: vec![Table {
                schema,
                rows: vec![Row::new("id-1".to_string(), fields)],
            }],
        };

        let decoded = decode(&encode(&snapshot).expect("encode")).expect("decode");
        let table = decoded.table("metrics").expect("table");
        assert_eq!(table.schema, snapshot.tables[0].schema);
        let row = &table.rows[0];
        assert_eq!(row.id(), "id-1");
        assert_eq!(row.get("label"), Some(&Value::from("a")));
        assert_eq!(row.get("ok"), Some(&Value::Bool(false)));
        assert_eq!(row.get("ratio").map(Value::tag), Some(TypeTag::NaN));
        assert_eq!(
            row.get("big"),
            Some(&Value::BigInt(170141183460469231731687303715884105727))
        );
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let empty = encode(&Snapshot::default()).expect("encode");
        assert!(empty.contains(&format!("\"format\":{FORMAT_VERSION}")));

        let err = decode(r#"{"format": 99, "tables": []}"#).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(err.message().is_some_and(|message| message.contains("99")));
        assert!(err.hint().is_some());
    }

    #[test]
    fn garbage_is_codec_error() {
        let err = decode("not json").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn row_without_id_is_rejected() {
        let input = r#"{"format":1,"tables":[{"name":"t","columns":[{"name":"a","type":"string","required":false}],"rows":[{"a":{"type":"string","value":"x"}}]}]}"#;
        let err = decode(input).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert_eq!(err.table(), Some("t"));
    }
}
