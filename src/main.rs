//! Purpose: `basalt` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `api::to_exit_code`.
//! Invariants: Logs go to stderr via tracing so stdout stays machine-readable.
use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use serde_json::{Map, Value as Json, json};
use tracing_subscriber::EnvFilter;

use basalt::api::{
    ColumnDef, Database, Error, ErrorKind, FileMedium, TableSchema, Value, to_exit_code,
};
use basalt::store_paths::default_store_dir;

mod demo;

#[derive(Parser, Debug)]
#[command(
    name = "basalt",
    version,
    about = "Schema-validated tables over a file-backed key-value store",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Store directory (default: ~/.basalt/store)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand, about = "Create, delete, or probe databases")]
    Db(DbCommand),
    #[command(about = "List table schemas of a database")]
    Tables { name: String },
    #[command(about = "Print every row of a database (or one table) as JSON")]
    Dump {
        name: String,
        #[arg(long)]
        table: Option<String>,
    },
    #[command(about = "Seed the users/products demo database and print the sample query")]
    Demo {
        #[arg(long, default_value = "demo")]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    Create { name: String },
    Delete { name: String },
    Exists { name: String },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(output) => {
            println!("{output}");
            0
        }
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<Json, Error> {
    let medium = FileMedium::new(cli.dir.unwrap_or_else(default_store_dir));
    match cli.command {
        Command::Db(DbCommand::Create { name }) => {
            let db = Database::create(medium, &name)?;
            Ok(json!({ "created": name, "key": db.key() }))
        }
        Command::Db(DbCommand::Delete { name }) => {
            let mut medium = medium;
            if !Database::exists(&medium, &name)? {
                return Err(Error::new(ErrorKind::InstanceNotFound)
                    .with_message(format!("database \"{name}\" does not exist")));
            }
            Database::delete(&mut medium, &name)?;
            Ok(json!({ "deleted": name }))
        }
        Command::Db(DbCommand::Exists { name }) => {
            let exists = Database::exists(&medium, &name)?;
            Ok(json!({ "name": name, "exists": exists }))
        }
        Command::Tables { name } => {
            let db = Database::open(medium, &name)?;
            let tables = db.tables()?.iter().map(schema_json).collect::<Vec<_>>();
            Ok(json!({ "name": name, "tables": tables }))
        }
        Command::Dump { name, table } => {
            let db = Database::open(medium, &name)?;
            let schemas = match &table {
                Some(table) => vec![db.schema(table)?],
                None => db.tables()?,
            };
            let mut tables = Vec::with_capacity(schemas.len());
            for schema in schemas {
                let rows = db
                    .rows(&schema.name)?
                    .iter()
                    .map(|row| plain_json(&row.to_map()))
                    .collect::<Vec<_>>();
                tables.push(json!({ "name": schema.name, "rows": rows }));
            }
            Ok(json!({ "name": name, "tables": tables }))
        }
        Command::Demo { name } => {
            let rows = demo::run_demo(medium, &name)?;
            Ok(Json::Array(rows.iter().map(plain_json).collect()))
        }
    }
}

fn schema_json(schema: &TableSchema) -> Json {
    let columns = schema.columns.iter().map(column_json).collect::<Vec<_>>();
    json!({ "name": schema.name, "columns": columns })
}

fn column_json(column: &ColumnDef) -> Json {
    let mut out = Map::new();
    out.insert("name".to_string(), json!(column.name));
    out.insert("type".to_string(), json!(column.tag.as_str()));
    out.insert("required".to_string(), json!(column.required));
    if let Some(default) = &column.default {
        out.insert("default".to_string(), default.to_json());
    }
    if let Some(comment) = &column.comment {
        out.insert("comment".to_string(), json!(comment));
    }
    Json::Object(out)
}

fn plain_json(row: &BTreeMap<String, Value>) -> Json {
    Json::Object(
        row.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

fn error_json(err: &Error) -> Json {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().map(str::to_string).unwrap_or_else(|| err.to_string())),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    let mut outer = Map::new();
    outer.insert("error".to_string(), Json::Object(inner));
    Json::Object(outer)
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Io\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
