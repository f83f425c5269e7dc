use clap::{Parser, Subcommand, ValueEnum};
use litedoc::{ConnectionConfig, Context, Database, Literal, Op};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// litedoc CLI — inspect and edit a litedoc store from the command line
#[derive(Parser)]
#[command(name = "litedoc", version, about)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "LITEDOC_DB", default_value = "./knbn.sqlite")]
    db: PathBuf,

    /// YAML file overriding the connection profile
    #[arg(long, env = "LITEDOC_CONFIG")]
    config: Option<PathBuf>,

    /// Abort the operation after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List collections that have a table
    Collections,

    /// Get a single document by ID
    Get {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// List every document in a collection
    List {
        /// Collection name
        collection: String,
    },

    /// Filter a collection by a JSON path predicate
    Query {
        /// Collection name
        collection: String,
        /// JSON path, e.g. '$.Numbers[0].Type'
        key_path: String,
        /// One of = != < <= > >= (or eq ne lt le gt ge)
        #[arg(value_parser = parse_op)]
        op: Op,
        /// Value to compare against; parsed as JSON, otherwise taken as text
        value: String,
    },

    /// Insert a new document
    Create {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
        /// Document body as JSON
        json: String,
    },

    /// Replace an existing document
    Set {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
        /// Document body as JSON
        json: String,
    },

    /// Delete a document
    Delete {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// Load collections and documents from a directory tree
    Seed {
        /// Directory with one subdirectory per collection
        dir: PathBuf,
    },
}

fn parse_op(s: &str) -> Result<Op, String> {
    s.parse()
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => ConnectionConfig::load(path)?,
        None => ConnectionConfig::default(),
    };
    let db = Database::open_with_config(&cli.db, &config)?;
    log::debug!("opened {}", db.path());

    let ctx = match cli.timeout_ms {
        Some(ms) => Context::with_timeout(Duration::from_millis(ms)),
        None => Context::background(),
    };

    match cli.command {
        Command::Collections => {
            let names = db.collections(&ctx)?;
            print_output(&serde_json::json!(names), &cli.format)?;
        }

        Command::Get { collection, id } => {
            let doc: serde_json::Value = db.collection(&collection).document(&id).get(&ctx)?;
            print_output(&serde_json::json!({ "id": id, "data": doc }), &cli.format)?;
        }

        Command::List { collection } => {
            let docs = db.collection(&collection).query_all(&ctx)?;
            print_output(&documents_to_json(&docs)?, &cli.format)?;
        }

        Command::Query {
            collection,
            key_path,
            op,
            value,
        } => {
            let literal = parse_literal(&value);
            let docs = db
                .collection(&collection)
                .query(&ctx, &key_path, op, literal)?;
            print_output(&documents_to_json(&docs)?, &cli.format)?;
        }

        Command::Create {
            collection,
            id,
            json,
        } => {
            let data: serde_json::Value = serde_json::from_str(&json)?;
            db.collection(&collection).document(&id).create(&ctx, &data)?;
            print_output(&serde_json::json!({ "ok": true, "id": id }), &cli.format)?;
        }

        Command::Set {
            collection,
            id,
            json,
        } => {
            let data: serde_json::Value = serde_json::from_str(&json)?;
            db.collection(&collection).document(&id).set(&ctx, &data)?;
            print_output(&serde_json::json!({ "ok": true, "id": id }), &cli.format)?;
        }

        Command::Delete { collection, id } => {
            db.collection(&collection).document(&id).delete(&ctx)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
        }

        Command::Seed { dir } => {
            let summary = db.seed_from_dir(&ctx, &dir)?;
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "collections": summary.collections,
                    "documents": summary.documents,
                }),
                &cli.format,
            )?;
        }
    }

    db.close()?;
    Ok(())
}

fn documents_to_json(docs: &[litedoc::Document<'_>]) -> litedoc::Result<serde_json::Value> {
    let mut items = Vec::with_capacity(docs.len());
    for doc in docs {
        let data = match doc.raw() {
            Some(_) => doc.value()?,
            None => serde_json::Value::Null,
        };
        items.push(serde_json::json!({ "id": doc.id(), "data": data }));
    }
    Ok(serde_json::Value::Array(items))
}

fn parse_literal(raw: &str) -> Literal {
    // Bare words like `home` are not JSON; treat them as text.
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => Literal::from_json(&value),
        Err(_) => Literal::Text(raw.to_string()),
    }
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
