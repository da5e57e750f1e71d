use bson::{Bson, Document as BsonDocument};
use clap::{Args, Parser, Subcommand};
use docflow::config::{ConnectionConfig, FindSection, FlowConfig, UpdateSection};
use docflow::memory::MemoryServer;
use docflow::memory::seed::{CsvOptions, seed_csv, seed_ndjson};
use docflow::{Docflow, FlowContext, Message, OpError, Processor};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "docflow", version, about = "Run find/update operations against a seeded document store", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a flow file (TOML). Falls back to DOCFLOW_CONFIG, then ./docflow.toml")]
    config: Option<PathBuf>,
    #[arg(long, help = "Database name; overrides [connection].database")]
    database: Option<String>,
    #[arg(long = "seed-json", help = "NDJSON file loaded into the target collection before running")]
    seed_json: Vec<PathBuf>,
    #[arg(long = "seed-csv", help = "CSV file (with header) loaded into the target collection before running")]
    seed_csv: Vec<PathBuf>,
    #[arg(long, help = "Stop on the first malformed seed record instead of skipping it")]
    strict_seed: bool,
    #[arg(long, help = "Log level: error|warn|info|debug|trace")]
    log_level: Option<String>,
    #[arg(long, help = "Write rolling log files here instead of stderr")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Find documents; prints one JSON document per line")]
    Find(FindArgs),
    #[command(about = "Update documents; prints the result attributes as JSON")]
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
struct FindArgs {
    #[arg(long, help = "Collection name; overrides [find].collection")]
    collection: Option<String>,
    #[arg(long, help = "Filter expression, e.g. \"{ name: 'Ada' }\"")]
    filter: Option<String>,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    #[arg(long, help = "Collection name; overrides [update].collection")]
    collection: Option<String>,
    #[arg(long, help = "Query expression (required here or in the flow file)")]
    query: Option<String>,
    #[arg(long, help = "Update document expression; the payload is used when omitted")]
    document: Option<String>,
    #[arg(long, help = "Inbound message payload as document text")]
    payload: Option<String>,
    #[arg(long, help = "Update every match instead of the first")]
    many: bool,
    #[arg(long, help = "Insert a document when nothing matches")]
    upsert: bool,
}

/// Precedence: --config > DOCFLOW_CONFIG > ./docflow.toml > defaults.
fn load_flow(cli_cfg: Option<&PathBuf>) -> Result<FlowConfig, OpError> {
    let mut paths: Vec<PathBuf> = vec![];
    if let Some(p) = cli_cfg {
        paths.push(p.clone());
    }
    if let Ok(p) = std::env::var("DOCFLOW_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("docflow.toml"));
    }
    for p in paths {
        if p.exists() {
            log::debug!("loading flow file {}", p.display());
            return FlowConfig::load(&p);
        }
    }
    Ok(FlowConfig {
        connection: ConnectionConfig::new("default", "docflow"),
        log: docflow::config::LogConfig::default(),
        find: None,
        update: None,
    })
}

fn to_json_line(doc: BsonDocument) -> String {
    Bson::Document(doc).into_relaxed_extjson().to_string()
}

fn seed(cli: &Cli, server: &MemoryServer, database: &str, collection: &str) -> Result<(), OpError> {
    let target = server.collection(database, collection);
    for path in &cli.seed_json {
        seed_ndjson(&target, File::open(path)?, !cli.strict_seed)?;
    }
    for path in &cli.seed_csv {
        seed_csv(&target, File::open(path)?, &CsvOptions::default(), !cli.strict_seed)?;
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), OpError> {
    let mut flow = load_flow(cli.config.as_ref())?;
    let log_dir = cli.log_dir.clone().or_else(|| flow.log.dir.clone());
    let log_level = cli.log_level.clone().or_else(|| flow.log.level.clone());
    docflow::logger::configure_logging(log_dir.as_deref(), log_level.as_deref(), flow.log.retention)?;
    if let Some(db) = &cli.database {
        flow.connection.database.clone_from(db);
    }

    let server = Arc::new(MemoryServer::new());
    let runtime = Docflow::in_memory(server.clone());
    let ctx = FlowContext::new();

    match &cli.command {
        Commands::Find(args) => {
            let mut section = flow.find.take().unwrap_or(FindSection { collection: String::new(), filter: None });
            if let Some(c) = &args.collection {
                section.collection.clone_from(c);
            }
            if let Some(f) = &args.filter {
                section.filter = Some(f.as_str().into());
            }
            flow.find = Some(section);
            let Some(config) = flow.find_config() else {
                return Err(OpError::Config("no [find] section".into()));
            };
            seed(cli, &server, &config.connection.database, &config.collection)?;
            let find = runtime.find(config)?;
            let out = find.apply(&ctx, &Message::default())?;
            for doc in out.documents().unwrap_or_default() {
                println!("{}", to_json_line(doc.clone()));
            }
        }
        Commands::Update(args) => {
            let mut section = flow.update.take().unwrap_or(UpdateSection {
                collection: String::new(),
                query: None,
                document: None,
                many: false,
                upsert: false,
            });
            if let Some(c) = &args.collection {
                section.collection.clone_from(c);
            }
            if let Some(q) = &args.query {
                section.query = Some(q.as_str().into());
            }
            if let Some(d) = &args.document {
                section.document = Some(d.as_str().into());
            }
            section.many |= args.many;
            section.upsert |= args.upsert;
            flow.update = Some(section);
            let Some(config) = flow.update_config() else {
                return Err(OpError::Config("no [update] section".into()));
            };
            seed(cli, &server, &config.connection.database, &config.collection)?;
            let update = runtime.update(config)?;
            let message = args.payload.as_deref().map(Message::with_value).unwrap_or_default();
            let out = update.apply(&ctx, &message)?;
            println!("{}", to_json_line(out.attributes.as_document().clone()));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
