use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use catalog_api::{CatalogApi, SnapshotExport};
use catalog_core::{BackupSnapshot, CustomFieldRequest, Entity, EntityKind, FilterRequest};
use catalog_store_sqlite::{
    BoardGameBoxTable, BoardGameTable, EntityTable, SystemTable, ToyTable, VideoGameBoxTable,
    VideoGameTable,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "CATALOG_LOG";

#[derive(Debug, Parser)]
#[command(name = "catalog")]
#[command(about = "Collection catalog CLI")]
struct Cli {
    #[arg(long, env = "CATALOG_DB", default_value = "./catalog.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    CustomField {
        #[command(subcommand)]
        command: CustomFieldCommand,
    },
    Entity {
        #[command(subcommand)]
        command: EntityCommand,
    },
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum CustomFieldCommand {
    Declare(DeclareArgs),
    List(ListFieldsArgs),
    Show(ShowFieldArgs),
}

#[derive(Debug, Args)]
struct DeclareArgs {
    #[arg(long)]
    name: String,
    #[arg(long = "type")]
    field_type: String,
    #[arg(long)]
    entity_key: String,
}

#[derive(Debug, Args)]
struct ListFieldsArgs {
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
}

#[derive(Debug, Args)]
struct ShowFieldArgs {
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long)]
    name: String,
}

#[derive(Debug, Subcommand)]
enum EntityCommand {
    Create(WriteArgs),
    Get(GetArgs),
    Search(SearchArgs),
    Update(UpdateArgs),
    Delete(IdArgs),
}

impl EntityCommand {
    fn kind(&self) -> KindArg {
        match self {
            Self::Create(args) => args.kind,
            Self::Get(args) => args.kind,
            Self::Search(args) => args.kind,
            Self::Update(args) => args.write.kind,
            Self::Delete(args) => args.kind,
        }
    }
}

#[derive(Debug, Args)]
struct WriteArgs {
    #[arg(long, value_enum)]
    kind: KindArg,
    /// Entity JSON, or `@path` to read it from a file.
    #[arg(long)]
    data: String,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long)]
    id: i64,
    #[command(flatten)]
    write: WriteArgs,
}

#[derive(Debug, Args)]
struct GetArgs {
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long)]
    id: i64,
    #[arg(long, default_value_t = false, conflicts_with = "deleted")]
    include_deleted: bool,
    #[arg(long, default_value_t = false)]
    deleted: bool,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long, value_enum)]
    kind: KindArg,
    /// `field:operator:operand`, repeatable; every filter must match.
    #[arg(long = "filter")]
    filters: Vec<String>,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    Export(ExportArgs),
    Import(ImportArgs),
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    System,
    Toy,
    VideoGame,
    VideoGameBox,
    BoardGame,
    BoardGameBox,
}

impl From<KindArg> for EntityKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::System => Self::System,
            KindArg::Toy => Self::Toy,
            KindArg::VideoGame => Self::VideoGame,
            KindArg::VideoGameBox => Self::VideoGameBox,
            KindArg::BoardGame => Self::BoardGame,
            KindArg::BoardGameBox => Self::BoardGameBox,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(db = %cli.db.display(), "opening catalog");
    let api = CatalogApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(command, &api),
        Command::CustomField { command } => run_custom_field(command, &api),
        Command::Entity { command } => {
            let payload = match command.kind() {
                KindArg::System => run_entity::<SystemTable>(command, &api),
                KindArg::Toy => run_entity::<ToyTable>(command, &api),
                KindArg::VideoGame => run_entity::<VideoGameTable>(command, &api),
                KindArg::VideoGameBox => run_entity::<VideoGameBoxTable>(command, &api),
                KindArg::BoardGame => run_entity::<BoardGameTable>(command, &api),
                KindArg::BoardGameBox => run_entity::<BoardGameBoxTable>(command, &api),
            }?;
            emit_json(payload)
        }
        Command::Backup { command } => run_backup(command, &api),
    }
}

fn run_db(command: DbCommand, api: &CatalogApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
    }
}

fn run_custom_field(command: CustomFieldCommand, api: &CatalogApi) -> Result<()> {
    match command {
        CustomFieldCommand::Declare(args) => {
            let field = api.declare_custom_field(&CustomFieldRequest {
                name: args.name,
                field_type: args.field_type,
                entity_key: args.entity_key,
            })?;
            emit_json(serde_json::json!({ "custom_field": field }))
        }
        CustomFieldCommand::List(args) => {
            let fields = api.list_custom_fields(args.kind.map(EntityKind::from))?;
            emit_json(serde_json::json!({ "custom_fields": fields }))
        }
        CustomFieldCommand::Show(args) => {
            let field = api.lookup_custom_field(args.kind.into(), &args.name)?;
            emit_json(serde_json::json!({ "custom_field": field }))
        }
    }
}

fn run_entity<K: EntityTable>(command: EntityCommand, api: &CatalogApi) -> Result<Value> {
    let kind = K::kind();
    let entity = match command {
        EntityCommand::Create(args) => {
            let input: Entity<K::Data> = read_payload(&args.data)?;
            api.create::<K>(&input)?
        }
        EntityCommand::Get(args) if args.deleted => api.get_deleted::<K>(args.id)?,
        EntityCommand::Get(args) if args.include_deleted => api.get_include_deleted::<K>(args.id)?,
        EntityCommand::Get(args) => api.get::<K>(args.id)?,
        EntityCommand::Search(args) => {
            let filters = args
                .filters
                .iter()
                .map(|raw| parse_filter(kind, raw))
                .collect::<Result<Vec<_>>>()?;
            let found = api.search::<K>(&filters)?;
            return Ok(serde_json::json!({
                "entity_key": kind.as_str(),
                "count": found.len(),
                "entities": found
            }));
        }
        EntityCommand::Update(args) => {
            let mut input: Entity<K::Data> = read_payload(&args.write.data)?;
            input.id = Some(args.id);
            api.update::<K>(&input)?
        }
        EntityCommand::Delete(args) => api.delete::<K>(args.id)?,
    };
    Ok(serde_json::json!({ "entity_key": kind.as_str(), "entity": entity }))
}

fn run_backup(command: BackupCommand, api: &CatalogApi) -> Result<()> {
    match command {
        BackupCommand::Export(args) => {
            let SnapshotExport { digest, snapshot } = api.export_snapshot()?;
            let body = serde_json::to_string_pretty(&snapshot)
                .context("failed to serialize backup snapshot")?;
            fs::write(&args.out, body)
                .with_context(|| format!("failed to write snapshot {}", args.out.display()))?;
            emit_json(serde_json::json!({
                "out": args.out,
                "digest": digest,
                "custom_fields": snapshot.custom_fields.len(),
                "systems": snapshot.systems.len(),
                "toys": snapshot.toys.len(),
                "video_games": snapshot.video_games.len(),
                "video_game_boxes": snapshot.video_game_boxes.len(),
                "board_games": snapshot.board_games.len(),
                "board_game_boxes": snapshot.board_game_boxes.len()
            }))
        }
        BackupCommand::Import(args) => {
            let body = fs::read_to_string(&args.input)
                .with_context(|| format!("failed to read snapshot {}", args.input.display()))?;
            let snapshot: BackupSnapshot = serde_json::from_str(&body)
                .with_context(|| format!("invalid snapshot JSON in {}", args.input.display()))?;
            let result = api.import_snapshot(&snapshot, args.strict)?;
            emit_json(serde_json::json!({
                "in": args.input,
                "strict": args.strict,
                "result": result
            }))
        }
    }
}

fn read_payload<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    let body = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read entity payload {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&body).context("invalid entity JSON")
}

fn parse_filter(kind: EntityKind, raw: &str) -> Result<FilterRequest> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(field), Some(operator), Some(operand)) if !field.is_empty() => Ok(FilterRequest {
            key: kind.as_str().to_string(),
            field: field.to_string(),
            operator: operator.to_string(),
            operand: operand.to_string(),
        }),
        _ => Err(anyhow!("filter '{raw}' must look like field:operator:operand")),
    }
}
