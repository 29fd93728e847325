//! l0 - control plane operator tool
//!
//! Usage:
//!   l0 tags init                 # Create the tag table
//!   l0 tags list --type service  # Inspect recorded tags
//!   l0 name format web           # Remote name for an entity ID
//!   l0 plan --instance-type ...  # Dry-run the scaler's packing
//!   l0 config show               # Effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use l0_core::config::{ConfigStore, L0Config};
use l0_core::id::{HashIdGenerator, IdGenerator};
use l0_core::naming;
use l0_core::scaler::{
    ResourceConsumer, ResourceProvider, calculate_scale_down, calculate_scale_up, instance_spec,
};
use l0_core::tag::{FileTagStore, Tag, TagStore, Tags};
use l0_core::types::EntityType;

/// Instance name used when no config file exists yet.
const DEFAULT_INSTANCE: &str = "default";

#[derive(Parser)]
#[command(name = "l0")]
#[command(about = "Container control plane operator tool", long_about = None)]
struct Cli {
    /// Config file (defaults to <config_dir>/l0/l0.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit the tag store
    Tags(TagsArgs),

    /// Convert between entity IDs and remote resource names
    Name(NameArgs),

    /// Show how pending containers would be packed onto instances
    Plan(PlanArgs),

    /// Show or write configuration
    Config(ConfigArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Args)]
struct TagsArgs {
    /// Directory holding the tag table (defaults to the state directory)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: TagsSubcommand,
}

#[derive(Subcommand)]
enum TagsSubcommand {
    /// Create the tag table if it does not exist
    Init,

    /// List tags
    #[command(alias = "ls")]
    List {
        /// Filter by entity type (environment, load_balancer, deploy, service, task, job)
        #[arg(long = "type", short = 't')]
        entity_type: Option<EntityType>,

        /// Filter by entity ID (requires --type)
        #[arg(long, requires = "entity_type")]
        id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Insert or replace one tag
    Set {
        entity_type: EntityType,
        entity_id: String,
        key: String,
        value: String,
    },

    /// Delete one tag, or every tag of an entity when no key is given
    #[command(alias = "rm")]
    Delete {
        entity_type: EntityType,
        entity_id: String,
        key: Option<String>,
    },
}

#[derive(Args)]
struct NameArgs {
    #[command(subcommand)]
    command: NameSubcommand,
}

#[derive(Subcommand)]
enum NameSubcommand {
    /// Print `l0-<instance>-<entity_id>`
    Format { entity_id: String },

    /// Extract the entity ID from a remote name or ARN
    Parse { name: String },

    /// Generate a fresh entity ID from a display name
    Generate { name: String },
}

#[derive(Args)]
struct PlanArgs {
    /// Instance type new instances would be launched with
    #[arg(long, default_value = l0_core::config::schema::DEFAULT_INSTANCE_TYPE)]
    instance_type: String,

    /// Existing instance as ID:CPU:MEMORY[:busy]
    #[arg(long = "provider", short = 'p', value_name = "ID:CPU:MEMORY[:busy]")]
    providers: Vec<String>,

    /// Container to place as ID:CPU:MEMORY[:PORT,...]
    #[arg(long = "consumer", short = 'c', value_name = "ID:CPU:MEMORY[:PORTS]")]
    consumers: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file location
    Path,

    /// Write a default config file for an instance
    Init {
        instance: String,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "l0=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_store = match &cli.config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_dir()?,
    };

    match cli.command {
        Commands::Tags(args) => run_tags(args),
        Commands::Name(args) => run_name(args, &config_store),
        Commands::Plan(args) => run_plan(args),
        Commands::Config(args) => run_config(args, &config_store),
    }
}

fn run_tags(args: TagsArgs) -> Result<()> {
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => FileTagStore::default_state_dir()?,
    };
    let store = FileTagStore::new(state_dir);
    debug!(table = %store.table_path().display(), "Opened tag store");

    match args.command {
        TagsSubcommand::Init => {
            store.init()?;
            println!(
                "{} Tag table ready at {}",
                style("✓").green(),
                store.table_path().display()
            );
        }
        TagsSubcommand::List {
            entity_type,
            id,
            format,
        } => {
            let tags = match (entity_type, id) {
                (Some(entity_type), Some(id)) => store.select_by_type_and_id(entity_type, &id)?,
                (Some(entity_type), None) => store.select_by_type(entity_type)?,
                _ => store.select_all()?,
            };
            match format {
                OutputFormat::Table => print_tags_table(&tags),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&tags.into_vec())?)
                }
            }
        }
        TagsSubcommand::Set {
            entity_type,
            entity_id,
            key,
            value,
        } => {
            store.insert(Tag::new(entity_type, &entity_id, &key, &value))?;
            println!("{} {entity_type} '{entity_id}': {key} = {value}", style("✓").green());
        }
        TagsSubcommand::Delete {
            entity_type,
            entity_id,
            key,
        } => {
            let keys = match key {
                Some(key) => vec![key],
                None => store
                    .select_by_type_and_id(entity_type, &entity_id)?
                    .iter()
                    .map(|tag| tag.key.clone())
                    .collect(),
            };
            for key in &keys {
                store.delete(entity_type, &entity_id, key)?;
            }
            println!(
                "{} Removed {} tag(s) from {entity_type} '{entity_id}'",
                style("✓").green(),
                keys.len()
            );
        }
    }
    Ok(())
}

fn print_tags_table(tags: &Tags) {
    if tags.is_empty() {
        println!("{}", style("No tags").dim());
        return;
    }

    println!(
        "{:<15} {:<14} {:<20} {}",
        style("TYPE").bold(),
        style("ID").bold(),
        style("KEY").bold(),
        style("VALUE").bold()
    );
    for tag in tags {
        println!(
            "{:<15} {:<14} {:<20} {}",
            tag.entity_type.as_str(),
            tag.entity_id,
            tag.key,
            tag.value
        );
    }
}

fn run_name(args: NameArgs, config_store: &ConfigStore) -> Result<()> {
    match args.command {
        NameSubcommand::Format { entity_id } => {
            let config = config_store.load(DEFAULT_INSTANCE)?;
            println!("{}", naming::fq_name(&config.instance, &entity_id));
        }
        NameSubcommand::Parse { name } => {
            let config = config_store.load(DEFAULT_INSTANCE)?;
            let short = naming::name_from_arn(&name);
            let entity_id = naming::parse_entity_id(&config.instance, short).with_context(|| {
                format!(
                    "'{}' does not belong to instance '{}'",
                    short, config.instance
                )
            })?;
            println!("{entity_id}");
        }
        NameSubcommand::Generate { name } => {
            println!("{}", HashIdGenerator::new().generate(&name));
        }
    }
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<()> {
    let spec = instance_spec(&args.instance_type)
        .with_context(|| format!("Unknown instance type '{}'", args.instance_type))?;
    let providers = args
        .providers
        .iter()
        .map(|raw| parse_provider(raw))
        .collect::<Result<Vec<_>>>()?;
    let consumers = args
        .consumers
        .iter()
        .map(|raw| parse_consumer(raw))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        instance_type = %args.instance_type,
        providers = providers.len(),
        consumers = consumers.len(),
        "Planning placement"
    );
    let new_instance = ResourceProvider::new_instance("<new instance>", spec.cpu, spec.memory);
    let distribution = calculate_scale_up(&providers, &consumers, &new_instance)?;
    let unused = calculate_scale_down(&distribution.providers);
    let desired_scale = distribution.providers.len() - unused.len();

    match args.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "instance_type": args.instance_type,
                "desired_scale": desired_scale,
                "providers": distribution.providers,
                "unused": unused.iter().map(|p| &p.id).collect::<Vec<_>>(),
                "incompatible": distribution.incompatible,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<16} {:>8} {:>10} {}",
                style("INSTANCE").bold(),
                style("CPU LEFT").bold(),
                style("MEM LEFT").bold(),
                style("STATE").bold()
            );
            for provider in &distribution.providers {
                let state = if provider.in_use {
                    style("in use").green()
                } else {
                    style("idle").yellow()
                };
                println!(
                    "{:<16} {:>8} {:>10} {}",
                    provider.id, provider.available_cpu, provider.available_memory, state
                );
            }
            println!();
            println!("Desired scale: {}", style(desired_scale).bold());
            if !distribution.incompatible.is_empty() {
                println!(
                    "{} Too large for {}: {}",
                    style("!").red().bold(),
                    args.instance_type,
                    distribution.incompatible.join(", ")
                );
            }
        }
    }
    Ok(())
}

/// `ID:CPU:MEMORY[:busy]`
fn parse_provider(raw: &str) -> Result<ResourceProvider> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (id, cpu, memory, busy) = match parts.as_slice() {
        [id, cpu, memory] => (*id, *cpu, *memory, false),
        [id, cpu, memory, "busy"] => (*id, *cpu, *memory, true),
        _ => anyhow::bail!("Invalid provider '{}', expected ID:CPU:MEMORY[:busy]", raw),
    };
    let mut provider = ResourceProvider::new_instance(
        id,
        parse_units(cpu, "CPU", raw)?,
        parse_units(memory, "memory", raw)?,
    );
    provider.in_use = busy;
    Ok(provider)
}

/// `ID:CPU:MEMORY[:PORT,...]`
fn parse_consumer(raw: &str) -> Result<ResourceConsumer> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (id, cpu, memory, ports) = match parts.as_slice() {
        [id, cpu, memory] => (*id, *cpu, *memory, ""),
        [id, cpu, memory, ports] => (*id, *cpu, *memory, *ports),
        _ => anyhow::bail!("Invalid consumer '{}', expected ID:CPU:MEMORY[:PORTS]", raw),
    };
    let ports = ports
        .split(',')
        .filter(|p| !p.is_empty())
        .map(|p| parse_units(p, "port", raw))
        .collect::<Result<Vec<_>>>()?;
    Ok(ResourceConsumer::new(
        id,
        parse_units(cpu, "CPU", raw)?,
        parse_units(memory, "memory", raw)?,
        ports,
    ))
}

fn parse_units(value: &str, what: &str, raw: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .ok()
        .filter(|v| *v >= 0)
        .with_context(|| format!("Invalid {} '{}' in '{}'", what, value, raw))
}

fn run_config(args: ConfigArgs, config_store: &ConfigStore) -> Result<()> {
    match args.command {
        ConfigSubcommand::Show => {
            let config = config_store.load_file(DEFAULT_INSTANCE)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigSubcommand::Path => {
            println!("{}", config_store.config_path().display());
        }
        ConfigSubcommand::Init { instance, force } => {
            if config_store.config_path().exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    config_store.config_path().display()
                );
            }
            let config = L0Config::new(instance);
            config.validate()?;
            config_store.save(&config)?;
            println!(
                "{} Wrote {}",
                style("✓").green(),
                config_store.config_path().display()
            );
        }
    }
    Ok(())
}
