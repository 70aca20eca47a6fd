use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use tw_store::{DuckDbConnector, FieldKey, Ledger, StoreConfig, StoreConnector};

#[derive(Parser, Debug)]
#[command(name = "tw-manage", about = "Inspect and maintain TurboWorks optimization ledgers")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct StoreArgs {
    /// Directory holding the DuckDB database files.
    #[arg(long, env = "TW_STORE_ROOT", default_value = "tw-store")]
    root: PathBuf,
    /// Loop configuration file to take the store address from.
    #[arg(long, conflicts_with_all = ["host", "port", "name"])]
    config: Option<PathBuf>,
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 27017)]
    port: u16,
    /// Database name.
    #[arg(long, default_value = "turboworks")]
    name: String,
    /// Collection (opt_label) to operate on; overrides the config file.
    #[arg(long)]
    collection: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Number of records, complete or not.
    Count,
    /// Print raw records matching every `field=json` filter.
    Query {
        #[arg(value_name = "FIELD=JSON")]
        filters: Vec<String>,
    },
    /// Every value of a key: a whole vector (`x`, `z`, `x_new`, `z_new`), one
    /// position (`x[0]`), `y`, or an extra field.
    Values { key: String },
    Sum { key: String },
    /// Average of a key; integer keys truncate.
    Avg { key: String },
    /// Minimum of a key (maximum with `--max`) and the input that produced it.
    Optimum {
        key: String,
        #[arg(long)]
        max: bool,
    },
    /// Copy every record into another collection of the same database.
    Backup {
        #[arg(long)]
        to: String,
    },
    /// Delete every record of the collection.
    Nuke {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

impl StoreArgs {
    fn store_config(&self) -> anyhow::Result<StoreConfig> {
        let config = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                serde_json::from_str::<StoreConfig>(&raw)
                    .with_context(|| format!("invalid store settings in {}", path.display()))?
            }
            None => StoreConfig::with_address(self.host.clone(), self.port, self.name.clone()),
        };
        Ok(match &self.collection {
            Some(collection) => config.with_opt_label(collection.clone()),
            None => config,
        })
    }
}

fn parse_filters(filters: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut parsed = Map::new();
    for filter in filters {
        let Some((field, raw)) = filter.split_once('=') else {
            bail!("filter {filter:?} is not of the form FIELD=JSON");
        };
        // bare words are taken as strings
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        parsed.insert(field.to_string(), value);
    }
    Ok(parsed)
}

fn execute(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let address = cli.store.store_config()?.resolve()?;
    let connector = DuckDbConnector::new(&cli.store.root)?;
    let ledger = Ledger::new(connector.connect(&address)?);
    tracing::debug!("Managing {}", address);

    match &cli.command {
        Command::Count => writeln!(out, "{}", ledger.count()?)?,
        Command::Query { filters } => {
            for doc in ledger.query(&parse_filters(filters)?)? {
                writeln!(out, "{}", serde_json::to_string(&doc)?)?;
            }
        }
        Command::Values { key } => {
            let rendered = match FieldKey::parse(key) {
                FieldKey::Vector { .. } => serde_json::to_string(&ledger.points_of(key)?)?,
                _ => serde_json::to_string(&ledger.values_of(key)?)?,
            };
            writeln!(out, "{rendered}")?;
        }
        Command::Sum { key } => writeln!(out, "{}", ledger.sum_of(key)?)?,
        Command::Avg { key } => writeln!(out, "{}", ledger.average_of(key)?)?,
        Command::Optimum { key, max } => {
            let (value, x) = ledger.extremum_of(key, !max)?;
            writeln!(out, "{value} at {x}")?;
        }
        Command::Backup { to } => {
            let target = Ledger::new(connector.connect(&address.with_collection(to.clone()))?);
            let copied = ledger.back_up(&target)?;
            tracing::info!("Backed up {} records from {} to {}", copied, address.collection, to);
            writeln!(out, "{copied}")?;
        }
        Command::Nuke { yes } => {
            if !yes {
                bail!(
                    "refusing to delete every record of {} without --yes",
                    address.collection
                );
            }
            let removed = ledger.purge()?;
            tracing::info!("Deleted {} records from {}", removed, address.collection);
            writeln!(out, "{removed}")?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    execute(&cli, &mut stdout.lock())
}
