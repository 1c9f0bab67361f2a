use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use dataset_lineage::config::Settings;
use dataset_lineage::datatype::DatasetId;
use dataset_lineage::insert::{DatasetEntry, StateEntry};
use dataset_lineage::{Catalog, LineageError, Result};

#[derive(Parser)]
#[command(name = "dslineage", about = "Inspect and extend a dataset lineage store")]
struct Cli {
    /// Settings file (defaults to dslineage.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the number of datasets in the tree containing DATASET_ID
    TreeSize { dataset_id: String },
    /// Print the closest ancestor of DATASET_ID whose state has type TYPE
    Ancestor {
        dataset_id: String,
        #[arg(value_name = "TYPE")]
        state_type: String,
    },
    /// Print the state types attached to DATASET_ID
    Types { dataset_id: String },
    /// Load every dataset, state and state type and print the cache sizes
    Index,
    /// Insert a state entry read from a JSON file
    InsertState { file: PathBuf },
    /// Insert a dataset entry read from a JSON file
    InsertDataset { file: PathBuf },
}

fn read_entry<T: serde::de::DeserializeOwned>(file: &PathBuf) -> Result<T> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| LineageError::Validation(format!("{}: {e}", file.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| LineageError::Validation(format!("{}: {e}", file.display())))
}

fn run(command: Command, catalog: &Catalog) -> Result<()> {
    match command {
        Command::TreeSize { dataset_id } => {
            println!("Counting tree size of node {dataset_id}...");
            let start = catalog.resolve_dataset(dataset_id.parse()?)?;
            let summary = catalog.build_index()?;
            println!("Total number of nodes in DB: {}", summary.datasets);
            println!("Tree size: {}", catalog.tree_size(&start)?);
        }
        Command::Ancestor {
            dataset_id,
            state_type,
        } => {
            let dataset = catalog.resolve_dataset(dataset_id.parse()?)?;
            let ancestor = catalog.closest_ancestor_of_type(&dataset, &state_type)?;
            println!("{ancestor} state {}", ancestor.state());
        }
        Command::Types { dataset_id } => {
            let id: DatasetId = dataset_id.parse()?;
            for state_type in catalog.attached_types(id)? {
                println!("{}", state_type.name());
            }
        }
        Command::Index => {
            let summary = catalog.build_index()?;
            println!(
                "{} state types, {} states, {} datasets in {:.1} ms",
                summary.state_types,
                summary.states,
                summary.datasets,
                summary.elapsed.as_secs_f64() * 1000.0
            );
        }
        Command::InsertState { file } => {
            let entry: StateEntry = read_entry(&file)?;
            let outcome = catalog.insert_state(&entry)?;
            println!("{} {outcome:?}", entry.id()?);
        }
        Command::InsertDataset { file } => {
            let entry: DatasetEntry = read_entry(&file)?;
            let outcome = catalog.insert_dataset(&entry)?;
            println!("{} {outcome:?}", entry.id()?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = Catalog::open(&settings).and_then(|catalog| run(cli.command, &catalog));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "dslineage failed");
            ExitCode::FAILURE
        }
    }
}
