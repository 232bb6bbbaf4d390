use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Table, presets::UTF8_FULL};
use std::sync::Arc;
use tiered_bloom::{
    BloomFilter, FilterConfigBuilder, StateError, StateStore,
    common::{bits2hr, bytes2hr, ratio2hr},
    optimal_hash_count, optimal_size,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Inspect and edit encrypted filter state", long_about = None)]
struct Cli {
    /// Encrypted state file (or redb database with --redb)
    #[arg(short, long, env = "TBLOOM_STATE_PATH", default_value = "tbloom.state")]
    state: String,

    /// Password the state is encrypted with
    #[arg(short, long, env = "TBLOOM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Treat --state as a redb database and keep the filter under this key
    #[cfg(feature = "redb")]
    #[arg(long)]
    redb: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty filter and write it to the state location
    Init {
        /// Number of elements the filter is sized for
        #[arg(short, long, default_value = "1000000")]
        expected: usize,

        /// False positive rate (between 0 and 1)
        #[arg(short, long, default_value = "0.01")]
        fpr: f64,

        /// Overwrite an existing state
        #[arg(long)]
        force: bool,
    },

    /// Add keys to the filter
    Add {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Check whether keys might be present
    Check {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Display filter statistics
    Stats,

    /// Print the decrypted state as JSON
    Export,

    /// Print optimal parameters for a workload, no state needed
    Size {
        #[arg(short, long)]
        expected: usize,

        #[arg(short, long, default_value = "0.01")]
        fpr: f64,
    },
}

struct Target {
    store: StateStore,
    location: String,
    password: String,
}

impl Target {
    fn open(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let password = cli
            .password
            .clone()
            .ok_or("a password is required (--password or TBLOOM_PASSWORD)")?;

        #[cfg(feature = "redb")]
        {
            if let Some(key) = &cli.redb {
                let backend = tiered_bloom::RedbBackend::open(&cli.state)?;
                return Ok(Self {
                    store: StateStore::new(Arc::new(backend)),
                    location: key.clone(),
                    password,
                });
            }
        }

        Ok(Self {
            store: StateStore::new(Arc::new(tiered_bloom::FileBackend)),
            location: cli.state.clone(),
            password,
        })
    }

    fn load(&self) -> Result<BloomFilter, Box<dyn std::error::Error>> {
        let state = match self.store.load(&self.location, &self.password) {
            Ok(state) => state,
            Err(StateError::NotFound(location)) => {
                return Err(format!("no filter at {location}, run `init` first").into());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(BloomFilter::try_from(state)?)
    }

    fn save(&self, filter: &BloomFilter) -> Result<(), Box<dyn std::error::Error>> {
        self.store
            .save(&filter.export_state(), &self.location, &self.password)?;
        Ok(())
    }
}

/// Bit count and hash count for a filter, rejecting inputs a filter could
/// not be built from.
fn optimal_parameters(
    expected: usize,
    fpr: f64,
) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    FilterConfigBuilder::default()
        .expected_elements(expected)
        .false_positive_rate(fpr)
        .build()?
        .validate()?;
    let size = optimal_size(expected, fpr);
    Ok((size, optimal_hash_count(size, expected)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Size { expected, fpr } => {
            let (size, hashes) = optimal_parameters(*expected, *fpr)?;
            println!("Optimal parameters for {expected} elements at {}:", ratio2hr(*fpr));
            println!("  Bits: {size}");
            println!("  Hash functions: {hashes}");
            println!("  Memory: {}", bits2hr(size));
        }
        Commands::Init {
            expected,
            fpr,
            force,
        } => {
            let target = Target::open(&cli)?;
            if target.store.exists(&target.location)? && !force {
                println!(
                    "{} state already exists at {}",
                    "Error:".red().bold(),
                    target.location
                );
                println!("Use --force to overwrite it.");
                return Ok(());
            }

            let config = FilterConfigBuilder::default()
                .expected_elements(*expected)
                .false_positive_rate(*fpr)
                .build()?;
            let filter = BloomFilter::new(config)?;
            target.save(&filter)?;

            println!("Created filter at {}", target.location.green());
            println!("  Expected elements: {expected}");
            println!("  False positive rate: {fpr}");
            println!("  Bits: {}", filter.size());
            println!("  Hash functions: {}", filter.hash_count());
        }
        Commands::Add { keys } => {
            let target = Target::open(&cli)?;
            let mut filter = target.load()?;
            for key in keys {
                if filter.add(key.as_str())? {
                    println!("{} {key}", "added".green());
                } else {
                    println!("{} {key}", "present".yellow());
                }
            }
            target.save(&filter)?;
        }
        Commands::Check { keys } => {
            let target = Target::open(&cli)?;
            let filter = target.load()?;
            for key in keys {
                if filter.has(key.as_str())? {
                    println!("{} {key}", "maybe".yellow());
                } else {
                    println!("{} {key}", "absent".red());
                }
            }
        }
        Commands::Stats => {
            let target = Target::open(&cli)?;
            let filter = target.load()?;
            let stats = filter.stats();

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Metric", "Value"]);
            table.add_row(vec!["Location".to_string(), target.location.clone()]);
            table.add_row(vec!["Bits".to_string(), stats.size.to_string()]);
            table.add_row(vec!["Hash functions".to_string(), stats.hash_count.to_string()]);
            table.add_row(vec!["Bits set".to_string(), stats.set_bits.to_string()]);
            table.add_row(vec!["Fill ratio".to_string(), ratio2hr(stats.fill_ratio)]);
            table.add_row(vec![
                "Estimated FPR".to_string(),
                ratio2hr(stats.false_positive_rate),
            ]);
            table.add_row(vec![
                "Expected elements".to_string(),
                filter.config().expected_elements.to_string(),
            ]);
            table.add_row(vec![
                "Memory".to_string(),
                bytes2hr(filter.memory_usage_bytes()),
            ]);
            println!("{table}");
        }
        Commands::Export => {
            let target = Target::open(&cli)?;
            let state = target.store.load(&target.location, &target.password)?;
            println!("{}", serde_json::to_string(&state)?);
        }
    }

    Ok(())
}
