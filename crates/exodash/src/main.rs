use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use exodash::classify::{ClassificationForm, Preset};
use exodash::cli::commands::{self, ClassifyInput};
use exodash::cli::{Session, TableView};
use exodash::config::Config;
use exodash::loader::Mission;
use exodash::model::{Disposition, RowId};

#[derive(Parser)]
#[command(name = "exodash")]
#[command(about = "Exodash - exoplanet dataset dashboard\nManage the training/held-out split and classify candidates")]
#[command(version)]
struct Cli {
  /// Config file (default: $EXODASH_CONFIG or ~/.exodash/config.yaml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// ML service base URL, overrides config
  #[arg(long, global = true)]
  server: Option<String>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Only print errors and results
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Command,
}

/// The five classifier inputs
#[derive(Args)]
struct FeatureArgs {
  /// Orbital period (days)
  #[arg(long, default_value = "")]
  period: String,
  /// Transit duration (hours)
  #[arg(long, default_value = "")]
  duration: String,
  /// Transit depth (ppm)
  #[arg(long, default_value = "")]
  depth: String,
  /// Planet radius (Earth radii)
  #[arg(long, default_value = "")]
  prad: String,
  /// Equilibrium temperature (K)
  #[arg(long, default_value = "")]
  teq: String,
}

impl FeatureArgs {
  fn form(self) -> ClassificationForm {
    ClassificationForm {
      period: self.period,
      duration: self.duration,
      depth: self.depth,
      prad: self.prad,
      teq: self.teq,
    }
  }
}

#[derive(Subcommand)]
enum Command {
  /// Show ML service health and partition counts
  Status,
  /// Show the training (or held-out) collection as a table
  Dataset {
    /// Show held-out rows instead of training
    #[arg(long)]
    held_out: bool,
    #[command(flatten)]
    view: TableView,
  },
  /// Show a mission catalog CSV as a table
  Catalog {
    #[arg(value_enum)]
    mission: Mission,
    /// CSV file (default: <catalog_dir>/<mission file>)
    #[arg(short, long)]
    file: Option<PathBuf>,
    #[command(flatten)]
    view: TableView,
  },
  /// Randomly re-split the whole dataset into training and held-out
  Split {
    /// Share of rows to hold out (5-50)
    #[arg(short = 'p', long)]
    percentage: Option<u8>,
    /// Wait for the vector index rebuild
    #[arg(short, long)]
    wait: bool,
  },
  /// Move rows from training to held-out
  Hold {
    #[arg(required = true)]
    ids: Vec<String>,
    #[arg(short, long)]
    wait: bool,
  },
  /// Move rows from held-out back to training
  Release {
    #[arg(required = true)]
    ids: Vec<String>,
    #[arg(short, long)]
    wait: bool,
  },
  /// Leave Test Mode, returning all held-out rows to training
  Reset {
    #[arg(short, long)]
    wait: bool,
  },
  /// Classify a candidate from features, a preset or an existing row
  Classify {
    #[command(flatten)]
    features: FeatureArgs,
    /// Use a mission's sample values
    #[arg(long, value_enum, conflicts_with = "row")]
    example: Option<Preset>,
    /// Use the features of a loaded row
    #[arg(long)]
    row: Option<String>,
  },
  /// Add a user row to training
  Add {
    #[command(flatten)]
    features: FeatureArgs,
    /// CANDIDATE or "FALSE POSITIVE" (1/0 also accepted)
    #[arg(long, default_value = "CANDIDATE")]
    disposition: Disposition,
    #[arg(short, long)]
    wait: bool,
  },
  /// Change a row's disposition
  Relabel {
    id: String,
    disposition: Disposition,
    #[arg(short, long)]
    wait: bool,
  },
  /// Delete a user row
  Remove { id: String },
  /// Upload a CSV of user rows
  Upload { file: PathBuf },
  /// Save the training collection and rebuild the vector index
  Save {
    #[arg(short, long)]
    wait: bool,
  },
  /// Follow a vector index rebuild task
  Task { id: String },
}

async fn handle(session: &Session, command: Command) -> Result<()> {
  match command {
    Command::Status => commands::status(session).await,
    Command::Dataset { held_out, view } => commands::dataset(session, held_out, &view).await,
    Command::Catalog { mission, file, view } => commands::catalog(session, mission, file, &view),
    Command::Split { percentage, wait } => commands::split(session, percentage, wait).await,
    Command::Hold { ids, wait } => commands::hold(session, &ids, wait).await,
    Command::Release { ids, wait } => commands::release(session, &ids, wait).await,
    Command::Reset { wait } => commands::reset(session, wait).await,
    Command::Classify { features, example, row } => {
      let input = match (example, row) {
        (Some(preset), _) => ClassifyInput::Preset(preset),
        (None, Some(id)) => ClassifyInput::Row(RowId::new(id)),
        (None, None) => ClassifyInput::Form(features.form()),
      };
      commands::classify(session, input).await
    }
    Command::Add { features, disposition, wait } => {
      commands::add(session, &features.form(), disposition, wait).await
    }
    Command::Relabel { id, disposition, wait } => commands::relabel(session, &id, disposition, wait).await,
    Command::Remove { id } => commands::remove(session, &id).await,
    Command::Upload { file } => commands::upload(session, &file).await,
    Command::Save { wait } => commands::save(session, wait).await,
    Command::Task { id } => commands::task(session, &id).await,
  }
}

fn load_config(cli: &Cli) -> Result<Config> {
  let mut config = match &cli.config {
    Some(path) => {
      let mut config = Config::load_from_file(path)?;
      config.apply_env()?;
      config
    }
    None => Config::load()?,
  };
  if let Some(server) = &cli.server {
    config.server_url = server.clone();
  }
  Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if cli.verbose {
      EnvFilter::new("exodash=debug,warn")
    } else {
      EnvFilter::new("error")
    }
  });
  tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
  exolog::set_quiet(cli.quiet);

  let config = load_config(&cli)?;
  let session = Session::connect(config)?;
  handle(&session, cli.command).await
}
