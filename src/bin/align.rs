use clap::{Parser, ValueEnum};
use edgestitch::{chain, prelude::*};
use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::PathBuf,
    process::ExitCode,
};
use tracing::{error, info};
use uom::si::{angle::radian, f64::Angle};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Bisection,
    LocalSearch,
    NelderMead,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DedupArg {
    Keep,
    Center,
    Nub,
}

impl From<DedupArg> for Dedup {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::Keep => Dedup::Keep,
            DedupArg::Center => Dedup::Center,
            DedupArg::Nub => Dedup::Nub,
        }
    }
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Line table with `file`, `rho` and `theta` columns.
    #[arg(long)]
    lines: PathBuf,

    /// Optional path to write the translation table to, stdout otherwise.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File listing the frame keys in acquisition order, one per line.
    ///
    /// Frames are ordered by key if omitted.
    #[arg(long)]
    order: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StrategyArg::Bisection)]
    strategy: StrategyArg,

    /// Search radius of the local search in pixels.
    #[arg(long, default_value_t = 5)]
    radius: u32,

    /// Frame height in pixels used by the reprojection error.
    #[arg(long, default_value_t = 1080.)]
    frame_height: f64,

    /// Iteration limit of the Nelder-Mead refinement.
    #[arg(long, default_value_t = 500)]
    max_iters: u64,

    /// Maximum rho deviation of twins in pixels.
    #[arg(long, default_value_t = 30.)]
    max_rho: f64,

    /// Maximum theta deviation of twins in radians.
    #[arg(long, default_value_t = 0.1)]
    max_theta: f64,

    #[arg(long, value_enum, default_value_t = DedupArg::Keep)]
    dedup: DedupArg,

    /// Drop lines deviating further from the vertical, in radians.
    #[arg(long)]
    max_vertical_deviation: Option<f64>,

    /// Number of worker threads.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Smooth translations over a sliding window of this size.
    #[arg(long)]
    smooth: Option<usize>,

    /// Also write pairs whose translation could not be estimated.
    #[arg(long)]
    keep_fallbacks: bool,
}

impl Args {
    fn config(&self) -> AlignConfig {
        let strategy = match self.strategy {
            StrategyArg::Bisection => Strategy::Bisection,
            StrategyArg::LocalSearch => Strategy::LocalSearch {
                radius: self.radius,
                frame_height: self.frame_height,
            },
            StrategyArg::NelderMead => Strategy::NelderMead {
                frame_height: self.frame_height,
                max_iters: self.max_iters,
            },
        };

        AlignConfig {
            similarity: Similarity::new(self.max_rho, Angle::new::<radian>(self.max_theta)),
            strategy,
            preprocess: LinePreprocessor {
                max_vertical_deviation: self.max_vertical_deviation.map(Angle::new::<radian>),
                dedup: self.dedup.into(),
            },
            max_concurrency: self.jobs,
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let table = LineTable::from_path(&args.lines)?;
    info!(rows = table.rows().len(), "read line table");

    let sequence = match &args.order {
        Some(path) => {
            let ordering: Vec<String> = fs::read_to_string(path)?
                .lines()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(String::from)
                .collect();
            Sequence::from_table_with_ordering(table, ordering.as_slice())?
        }
        None => Sequence::from_table(table)?,
    };

    let mut records = Aligner::new(args.config()).align(&sequence)?;
    if let Some(window) = args.smooth {
        records = chain::smooth(&records, window);
    }

    match &args.output {
        Some(path) => {
            write_translations(BufWriter::new(File::create(path)?), &records, args.keep_fallbacks)?;
            info!(path = %path.display(), "wrote translation table");
        }
        None => write_translations(io::stdout().lock(), &records, args.keep_fallbacks)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    // Register an event subscriber that prints events to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("no other global subscriber");

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "alignment failed");
            ExitCode::FAILURE
        }
    }
}
