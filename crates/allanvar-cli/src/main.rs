//! CLI for allanvar: non-overlapping Allan variance of large binary files.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "allanvar")]
#[command(about = "allanvar: non-overlapping Allan variance of large binary files")]
#[command(version = allanvar_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the non-overlapping Allan variance of one or more files,
    /// reading them in chunks and printing a table after every chunk.
    Compute {
        /// Path(s) to the data file(s)
        #[arg(required = true)]
        files: Vec<String>,

        /// Number of 1 MB blocks per chunk (<= 0 or larger than the file: whole file)
        #[arg(short, long, default_value_t = 1.0, allow_negative_numbers = true)]
        blocks: f64,

        /// Smallest cluster size exponent, T = 2^tmin (negative clamps to 0)
        #[arg(short = 'T', long, default_value_t = 0, allow_negative_numbers = true)]
        tmin: i64,

        /// Merge each chunk into the previous ones (with the seam term) instead of
        /// reporting every chunk on its own
        #[arg(short, long)]
        sum: bool,

        /// Number of chunks to consider (0 = all)
        #[arg(short, long, default_value_t = 0)]
        count: usize,

        /// File offset in MB (negative clamps to 0)
        #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
        offset: f64,

        /// Save tables to .dat files (plus _INFO.txt and run.json) in this directory
        #[arg(short = 'd', long)]
        outdir: Option<String>,

        /// Worker threads for the cluster sizes of one chunk
        #[arg(short = 'j', long, default_value_t = 1)]
        threads: usize,
    },

    /// Fit a line to ln(variance) over ln(T) for saved .dat tables
    Fit {
        /// Path(s) to .dat tables
        #[arg(required = true)]
        tables: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    commands::init_logging();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Compute {
            files,
            blocks,
            tmin,
            sum,
            count,
            offset,
            outdir,
            threads,
        } => commands::compute::run(commands::compute::ComputeCommandConfig {
            files: &files,
            run: commands::build_run_config(
                blocks,
                tmin,
                sum,
                count,
                offset,
                outdir.as_deref(),
                threads,
            ),
        }),
        Commands::Fit { tables, json } => commands::fit::run(&tables, json),
    };
    std::process::exit(code);
}
