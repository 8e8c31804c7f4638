use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use surface_ts_generator::{
    chemistry::tagging::DEFAULT_SURFACE_SYMBOL, prepare_penalty_jobs, prepare_ts_jobs, run_batch, PenaltyConfig, PenaltyRun,
    PlacerConfig, Results, TrackedSpecies, TsConfig, TS_ESTIMATE_DIR,
};

#[derive(Parser)]
#[command(author, version, about = "Surface Transition-State Estimate Generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Places reacting fragments on the slab and keeps symmetry-distinct guesses.
    Generate {
        /// Facet working directory.
        #[arg(short, long)]
        facet: PathBuf,

        /// Relaxed slab (extended XYZ).
        #[arg(short, long)]
        slab: PathBuf,

        /// Reaction document (YAML).
        #[arg(short, long)]
        reactions: PathBuf,

        /// Degrees between fragment orientations.
        #[arg(long, default_value_t = 60.0)]
        rotation_step: f64,

        /// Stretch factor for the reacting bond.
        #[arg(long, default_value_t = 1.4)]
        scfactor: f64,

        #[arg(long, value_delimiter = ',', default_value = "3,3,1")]
        repeats: Vec<usize>,
    },

    /// Writes a restrained optimisation job for every candidate.
    Penalty {
        /// Facet working directory.
        #[arg(short, long)]
        facet: PathBuf,

        /// Job script template.
        #[arg(short, long)]
        template: PathBuf,

        /// Tracked species, exactly two (e.g. `--species CH3O --species H`).
        #[arg(long, required = true)]
        species: Vec<String>,

        /// Species whose reference distance is multiplied by `scfactor_surface`.
        #[arg(long)]
        scaled: Vec<String>,

        #[arg(long, default_value_t = 1.0)]
        scfactor_surface: f64,

        #[arg(long, value_delimiter = ',', default_value = "3,3,1")]
        repeats: Vec<usize>,

        /// Optimised slab path written into each job.
        #[arg(long)]
        slabopt: String,

        #[arg(long, default_value = DEFAULT_SURFACE_SYMBOL)]
        surface: String,

        /// Root of earlier workflow runs to copy finished minima from.
        #[arg(long)]
        previous_runs: Option<PathBuf>,

        /// Slab directory name inside those runs.
        #[arg(long, requires = "previous_runs")]
        slab_name: Option<String>,
    },

    /// Collects relaxed penalty outputs and writes a TS job per distinct one.
    TsJobs {
        /// Facet working directory.
        #[arg(short, long)]
        facet: PathBuf,

        /// TS job script template.
        #[arg(short, long)]
        template: PathBuf,
    },

    /// Prints the reaction energy and barriers of finished calculations.
    Results {
        #[arg(long)]
        minima: PathBuf,

        #[arg(long)]
        ts: PathBuf,

        #[arg(short, long)]
        slab: PathBuf,

        #[arg(long, value_delimiter = '+', required = true)]
        reactants: Vec<String>,

        #[arg(long, value_delimiter = '+', required = true)]
        products: Vec<String>,
    },
}

fn repeats_from(values: &[usize]) -> Result<[usize; 3]> {
    match values {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => anyhow::bail!("--repeats takes three comma separated integers, got {:?}", values),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let start_time = Instant::now();

    match cli.command {
        Commands::Generate {
            facet, slab, reactions,
            rotation_step, scfactor, repeats,
        } => {
            println!("--- Surface TS Estimate Generator ---");

            let config = TsConfig {
                facet_path: facet,
                slab_path: slab,
                reactions_path: reactions,
                placer: PlacerConfig {
                    rotation_step,
                    scfactor,
                    repeats: repeats_from(&repeats)?,
                },
            };
            println!(
                "Placing fragments every {}° ({} orientations) on a {:?} supercell...",
                rotation_step,
                config.placer.orientation_count()?,
                config.placer.repeats
            );

            let report = run_batch(&config)?;

            println!("\nSuccess!");
            println!("{}", report.render());
            println!("Candidates written to {:?}", config.ts_dir());
        }

        Commands::Penalty {
            facet, template, species, scaled, scfactor_surface,
            repeats, slabopt, surface, previous_runs, slab_name,
        } => {
            println!("--- Penalty Job Preparation ---");

            let tracked = species
                .iter()
                .map(|s| TrackedSpecies::new(s.clone(), scaled.contains(s)))
                .collect();
            let previous_runs = match (previous_runs, slab_name) {
                (Some(root), Some(name)) => Some((root, name)),
                (Some(_), None) => anyhow::bail!("--previous-runs needs --slab-name"),
                _ => None,
            };
            let run = PenaltyRun {
                ts_dir: facet.join(TS_ESTIMATE_DIR),
                template_path: template,
                species: tracked,
                config: PenaltyConfig {
                    scfactor_surface,
                    repeats: repeats_from(&repeats)?,
                    slabopt,
                },
                surface_symbol: surface,
                previous_runs,
            };

            let jobs = prepare_penalty_jobs(&run)?;

            println!("\nSuccess!");
            for job in &jobs {
                println!("• {:<32} {:?}", job.name.stem(), job.script);
            }
            println!("-> {} jobs prepared.", jobs.len());
        }

        Commands::TsJobs { facet, template } => {
            println!("--- TS Job Preparation ---");

            let jobs = prepare_ts_jobs(&facet, &template)?;

            println!("\nSuccess!");
            for job in &jobs {
                println!("• {:<32} {:?}", job.name.stem(), job.script);
            }
            println!("-> {} TS jobs prepared.", jobs.len());
        }

        Commands::Results { minima, ts, slab, reactants, products } => {
            let results = Results::new(minima, ts, slab, reactants, products);
            let summary = results.summary()?;
            println!("{}", summary.to_table());
        }
    }

    println!("Done in {:.2?}", start_time.elapsed());
    Ok(())
}
