// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
pub mod analysis;
pub mod chemistry;
pub mod core;
pub mod io;
pub mod jobs;
pub mod math;
pub mod synthesis;

// ============================================================================
// RE-EXPORTS (Public API)
// ============================================================================
pub use crate::core::error::TsError;
pub use crate::core::structure::{Atom, AtomRole, Lattice, Molecule, Structure};
pub use crate::io::{parser, writer};

pub use crate::analysis::results::{EnergySummary, Results};
pub use crate::analysis::symmetry::{PeriodicComparator, SymmetryComparator, SymmetryDeduplicator};
pub use crate::chemistry::resolver::{ResolvedReaction, SpeciesResolver};
pub use crate::chemistry::rules::{PlacementRule, RuleTable};
pub use crate::chemistry::tagging::RoleTagger;
pub use crate::jobs::minima::{copy_previous_minima, DirectoryMinimaLookup, MinimaLookup};
pub use crate::jobs::penalty::{EmittedJob, PenaltyConfig, PenaltyJobEmitter, TrackedSpecies};
pub use crate::jobs::template::JobTemplate;
pub use crate::jobs::ts_jobs::{TsJob, TsJobEmitter, TS_CANDIDATE_DIR, TS_UNIQUE_DIR};
pub use crate::synthesis::builder::{AdsorptionSiteBuilder, SiteBuilder};
pub use crate::synthesis::placer::{CandidateName, CandidatePlacer, PlacerConfig};

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

// ============================================================================
// HIGH-LEVEL INTERFACE
// ============================================================================

/// Name of the candidate directory inside a facet directory.
pub const TS_ESTIMATE_DIR: &str = "TS_estimate";

/// Configuration for the TS-estimate pipeline.
#[derive(Debug, Clone)]
pub struct TsConfig {
    /// Facet working directory (`<facet>/TS_estimate`, `<facet>/minima_unique`, ...).
    pub facet_path: PathBuf,
    /// Relaxed slab, extended XYZ.
    pub slab_path: PathBuf,
    /// YAML reaction document.
    pub reactions_path: PathBuf,
    pub placer: PlacerConfig,
}

impl TsConfig {
    pub fn ts_dir(&self) -> PathBuf {
        self.facet_path.join(TS_ESTIMATE_DIR)
    }
}

/// What happened to one reaction of the document.
#[derive(Debug, Clone)]
pub struct ReactionOutcome {
    pub name: String,
    /// Hill formula of the fragment that was placed.
    pub formula: String,
    pub generated: usize,
    pub unique: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub reactions: Vec<ReactionOutcome>,
    /// `(document index, message)` for reactions that were skipped.
    pub skipped: Vec<(usize, String)>,
}

impl BatchReport {
    pub fn total_unique(&self) -> usize {
        self.reactions.iter().map(|r| r.unique).sum()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- TS Estimate Report ---");
        for r in &self.reactions {
            let _ = writeln!(
                out,
                "• {:<24} fragment {:<8} {:>4} placed → {:>4} unique",
                r.name, r.formula, r.generated, r.unique
            );
        }
        for (index, message) in &self.skipped {
            let _ = writeln!(out, "• reaction #{} skipped: {}", index, message);
        }
        let _ = write!(out, "• Total unique candidates: {}", self.total_unique());
        out
    }
}

/// The master pipeline: resolve every reaction, place its fragment on all
/// sites and orientations, then keep only symmetry-distinct candidates.
///
/// The candidate directory is cleared once per run. Reactions whose
/// species cannot be parsed or identified are logged and skipped.
pub fn run_batch(config: &TsConfig) -> Result<BatchReport> {
    let records = io::reaction::load_reactions(&config.reactions_path)
        .with_context(|| format!("Failed to read reactions from {:?}", config.reactions_path))?;
    let slab = parser::from_xyz(&config.slab_path)
        .with_context(|| format!("Failed to read slab from {:?}", config.slab_path))?;
    let builder = AdsorptionSiteBuilder::new(slab).context("Slab is not usable for site placement")?;
    let rules = RuleTable::default();
    log::debug!("Placement rules for: {}", rules.formulas().collect::<Vec<_>>().join(", "));
    let placer = CandidatePlacer::new(&builder, &rules, config.placer.clone());

    let ts_dir = config.ts_dir();
    synthesis::placer::reset_directory(&ts_dir).with_context(|| format!("Cannot prepare {:?}", ts_dir))?;

    let mut resolver = SpeciesResolver::new(&config.facet_path);
    let mut report = BatchReport::default();

    for (index, record) in records.iter().enumerate() {
        let placed = resolver.resolve(record).and_then(|resolved| {
            let geometry = resolver
                .representative(resolved.enumeration_species())
                .map(|u| u.geometry.clone())
                .ok_or_else(|| TsError::UnknownSpecies(resolved.name()))?;
            let formula = resolved.enumeration_species().chemical_formula();
            let name = resolved.name();
            if !rules.is_listed(&formula) {
                log::debug!("{}: no rule for {}, using the default", name, formula);
            }
            let written = placer.append(&ts_dir, &geometry, &formula, &name)?;
            Ok((name, formula, written.len()))
        });

        match placed {
            Ok((name, formula, generated)) => {
                if let Some(previous) = report.reactions.iter().position(|r| r.name == name) {
                    log::warn!("Reaction {} listed twice; keeping the later candidates", name);
                    report.reactions.remove(previous);
                }
                report.reactions.push(ReactionOutcome { name, formula, generated, unique: 0 });
            }
            Err(e) if e.is_reaction_local() => {
                log::error!("Skipping reaction #{}: {}", index, e);
                report.skipped.push((index, e.to_string()));
            }
            Err(e) => return Err(e).with_context(|| format!("Reaction #{} failed", index)),
        }
    }

    let dedup = SymmetryDeduplicator::<PeriodicComparator>::default();
    for outcome in &mut report.reactions {
        let filtered = dedup
            .filter(&ts_dir, &outcome.name)
            .with_context(|| format!("Symmetry filtering failed for {}", outcome.name))?;
        outcome.unique = filtered.survivors.len();
    }

    Ok(report)
}

/// Settings for turning a candidate directory into restrained jobs.
#[derive(Debug, Clone)]
pub struct PenaltyRun {
    pub ts_dir: PathBuf,
    pub template_path: PathBuf,
    pub species: Vec<TrackedSpecies>,
    pub config: PenaltyConfig,
    pub surface_symbol: String,
    /// Earlier workflow runs searched for reusable minima, with the slab
    /// directory name they were stored under.
    pub previous_runs: Option<(PathBuf, String)>,
}

/// Copies reusable minima next to `ts_dir` when requested, then emits one
/// job per candidate.
pub fn prepare_penalty_jobs(run: &PenaltyRun) -> Result<Vec<EmittedJob>> {
    if let Some((root, slab_name)) = &run.previous_runs {
        let minima_dir = minima_dir_for(&run.ts_dir)?;
        let lookup = DirectoryMinimaLookup::new(root, slab_name.clone());
        let names: Vec<String> = run.species.iter().map(|s| s.symbol.clone()).collect();
        copy_previous_minima(&lookup, &names, &minima_dir)
            .with_context(|| format!("Failed to copy earlier minima into {:?}", minima_dir))?;
    }

    let template = JobTemplate::load(&run.template_path)
        .with_context(|| format!("Failed to load job template {:?}", run.template_path))?;
    let emitter = PenaltyJobEmitter::new(
        template,
        run.config.clone(),
        RoleTagger::new(run.surface_symbol.clone()),
        run.species.clone(),
    )?;
    let jobs = emitter
        .emit(&run.ts_dir)
        .with_context(|| format!("Failed to emit penalty jobs for {:?}", run.ts_dir))?;
    Ok(jobs)
}

/// Gathers the relaxed outputs of the restrained jobs under
/// `<facet>/TS_candidate`, keeps the symmetry-distinct ones in
/// `<facet>/TS_candidate_unique` and writes a TS job for each of those.
pub fn prepare_ts_jobs(facet_path: &Path, template_path: &Path) -> Result<Vec<TsJob>> {
    let template = JobTemplate::load(template_path)
        .with_context(|| format!("Failed to load job template {:?}", template_path))?;
    let ts_dir = facet_path.join(TS_ESTIMATE_DIR);
    let candidate_dir = facet_path.join(TS_CANDIDATE_DIR);
    let unique_dir = facet_path.join(TS_UNIQUE_DIR);

    jobs::ts_jobs::collect_relaxed_candidates(&ts_dir, &candidate_dir)
        .with_context(|| format!("Failed to collect relaxed candidates from {:?}", ts_dir))?;
    jobs::ts_jobs::select_unique_candidates(&PeriodicComparator::default(), &candidate_dir, &unique_dir)
        .context("Symmetry filtering of relaxed candidates failed")?;
    let jobs = TsJobEmitter::new(template)
        .emit(&unique_dir)
        .with_context(|| format!("Failed to emit TS jobs for {:?}", unique_dir))?;
    Ok(jobs)
}

fn minima_dir_for(ts_dir: &Path) -> Result<PathBuf> {
    let facet = ts_dir
        .parent()
        .with_context(|| format!("{:?} has no facet directory", ts_dir))?;
    Ok(facet.join("minima"))
}
