use crate::analysis::symmetry::{candidate_files, SymmetryComparator};
use crate::core::error::{Result, TsError};
use crate::core::structure::Structure;
use crate::io::{parser, writer};
use crate::jobs::template::JobTemplate;
use crate::synthesis::placer::{reset_directory, CandidateName};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Relaxed TS guesses, one `<prefix>/` directory per candidate.
pub const TS_CANDIDATE_DIR: &str = "TS_candidate";
/// Symmetry-distinct subset of [`TS_CANDIDATE_DIR`].
pub const TS_UNIQUE_DIR: &str = "TS_candidate_unique";
/// Suffix of the trajectory a restrained optimisation leaves next to its job.
pub const RELAXED_SUFFIX: &str = "_relaxed.xyz";

/// `<stem>_relaxed.xyz`
pub fn relaxed_file_name(name: &CandidateName) -> String {
    format!("{}{}", name.stem(), RELAXED_SUFFIX)
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TsError::FileSystem(dir.to_path_buf()));
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Candidates below `root/<prefix>/`, in directory then sequence order.
pub fn nested_candidates(root: &Path) -> Result<Vec<(CandidateName, PathBuf)>> {
    let mut found = Vec::new();
    for dir in sorted_subdirs(root)? {
        found.extend(candidate_files(&dir)?);
    }
    Ok(found)
}

/// Takes the last frame of every relaxed trajectory under `ts_dir` and
/// writes it to `candidate_dir/<prefix>/<stem>.xyz` with a preview beside
/// it. `candidate_dir` is rebuilt from scratch.
pub fn collect_relaxed_candidates(ts_dir: &Path, candidate_dir: &Path) -> Result<Vec<CandidateName>> {
    let calc_dirs = sorted_subdirs(ts_dir)?;
    reset_directory(candidate_dir)?;

    let mut collected = Vec::new();
    for calc_dir in calc_dirs {
        let mut relaxed: Vec<PathBuf> = fs::read_dir(&calc_dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        relaxed.sort();

        for path in relaxed {
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(RELAXED_SUFFIX))
            else {
                continue;
            };
            let Some(name) = CandidateName::parse(&format!("{}.xyz", stem)) else {
                debug!("Skipping {:?}: not a candidate trajectory", path);
                continue;
            };
            let Some(last) = parser::read_xyz_frames(&path)?.pop() else {
                warn!("{:?} holds no frames", path);
                continue;
            };

            let target_dir = candidate_dir.join(name.prefix());
            fs::create_dir_all(&target_dir)?;
            writer::to_xyz(&last, &target_dir.join(name.file_name()))?;
            writer::write_preview(&last, &target_dir.join(format!("{}_initial.svg", name.stem())))?;
            collected.push(name);
        }
    }

    if collected.is_empty() {
        warn!("No relaxed trajectories found under {:?}", ts_dir);
    } else {
        info!("Collected {} relaxed candidates into {:?}", collected.len(), candidate_dir);
    }
    Ok(collected)
}

/// Relaxed candidates that are not equivalent to an earlier one of the
/// same reaction. Order follows [`nested_candidates`].
pub fn unique_relaxed_candidates<C: SymmetryComparator>(
    comparator: &C,
    candidate_dir: &Path,
) -> Result<Vec<(CandidateName, PathBuf)>> {
    let mut seen: BTreeMap<String, Vec<Structure>> = BTreeMap::new();
    let mut unique = Vec::new();
    for (name, path) in nested_candidates(candidate_dir)? {
        let structure = parser::from_xyz(&path)?;
        let uniques = seen.entry(name.reaction.clone()).or_default();
        if comparator.matches_any(&structure, uniques) {
            debug!("Relaxed {} duplicates an earlier candidate", name);
            continue;
        }
        uniques.push(structure);
        unique.push((name, path));
    }
    Ok(unique)
}

/// Copies the symmetry-distinct relaxed candidates into `unique_dir`,
/// keeping their names and `<prefix>/` layout.
pub fn select_unique_candidates<C: SymmetryComparator>(
    comparator: &C,
    candidate_dir: &Path,
    unique_dir: &Path,
) -> Result<Vec<CandidateName>> {
    let examined = nested_candidates(candidate_dir)?.len();
    let unique = unique_relaxed_candidates(comparator, candidate_dir)?;
    reset_directory(unique_dir)?;

    let mut kept = Vec::with_capacity(unique.len());
    for (name, path) in unique {
        let target_dir = unique_dir.join(name.prefix());
        fs::create_dir_all(&target_dir)?;
        fs::copy(&path, target_dir.join(name.file_name()))?;
        kept.push(name);
    }
    info!("{} of {} relaxed candidates are symmetry distinct", kept.len(), examined);
    Ok(kept)
}

/// One TS optimisation script.
#[derive(Debug, Clone)]
pub struct TsJob {
    pub name: CandidateName,
    pub script: PathBuf,
}

/// Fills the TS template for every candidate under a `<prefix>/` tree.
///
/// Fields: `TS` (candidate path relative to the tree root), `rxn`,
/// `prefix` and `geomName`.
pub struct TsJobEmitter {
    template: JobTemplate,
}

impl TsJobEmitter {
    pub fn new(template: JobTemplate) -> Self {
        Self { template }
    }

    /// Writes `<root>/<stem>_ts.py` per candidate.
    pub fn emit(&self, root: &Path) -> Result<Vec<TsJob>> {
        let mut jobs = Vec::new();
        for (name, _) in nested_candidates(root)? {
            let mut values: BTreeMap<&str, String> = BTreeMap::new();
            values.insert("TS", format!("{}/{}", name.prefix(), name.file_name()));
            values.insert("rxn", name.reaction.clone());
            values.insert("prefix", name.prefix());
            values.insert("geomName", name.stem());

            let script = root.join(format!("{}_ts.py", name.stem()));
            fs::write(&script, self.template.render(&values)?)?;
            jobs.push(TsJob { name, script });
        }
        info!("Prepared {} TS jobs in {:?}", jobs.len(), root);
        Ok(jobs)
    }
}
