use crate::core::error::{Result, TsError};
use crate::core::structure::{Lattice, Structure};
use crate::io::parser;
use crate::math::rotation::{apply_planar, planar_point_operations};
use crate::synthesis::placer::CandidateName;
use glob::{glob, Pattern};
use log::{debug, info, warn};
use nalgebra::{Matrix2, Vector3};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// COMPARATORS
// ============================================================================

/// Decides whether two structures are the same up to the symmetry of the
/// periodic cell they sit in.
pub trait SymmetryComparator {
    fn equivalent(&self, a: &Structure, b: &Structure) -> bool;

    fn matches_any(&self, candidate: &Structure, uniques: &[Structure]) -> bool {
        uniques.iter().any(|u| self.equivalent(candidate, u))
    }
}

/// Equivalence under the in-plane point operations the lattice admits,
/// combined with any translation, with periodic images taken into account.
#[derive(Debug, Clone)]
pub struct PeriodicComparator {
    /// Largest allowed displacement (Å) between matched atoms.
    pub position_tolerance: f64,
    /// Largest allowed difference between cell matrix entries (Å).
    pub lattice_tolerance: f64,
}

impl Default for PeriodicComparator {
    fn default() -> Self {
        Self {
            position_tolerance: 0.2,
            lattice_tolerance: 1e-3,
        }
    }
}

impl PeriodicComparator {
    /// Point operations whose action maps the a/b lattice onto itself.
    fn lattice_operations(lattice: Option<&Lattice>) -> Vec<Matrix2<f64>> {
        let all = planar_point_operations();
        let Some(lattice) = lattice else {
            return all;
        };
        let (a, b) = (lattice.vector(0), lattice.vector(1));
        let basis = Matrix2::new(a.x, b.x, a.y, b.y);
        let Some(inverse) = basis.try_inverse() else {
            return vec![Matrix2::identity()];
        };
        all.into_iter()
            .filter(|op| {
                let m = inverse * op * basis;
                m.iter().all(|x| (x - x.round()).abs() < 1e-3)
            })
            .collect()
    }

    fn separation(&self, a: &Structure, p: &Vector3<f64>, q: &Vector3<f64>) -> f64 {
        match &a.lattice {
            Some(lattice) => {
                let mut d = lattice.to_fractional(&(q - p));
                for k in 0..3 {
                    if a.pbc[k] {
                        d[k] -= d[k].round();
                    }
                }
                lattice.to_cartesian(&d).norm()
            }
            None => (q - p).norm(),
        }
    }

    /// Whether `op` followed by `shift` sends every atom of `a` onto a
    /// distinct same-element atom of `b`.
    fn maps_onto(&self, a: &Structure, b: &Structure, op: &Matrix2<f64>, shift: &Vector3<f64>) -> bool {
        let mut used = vec![false; b.len()];
        for atom in &a.atoms {
            let image = apply_planar(op, &atom.position) + shift;
            let partner = b.atoms.iter().enumerate().position(|(j, other)| {
                !used[j]
                    && other.element == atom.element
                    && self.separation(b, &image, &other.position) < self.position_tolerance
            });
            match partner {
                Some(j) => used[j] = true,
                None => return false,
            }
        }
        true
    }
}

impl SymmetryComparator for PeriodicComparator {
    fn equivalent(&self, a: &Structure, b: &Structure) -> bool {
        if a.len() != b.len() || a.composition() != b.composition() {
            return false;
        }
        match (&a.lattice, &b.lattice) {
            (Some(la), Some(lb)) if !la.approx_eq(lb, self.lattice_tolerance) => return false,
            (Some(_), None) | (None, Some(_)) => return false,
            _ => {}
        }
        if a.is_empty() {
            return true;
        }

        // Anchor on the rarest element so few translations need trying.
        let composition = a.composition();
        let Some((anchor_element, _)) = composition.iter().min_by_key(|(_, n)| **n) else {
            return true;
        };
        let Some(anchor) = a.atoms.iter().find(|x| x.element == *anchor_element) else {
            return false;
        };

        for op in Self::lattice_operations(a.lattice.as_ref()) {
            let moved = apply_planar(&op, &anchor.position);
            for target in b.atoms.iter().filter(|x| x.element == *anchor_element) {
                let shift = target.position - moved;
                if self.maps_onto(a, b, &op, &shift) {
                    return true;
                }
            }
        }
        false
    }
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

/// Outcome of one filtering pass over a candidate directory.
#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub examined: usize,
    pub removed: Vec<CandidateName>,
    /// Names after renumbering, in order.
    pub survivors: Vec<CandidateName>,
}

pub struct SymmetryDeduplicator<C: SymmetryComparator> {
    comparator: C,
}

impl Default for SymmetryDeduplicator<PeriodicComparator> {
    fn default() -> Self {
        Self::new(PeriodicComparator::default())
    }
}

impl<C: SymmetryComparator> SymmetryDeduplicator<C> {
    pub fn new(comparator: C) -> Self {
        Self { comparator }
    }

    /// Candidates of `reaction` whose structure is equivalent to an earlier
    /// one in sequence order. The first member of every class survives.
    pub fn find_duplicates(&self, dir: &Path, reaction: &str) -> Result<Vec<CandidateName>> {
        let mut uniques: Vec<Structure> = Vec::new();
        let mut duplicates = Vec::new();
        for (name, path) in list_candidates(dir, reaction)? {
            let structure = parser::from_xyz(&path)?;
            if self.comparator.matches_any(&structure, &uniques) {
                debug!("{} is symmetry equivalent to an earlier candidate", name);
                duplicates.push(name);
            } else {
                uniques.push(structure);
            }
        }
        Ok(duplicates)
    }

    /// Deletes the duplicates of `reaction` and compacts the survivors.
    pub fn filter(&self, dir: &Path, reaction: &str) -> Result<DedupReport> {
        let examined = list_candidates(dir, reaction)?.len();
        let removed = self.find_duplicates(dir, reaction)?;
        remove_duplicates(dir, &removed)?;
        let survivors = renumber_candidates(dir, reaction)?;
        info!(
            "{}: {} of {} candidates are symmetry distinct",
            reaction,
            survivors.len(),
            examined
        );
        Ok(DedupReport { examined, removed, survivors })
    }
}

/// Every `*.xyz` candidate in `dir`, ordered by sequence number. Files that
/// do not follow the candidate naming are skipped.
pub fn candidate_files(dir: &Path) -> Result<Vec<(CandidateName, PathBuf)>> {
    if !dir.is_dir() {
        return Err(TsError::FileSystem(dir.to_path_buf()));
    }
    let dir_str = dir
        .to_str()
        .ok_or_else(|| TsError::InvalidInput(format!("non UTF-8 path {:?}", dir)))?;
    let pattern = format!("{}/*.xyz", Pattern::escape(dir_str));
    let entries = glob(&pattern).map_err(|e| TsError::InvalidInput(format!("bad glob pattern: {}", e)))?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| TsError::from(std::io::Error::from(e)))?;
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match CandidateName::parse(file_name) {
            Some(name) => found.push((name, path)),
            None => debug!("Skipping {:?}: not a candidate file", path),
        }
    }
    found.sort();
    Ok(found)
}

/// Candidates of `reaction` in `dir`, ordered by sequence number.
pub fn list_candidates(dir: &Path, reaction: &str) -> Result<Vec<(CandidateName, PathBuf)>> {
    Ok(candidate_files(dir)?
        .into_iter()
        .filter(|(name, _)| name.reaction == reaction)
        .collect())
}

/// Deletes the named candidates. A file that is already gone is reported
/// and skipped.
pub fn remove_duplicates(dir: &Path, names: &[CandidateName]) -> Result<usize> {
    let mut removed = 0;
    for name in names {
        let path = dir.join(name.file_name());
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Error while deleting file {:?}: not found", path);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Renames the candidates of `reaction` to `000..k-1` keeping their order.
/// Only the numeric prefix changes.
pub fn renumber_candidates(dir: &Path, reaction: &str) -> Result<Vec<CandidateName>> {
    let mut renamed = Vec::new();
    for (index, (name, path)) in list_candidates(dir, reaction)?.into_iter().enumerate() {
        let target = CandidateName::new(index, name.reaction.clone());
        if target != name {
            fs::rename(&path, dir.join(target.file_name()))?;
        }
        renamed.push(target);
    }
    Ok(renamed)
}
