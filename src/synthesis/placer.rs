use crate::chemistry::rules::RuleTable;
use crate::core::error::{Result, TsError};
use crate::core::structure::{Molecule, Structure};
use crate::io::writer;
use crate::math::rotation::Axis;
use crate::synthesis::builder::SiteBuilder;
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// `<seq:03>_<reaction>.xyz`, the identity of a candidate on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateName {
    pub sequence: usize,
    pub reaction: String,
}

impl CandidateName {
    pub fn new(sequence: usize, reaction: impl Into<String>) -> Self {
        Self { sequence, reaction: reaction.into() }
    }

    /// Zero-padded to at least three digits.
    pub fn prefix(&self) -> String {
        format!("{:03}", self.sequence)
    }

    pub fn stem(&self) -> String {
        format!("{:03}_{}", self.sequence, self.reaction)
    }

    pub fn file_name(&self) -> String {
        format!("{}.xyz", self.stem())
    }

    /// Inverse of [`CandidateName::file_name`]. The reaction part keeps any
    /// underscores of its own.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".xyz")?;
        let (prefix, reaction) = stem.split_once('_')?;
        if prefix.len() < 3 || !prefix.bytes().all(|b| b.is_ascii_digit()) || reaction.is_empty() {
            return None;
        }
        Some(Self {
            sequence: prefix.parse().ok()?,
            reaction: reaction.to_string(),
        })
    }
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// One placed TS guess. Never modified after it is written.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub sequence: usize,
    pub reaction_name: String,
    pub structure: Structure,
}

impl Candidate {
    pub fn name(&self) -> CandidateName {
        CandidateName::new(self.sequence, self.reaction_name.clone())
    }
}

#[derive(Debug, Clone)]
pub struct PlacerConfig {
    /// Degrees between successive fragment orientations about z.
    pub rotation_step: f64,
    /// Stretch applied to the reacting bond.
    pub scfactor: f64,
    /// Supercell the candidates are written on.
    pub repeats: [usize; 3],
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            rotation_step: 60.0,
            scfactor: 1.4,
            repeats: [3, 3, 1],
        }
    }
}

impl PlacerConfig {
    /// `ceil(360 / rotation_step)`: zero plus every further whole step short
    /// of a full turn. Steps that do not divide 360 round up, so 100° gives
    /// four orientations (0, 100, 200, 300).
    pub fn orientation_count(&self) -> Result<usize> {
        if !(self.rotation_step > 0.0 && self.rotation_step <= 360.0) {
            return Err(TsError::InvalidInput(format!(
                "rotation step must lie in (0, 360], got {}",
                self.rotation_step
            )));
        }
        Ok((360.0 / self.rotation_step - 1e-9).ceil().max(1.0) as usize)
    }
}

/// Places a fragment on the surface over all orientations and sites.
pub struct CandidatePlacer<'a, B: SiteBuilder> {
    builder: &'a B,
    rules: &'a RuleTable,
    config: PlacerConfig,
}

impl<'a, B: SiteBuilder> CandidatePlacer<'a, B> {
    pub fn new(builder: &'a B, rules: &'a RuleTable, config: PlacerConfig) -> Self {
        Self { builder, rules, config }
    }

    /// Candidates for `fragment` in generation order.
    ///
    /// # Arguments
    /// * `fragment` - Fragment geometry; atom order is the order the rule table indexes.
    /// * `formula` - Hill formula used to pick the placement rule.
    /// * `reaction_name` - Suffix of every candidate file name.
    pub fn generate(&self, fragment: &Molecule, formula: &str, reaction_name: &str) -> Result<Vec<Candidate>> {
        let orientations = self.config.orientation_count()?;
        let rule = self.rules.lookup(formula);
        let bonded_through = rule.bonded_through();

        let mut fragment = fragment.clone();
        rule.apply(&mut fragment, self.config.scfactor)?;

        let slab = self.builder.slab();
        let nslab = slab.len();
        let big_slab = slab.repeat(self.config.repeats)?;

        let mut candidates = Vec::new();
        for k in 0..orientations {
            let placements = self.builder.place(&fragment, bonded_through)?;
            let sites = placements.len();
            for (i, placed) in placements.into_iter().enumerate() {
                let mut structure = big_slab.clone();
                structure.atoms.extend(placed.atoms.into_iter().skip(nslab));
                candidates.push(Candidate {
                    sequence: i + sites * k,
                    reaction_name: reaction_name.to_string(),
                    structure,
                });
            }
            fragment.rotate(self.config.rotation_step, Axis::Z);
        }
        debug!("{} candidates for {} ({} orientations)", candidates.len(), reaction_name, orientations);
        Ok(candidates)
    }

    /// Clears `ts_dir`, then generates and writes every candidate.
    pub fn write_all(&self, ts_dir: &Path, fragment: &Molecule, formula: &str, reaction_name: &str) -> Result<Vec<PathBuf>> {
        reset_directory(ts_dir)?;
        self.append(ts_dir, fragment, formula, reaction_name)
    }

    /// Generates and writes every candidate without clearing `ts_dir` first.
    pub fn append(&self, ts_dir: &Path, fragment: &Molecule, formula: &str, reaction_name: &str) -> Result<Vec<PathBuf>> {
        let candidates = self.generate(fragment, formula, reaction_name)?;
        let mut written = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let path = ts_dir.join(candidate.name().file_name());
            writer::to_xyz(&candidate.structure, &path)?;
            written.push(path);
        }
        info!("Wrote {} TS candidates for {} to {:?}", written.len(), reaction_name, ts_dir);
        Ok(written)
    }
}

/// Removes `dir` when present and recreates it empty.
pub fn reset_directory(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Atom, AtomRole, Lattice};
    use crate::io::parser;
    use nalgebra::Vector3;

    /// Two fixed sites above a one-atom cell.
    struct TwoSites {
        slab: Structure,
    }

    impl TwoSites {
        fn new() -> Self {
            let lattice = Lattice::from_vectors(
                Vector3::new(2.5, 0.0, 0.0),
                Vector3::new(0.0, 2.5, 0.0),
                Vector3::new(0.0, 0.0, 15.0),
            )
            .unwrap();
            let atoms = vec![Atom::new("Cu", Vector3::new(0.0, 0.0, 5.0)).with_role(AtomRole::Surface)];
            Self { slab: Structure::new(Some(lattice), atoms) }
        }
    }

    impl SiteBuilder for TwoSites {
        fn place(&self, fragment: &Molecule, bonded_through: usize) -> Result<Vec<Structure>> {
            let anchor = fragment.atoms[bonded_through].position;
            let mut out = Vec::new();
            for site in [Vector3::new(0.0, 0.0, 7.0), Vector3::new(1.25, 1.25, 6.5)] {
                let mut s = self.slab.clone();
                s.atoms.extend(fragment.atoms.iter().map(|a| {
                    Atom { position: a.position - anchor + site, role: AtomRole::Adsorbate, ..a.clone() }
                }));
                out.push(s);
            }
            Ok(out)
        }

        fn slab(&self) -> &Structure {
            &self.slab
        }
    }

    fn hydroxyl() -> Molecule {
        Molecule::new(vec![
            Atom::new("O", Vector3::zeros()).with_tag(1),
            Atom::new("H", Vector3::new(0.0, 0.0, 0.97)),
        ])
    }

    #[test]
    fn test_file_name_round_trip() {
        let name = CandidateName::new(7, "OH_O+H");
        assert_eq!(name.file_name(), "007_OH_O+H.xyz");
        assert_eq!(CandidateName::parse(&name.file_name()), Some(name));
        assert_eq!(CandidateName::parse("1234_CO_C+O.xyz").unwrap().sequence, 1234);
        assert!(CandidateName::parse("07_OH.xyz").is_none());
        assert!(CandidateName::parse("abc_OH.xyz").is_none());
        assert!(CandidateName::parse("007_OH.traj").is_none());
    }

    #[test]
    fn test_orientation_count() {
        let count = |r: f64| PlacerConfig { rotation_step: r, ..PlacerConfig::default() }.orientation_count();
        assert_eq!(count(120.0).unwrap(), 3);
        assert_eq!(count(90.0).unwrap(), 4);
        assert_eq!(count(100.0).unwrap(), 4);
        assert_eq!(count(360.0).unwrap(), 1);
        assert!(count(0.0).is_err());
        assert!(count(400.0).is_err());
    }

    #[test]
    fn test_numbering_is_site_major_within_orientation() {
        let builder = TwoSites::new();
        let rules = RuleTable::default();
        let config = PlacerConfig { rotation_step: 120.0, scfactor: 1.0, repeats: [2, 2, 1] };
        let placer = CandidatePlacer::new(&builder, &rules, config);

        let candidates = placer.generate(&hydroxyl(), "HO", "OH_O+H").unwrap();
        let sequences: Vec<usize> = candidates.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);
        // Repeated slab first, then the two fragment atoms.
        assert_eq!(candidates[0].structure.len(), 4 + 2);
        assert_eq!(candidates[0].structure.atoms[4].element, "O");
        assert_eq!(candidates[1].structure.atoms[4].position.x, 1.25);
    }

    #[test]
    fn test_fragment_turns_between_orientations() {
        let builder = TwoSites::new();
        let rules = RuleTable::default();
        let config = PlacerConfig { rotation_step: 90.0, scfactor: 1.0, repeats: [1, 1, 1] };
        let candidates = CandidatePlacer::new(&builder, &rules, config)
            .generate(&hydroxyl(), "HO", "OH_O+H")
            .unwrap();
        // After the 90° y turn the O-H bond lies along +x, then turns about z.
        let h = |c: &Candidate| c.structure.atoms[2].position - c.structure.atoms[1].position;
        assert!((h(&candidates[0]).x - 0.97).abs() < 1e-9);
        assert!((h(&candidates[2]).y - 0.97).abs() < 1e-9);
    }

    #[test]
    fn test_regeneration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ts_dir = dir.path().join("TS_estimate");
        let builder = TwoSites::new();
        let rules = RuleTable::default();
        let placer = CandidatePlacer::new(&builder, &rules, PlacerConfig { rotation_step: 180.0, ..PlacerConfig::default() });

        let first = placer.write_all(&ts_dir, &hydroxyl(), "HO", "OH_O+H").unwrap();
        let snapshot: Vec<String> = first.iter().map(|p| fs::read_to_string(p).unwrap()).collect();
        fs::write(ts_dir.join("stale.xyz"), "junk").unwrap();

        let second = placer.write_all(&ts_dir, &hydroxyl(), "HO", "OH_O+H").unwrap();
        assert_eq!(first, second);
        assert!(!ts_dir.join("stale.xyz").exists());
        for (path, before) in second.iter().zip(&snapshot) {
            assert_eq!(&fs::read_to_string(path).unwrap(), before);
        }
        let read_back = parser::from_xyz(&second[0]).unwrap();
        assert_eq!(read_back.len(), 9 + 2);
    }
}
