use crate::analysis::symmetry::candidate_files;
use crate::chemistry::tagging::RoleTagger;
use crate::core::error::{Result, TsError};
use crate::io::{parser, writer};
use crate::jobs::template::{py_float, py_float_tuple, py_int_tuple, py_pair_list, JobTemplate};
use crate::jobs::ts_jobs::relaxed_file_name;
use crate::synthesis::placer::CandidateName;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A species whose adsorbate-surface distance is restrained in every job.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSpecies {
    pub symbol: String,
    /// Multiply the reference distance by `scfactor_surface`.
    pub scaled: bool,
}

impl TrackedSpecies {
    pub fn new(symbol: impl Into<String>, scaled: bool) -> Self {
        Self { symbol: symbol.into(), scaled }
    }
}

#[derive(Debug, Clone)]
pub struct PenaltyConfig {
    pub scfactor_surface: f64,
    pub repeats: [usize; 3],
    /// Path of the optimised slab, passed through to the job script.
    pub slabopt: String,
}

/// Bias between one fragment atom and its nearest surface atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Restraint {
    pub adsorbate_index: usize,
    pub surface_index: usize,
    pub target_distance: f64,
}

/// Files written for one candidate.
#[derive(Debug, Clone)]
pub struct EmittedJob {
    pub name: CandidateName,
    pub script: PathBuf,
    pub preview: PathBuf,
    pub geometry: PathBuf,
    pub restraints: Vec<Restraint>,
}

/// Writes `<stem>_final.xyz` with the last frame of every multi-frame
/// `.xyz` trajectory in `species_dir`. Returns how many were written.
pub fn extract_final_geometries(species_dir: &Path) -> Result<usize> {
    let mut entries: Vec<PathBuf> = fs::read_dir(species_dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    let mut written = 0;
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".xyz") else {
            continue;
        };
        if stem.ends_with("_final") {
            continue;
        }
        let mut frames = parser::read_xyz_frames(&path)?;
        if frames.len() < 2 {
            continue;
        }
        if let Some(last) = frames.pop() {
            writer::to_xyz(&last, &species_dir.join(format!("{}_final.xyz", stem)))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Mean shortest adsorbate-surface distance over the `*_final.xyz`
/// reference minima of `species` under `minima_dir/<symbol>`.
pub fn average_distance(
    minima_dir: &Path,
    species: &TrackedSpecies,
    tagger: &RoleTagger,
    scfactor_surface: f64,
) -> Result<f64> {
    let dir = minima_dir.join(&species.symbol);
    let missing = || TsError::MissingReferenceData {
        species: species.symbol.clone(),
        dir: dir.clone(),
    };
    if !dir.is_dir() {
        return Err(missing());
    }
    extract_final_geometries(&dir)?;

    let mut finals: Vec<PathBuf> = fs::read_dir(&dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    finals.retain(|p| p.to_str().map_or(false, |s| s.ends_with("_final.xyz")));
    finals.sort();

    let mut distances = Vec::with_capacity(finals.len());
    for path in &finals {
        let structure = parser::from_xyz(path)?;
        distances.push(tagger.bond_distance(&species.symbol, &structure)?);
    }
    if distances.is_empty() {
        return Err(missing());
    }

    let mean = distances.iter().sum::<f64>() / distances.len() as f64;
    debug!("{}: mean surface distance {:.3} over {} minima", species.symbol, mean, distances.len());
    Ok(if species.scaled { mean * scfactor_surface } else { mean })
}

/// Turns every candidate of a TS directory into a restrained job.
pub struct PenaltyJobEmitter {
    template: JobTemplate,
    config: PenaltyConfig,
    tagger: RoleTagger,
    species: Vec<TrackedSpecies>,
}

impl PenaltyJobEmitter {
    pub fn new(template: JobTemplate, config: PenaltyConfig, tagger: RoleTagger, species: Vec<TrackedSpecies>) -> Result<Self> {
        if species.len() != 2 {
            return Err(TsError::InvalidInput(format!(
                "penalty jobs restrain exactly two species, got {}",
                species.len()
            )));
        }
        Ok(Self { template, config, tagger, species })
    }

    /// Reference distances for the tracked species, read from the
    /// `minima` directory next to `ts_dir`.
    pub fn reference_distances(&self, ts_dir: &Path) -> Result<Vec<f64>> {
        let facet = ts_dir
            .parent()
            .ok_or_else(|| TsError::InvalidInput(format!("{:?} has no parent directory", ts_dir)))?;
        let minima_dir = facet.join("minima");
        self.species
            .iter()
            .map(|s| average_distance(&minima_dir, s, &self.tagger, self.config.scfactor_surface))
            .collect()
    }

    /// Writes `<ts_dir>/<prefix>/<stem>.py` and `<stem>_initial.svg` for
    /// every candidate and moves the geometry next to them.
    pub fn emit(&self, ts_dir: &Path) -> Result<Vec<EmittedJob>> {
        let distances = self.reference_distances(ts_dir)?;
        let mut jobs = Vec::new();

        for (name, path) in candidate_files(ts_dir)? {
            let structure = parser::from_xyz(&path)?;
            let mut restraints = Vec::with_capacity(self.species.len());
            for (species, &target) in self.species.iter().zip(&distances) {
                restraints.push(Restraint {
                    adsorbate_index: self.tagger.adsorbate_index(&species.symbol, &structure)?,
                    surface_index: self.tagger.nearest_surface_index(&species.symbol, &structure)?,
                    target_distance: target,
                });
            }

            let calc_dir = ts_dir.join(name.prefix());
            fs::create_dir_all(&calc_dir)?;
            let stem = name.stem();

            let script = calc_dir.join(format!("{}.py", stem));
            fs::write(&script, self.render(&name, &restraints)?)?;
            let preview = calc_dir.join(format!("{}_initial.svg", stem));
            writer::write_preview(&structure, &preview)?;
            let geometry = calc_dir.join(name.file_name());
            fs::rename(&path, &geometry)?;

            jobs.push(EmittedJob { name, script, preview, geometry, restraints });
        }
        info!("Prepared {} penalty jobs in {:?}", jobs.len(), ts_dir);
        Ok(jobs)
    }

    fn render(&self, name: &CandidateName, restraints: &[Restraint]) -> Result<String> {
        let bonds: Vec<(usize, usize)> = restraints.iter().map(|r| (r.adsorbate_index, r.surface_index)).collect();
        let targets: Vec<f64> = restraints.iter().map(|r| r.target_distance).collect();

        let mut values: BTreeMap<&str, String> = BTreeMap::new();
        values.insert("geom", name.file_name());
        values.insert("bonds", py_pair_list(&bonds));
        values.insert("avDists", py_float_tuple(&targets));
        values.insert("trajPath", format!("{}.traj", name.stem()));
        values.insert("relaxedPath", relaxed_file_name(name));
        values.insert("repeats", py_int_tuple(&self.config.repeats));
        values.insert("prefix", name.prefix());
        values.insert("geomName", name.stem());
        values.insert("slabopt", self.config.slabopt.clone());
        values.insert("scfactor_surface", py_float(self.config.scfactor_surface));
        self.template.render(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Atom, AtomRole, Lattice, Structure};
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn minimum(z: f64, element: &str) -> Structure {
        Structure::new(
            None,
            vec![
                Atom::new("Cu", Vector3::new(0.0, 0.0, 0.0)),
                Atom::new("Cu", Vector3::new(2.5, 0.0, 0.0)),
                Atom::new(element, Vector3::new(0.0, 0.0, z)),
            ],
        )
    }

    fn write_minima(minima: &Path, species: &str, element: &str, heights: &[f64]) {
        let dir = minima.join(species);
        fs::create_dir_all(&dir).unwrap();
        for (i, z) in heights.iter().enumerate() {
            writer::to_xyz(&minimum(*z, element), &dir.join(format!("{:02}_final.xyz", i))).unwrap();
        }
    }

    #[test]
    fn test_last_trajectory_frame_becomes_final() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!("{}{}", writer::format_xyz(&minimum(2.5, "O")), writer::format_xyz(&minimum(1.9, "O")));
        fs::write(dir.path().join("00.xyz"), text).unwrap();
        fs::write(dir.path().join("01.xyz"), writer::format_xyz(&minimum(2.0, "O"))).unwrap();

        assert_eq!(extract_final_geometries(dir.path()).unwrap(), 1);
        let last = parser::from_xyz(&dir.path().join("00_final.xyz")).unwrap();
        assert_abs_diff_eq!(last.atoms[2].position.z, 1.9, epsilon = 1e-9);
        assert!(!dir.path().join("01_final.xyz").exists());
    }

    #[test]
    fn test_average_distance_and_scaling() {
        let dir = tempfile::tempdir().unwrap();
        write_minima(dir.path(), "CH3O", "O", &[1.9, 2.1]);
        let tagger = RoleTagger::default();

        let plain = average_distance(dir.path(), &TrackedSpecies::new("CH3O", false), &tagger, 1.5).unwrap();
        assert_abs_diff_eq!(plain, 2.0, epsilon = 1e-9);
        let scaled = average_distance(dir.path(), &TrackedSpecies::new("CH3O", true), &tagger, 1.5).unwrap();
        assert_abs_diff_eq!(scaled, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_reference_minima() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("H")).unwrap();
        let err = average_distance(dir.path(), &TrackedSpecies::new("H", false), &RoleTagger::default(), 1.0).unwrap_err();
        assert!(matches!(err, TsError::MissingReferenceData { .. }));
    }

    #[test]
    fn test_exactly_two_species() {
        let template = JobTemplate::parse("{geom}").unwrap();
        let config = PenaltyConfig { scfactor_surface: 1.0, repeats: [3, 3, 1], slabopt: "slab.xyz".into() };
        let result = PenaltyJobEmitter::new(template, config, RoleTagger::default(), vec![TrackedSpecies::new("O", false)]);
        assert!(matches!(result, Err(TsError::InvalidInput(_))));
    }

    #[test]
    fn test_emit_writes_job_and_moves_geometry() {
        let facet = tempfile::tempdir().unwrap();
        let minima = facet.path().join("minima");
        write_minima(&minima, "O", "O", &[1.2]);
        write_minima(&minima, "H", "H", &[1.0, 1.1]);

        let ts_dir = facet.path().join("TS_estimate");
        fs::create_dir_all(&ts_dir).unwrap();
        let lattice = Lattice::from_vectors(
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(0.0, 5.0, 0.0),
            Vector3::new(0.0, 0.0, 15.0),
        )
        .unwrap();
        let candidate = Structure::new(
            Some(lattice),
            vec![
                Atom::new("Cu", Vector3::new(0.0, 0.0, 5.0)).with_role(AtomRole::Surface),
                Atom::new("Cu", Vector3::new(2.5, 0.0, 5.0)).with_role(AtomRole::Surface),
                Atom::new("O", Vector3::new(2.4, 0.0, 7.0)).with_role(AtomRole::Adsorbate),
                Atom::new("H", Vector3::new(0.3, 0.0, 7.0)).with_role(AtomRole::Adsorbate),
            ],
        );
        let name = CandidateName::new(0, "OH_O+H");
        writer::to_xyz(&candidate, &ts_dir.join(name.file_name())).unwrap();

        let template = JobTemplate::parse(
            "geom = '{geom}'\nbonds = {bonds}\navdists = {avDists}\ntraj = '{trajPath}'\nrepeats = {repeats}\nprefix = '{prefix}'\nname = '{geomName}'\nslab = '{slabopt}'\n",
        )
        .unwrap();
        let config = PenaltyConfig { scfactor_surface: 1.0, repeats: [3, 3, 1], slabopt: "Cu_111_slab_opt.xyz".into() };
        let emitter = PenaltyJobEmitter::new(
            template,
            config,
            RoleTagger::default(),
            vec![TrackedSpecies::new("O", false), TrackedSpecies::new("H", false)],
        )
        .unwrap();

        let jobs = emitter.emit(&ts_dir).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.restraints[0].adsorbate_index, 2);
        assert_eq!(job.restraints[0].surface_index, 1);
        assert_eq!(job.restraints[1].adsorbate_index, 3);
        assert_eq!(job.restraints[1].surface_index, 0);

        let script = fs::read_to_string(ts_dir.join("000").join("000_OH_O+H.py")).unwrap();
        assert!(script.contains("bonds = [(2, 1), (3, 0)]"));
        assert!(script.contains("avdists = (1.2, 1.05)"));
        assert!(script.contains("traj = '000_OH_O+H.traj'"));
        assert!(script.contains("repeats = (3, 3, 1)"));
        assert!(script.contains("prefix = '000'"));
        assert!(ts_dir.join("000").join("000_OH_O+H_initial.svg").exists());
        assert!(ts_dir.join("000").join("000_OH_O+H.xyz").exists());
        assert!(!ts_dir.join("000_OH_O+H.xyz").exists());
    }
}
