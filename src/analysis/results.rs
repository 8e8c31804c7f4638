use crate::core::error::{Result, TsError};
use crate::io::parser;
use glob::{glob, Pattern};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// eV -> kJ/mol.
pub const EV_TO_KJMOL: f64 = 23.06035 * 4.184;

/// Energy from an optimiser log: fourth field of the last line (eV).
pub fn read_out_energy(path: &Path) -> Result<f64> {
    let contents = fs::read_to_string(path)?;
    let last = contents
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| TsError::parse("optimiser log", 0, format!("{:?} is empty", path)))?;
    let token = last
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| TsError::parse("optimiser log", 0, format!("last line of {:?} has no energy field", path)))?;
    token
        .parse()
        .map_err(|_| TsError::parse("optimiser log", 0, format!("'{}' in {:?} is not an energy", token, path)))
}

/// Energies of one reaction, gathered from finished minima and TS runs.
#[derive(Debug, Clone)]
pub struct Results {
    pub minima_dir: PathBuf,
    pub ts_dir: PathBuf,
    pub slab_path: PathBuf,
    pub reactants: Vec<String>,
    pub products: Vec<String>,
}

/// Reaction energy and per-TS barriers in kJ/mol.
#[derive(Debug, Clone)]
pub struct EnergySummary {
    pub title: String,
    pub reaction_energy: f64,
    /// `TS_<prefix>` -> barrier, ordered by prefix.
    pub barriers: BTreeMap<String, f64>,
}

impl Results {
    pub fn new(
        minima_dir: impl Into<PathBuf>,
        ts_dir: impl Into<PathBuf>,
        slab_path: impl Into<PathBuf>,
        reactants: Vec<String>,
        products: Vec<String>,
    ) -> Self {
        Self {
            minima_dir: minima_dir.into(),
            ts_dir: ts_dir.into(),
            slab_path: slab_path.into(),
            reactants,
            products,
        }
    }

    /// `r1+r2 --> p1+p2`
    pub fn rxn_title(&self) -> String {
        format!("{} --> {}", self.reactants.join("+"), self.products.join("+"))
    }

    /// Extra clean slabs needed to balance the two sides.
    pub fn nslabs(&self) -> usize {
        self.products.len().abs_diff(self.reactants.len())
    }

    pub fn slab_energy(&self) -> Result<f64> {
        let slab = parser::from_xyz(&self.slab_path)?;
        slab.energy.ok_or_else(|| {
            TsError::parse("slab structure", 2, format!("{:?} carries no energy", self.slab_path))
        })
    }

    /// Lowest energy among `<minima>/<species>_*out`.
    pub fn lowest_species_energy(&self, species: &str) -> Result<f64> {
        let pattern = format!("{}_*out", species);
        let files = matching_files(&self.minima_dir, &pattern)?;
        let mut lowest: Option<f64> = None;
        for file in &files {
            let e = read_out_energy(file)?;
            lowest = Some(lowest.map_or(e, |l| l.min(e)));
        }
        lowest.ok_or_else(|| TsError::MissingReferenceData {
            species: species.to_string(),
            dir: self.minima_dir.clone(),
        })
    }

    /// `(prefix, energy)` for every `*out` file of the TS directory.
    pub fn ts_energies(&self) -> Result<Vec<(String, f64)>> {
        let mut out = Vec::new();
        for file in matching_files(&self.ts_dir, "*out")? {
            let prefix = file
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.split('_').next())
                .unwrap_or_default()
                .to_string();
            out.push((prefix, read_out_energy(&file)?));
        }
        Ok(out)
    }

    fn side_energies(&self, species: &[String]) -> Result<Vec<f64>> {
        species.iter().map(|s| self.lowest_species_energy(s)).collect()
    }

    pub fn reaction_energy(&self) -> Result<f64> {
        let r = self.side_energies(&self.reactants)?;
        let p = self.side_energies(&self.products)?;
        let slab = if r.len() != p.len() { self.slab_energy()? } else { 0.0 };
        Ok(reaction_energy(&r, &p, slab))
    }

    pub fn barriers(&self) -> Result<BTreeMap<String, f64>> {
        let r = self.side_energies(&self.reactants)?;
        let slab = if self.products.len() < self.reactants.len() { self.slab_energy()? } else { 0.0 };
        let ts = self.ts_energies()?;
        Ok(barriers(&r, self.products.len(), &ts, slab))
    }

    pub fn summary(&self) -> Result<EnergySummary> {
        Ok(EnergySummary {
            title: self.rxn_title(),
            reaction_energy: self.reaction_energy()?,
            barriers: self.barriers()?,
        })
    }
}

/// Reaction energy (kJ/mol) from the lowest reactant and product energies
/// (eV), balancing the side with fewer species with clean slabs.
pub fn reaction_energy(reactants: &[f64], products: &[f64], slab: f64) -> f64 {
    let nslabs = products.len().abs_diff(reactants.len()) as f64;
    let r: f64 = reactants.iter().sum();
    let p: f64 = products.iter().sum();
    let ev = if products.len() > reactants.len() {
        p - slab * nslabs - r
    } else if products.len() < reactants.len() {
        p + slab * nslabs - r
    } else {
        p - r
    };
    ev * EV_TO_KJMOL
}

/// Barrier (kJ/mol) of every TS relative to the separated reactants.
pub fn barriers(reactants: &[f64], product_count: usize, ts: &[(String, f64)], slab: f64) -> BTreeMap<String, f64> {
    let nslabs = product_count.abs_diff(reactants.len()) as f64;
    let r: f64 = reactants.iter().sum();
    ts.iter()
        .map(|(prefix, e)| {
            let ev = if product_count >= reactants.len() {
                e - r
            } else {
                e + slab * nslabs - r
            };
            (format!("TS_{}", prefix), ev * EV_TO_KJMOL)
        })
        .collect()
}

impl EnergySummary {
    /// Plain-text energy table.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "{:<12} {:>12}", "state", "kJ/mol");
        let _ = writeln!(out, "{:<12} {:>12.2}", "reactants", 0.0);
        for (name, barrier) in &self.barriers {
            let _ = writeln!(out, "{:<12} {:>12.2}", name, barrier);
        }
        let _ = writeln!(out, "{:<12} {:>12.2}", "products", self.reaction_energy);
        out
    }
}

fn matching_files(dir: &Path, file_pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TsError::FileSystem(dir.to_path_buf()));
    }
    let dir_str = dir
        .to_str()
        .ok_or_else(|| TsError::InvalidInput(format!("non UTF-8 path {:?}", dir)))?;
    let pattern = format!("{}/{}", Pattern::escape(dir_str), file_pattern);
    let mut files = glob(&pattern)
        .map_err(|e| TsError::InvalidInput(format!("bad glob pattern: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TsError::from(std::io::Error::from(e)))?;
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn out_file(dir: &Path, name: &str, energy: f64) {
        fs::write(dir.join(name), format!("step 0 0.0 -1.0\nSella 12 10:00:00 {} 0.01\n", energy)).unwrap();
    }

    #[test]
    fn test_energy_is_fourth_field_of_last_line() {
        let dir = tempfile::tempdir().unwrap();
        out_file(dir.path(), "OH_00_relax.out", -3.5);
        assert_abs_diff_eq!(read_out_energy(&dir.path().join("OH_00_relax.out")).unwrap(), -3.5);
    }

    #[test]
    fn test_dissociation_energies() {
        // OH -> O + H with one extra slab.
        let e = reaction_energy(&[-10.0], &[-6.0, -5.5], -1.0);
        assert_abs_diff_eq!(e, (-11.5 + 1.0 + 10.0) * EV_TO_KJMOL, epsilon = 1e-9);
        let b = barriers(&[-10.0], 2, &[("000".to_string(), -9.0)], -1.0);
        assert_abs_diff_eq!(b["TS_000"], 1.0 * EV_TO_KJMOL, epsilon = 1e-9);
    }

    #[test]
    fn test_association_balances_with_slab() {
        // O + H -> OH
        let e = reaction_energy(&[-6.0, -5.5], &[-10.0], -1.0);
        assert_abs_diff_eq!(e, (-10.0 - 1.0 + 11.5) * EV_TO_KJMOL, epsilon = 1e-9);
        let b = barriers(&[-6.0, -5.5], 1, &[("001".to_string(), -10.5)], -1.0);
        assert_abs_diff_eq!(b["TS_001"], (-10.5 - 1.0 + 11.5) * EV_TO_KJMOL, epsilon = 1e-9);
    }

    #[test]
    fn test_results_from_directories() {
        let root = tempfile::tempdir().unwrap();
        let minima = root.path().join("minima");
        let ts = root.path().join("TS_estimate_unique");
        fs::create_dir_all(&minima).unwrap();
        fs::create_dir_all(&ts).unwrap();
        out_file(&minima, "OH_00_relax.out", -10.0);
        out_file(&minima, "OH_01_relax.out", -10.2);
        out_file(&minima, "O_00_relax.out", -6.0);
        out_file(&minima, "H_00_relax.out", -5.5);
        out_file(&ts, "000_OH_O+H_ts.out", -9.0);
        let slab = root.path().join("slab.xyz");
        fs::write(&slab, "1\nenergy=-1.0\nCu 0 0 0\n").unwrap();

        let results = Results::new(&minima, &ts, &slab, vec!["OH".into()], vec!["O".into(), "H".into()]);
        assert_eq!(results.rxn_title(), "OH --> O+H");
        assert_eq!(results.nslabs(), 1);
        let summary = results.summary().unwrap();
        assert_abs_diff_eq!(summary.reaction_energy, (-11.5 + 1.0 + 10.2) * EV_TO_KJMOL, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.barriers["TS_000"], 1.2 * EV_TO_KJMOL, epsilon = 1e-9);
        assert!(summary.to_table().contains("TS_000"));
    }

    #[test]
    fn test_missing_species_energy() {
        let root = tempfile::tempdir().unwrap();
        let results = Results::new(root.path(), root.path(), root.path().join("slab.xyz"), vec!["CO".into()], vec![]);
        assert!(matches!(
            results.lowest_species_energy("CO"),
            Err(TsError::MissingReferenceData { .. })
        ));
    }
}
