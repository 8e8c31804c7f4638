use crate::core::error::{Result, TsError};
use crate::core::structure::{Atom, AtomRole, Structure};

/// Default metal when a file carries no role column.
pub const DEFAULT_SURFACE_SYMBOL: &str = "Cu";

/// Element that represents `species` when measuring adsorbate-surface
/// distances: oxygen for the methoxy/formaldehyde pair, otherwise the
/// leading character of the name.
pub fn tracked_element(species: &str) -> &str {
    match species {
        "CH3O" | "CH2O" => "O",
        _ => species.get(..1).unwrap_or(species),
    }
}

/// Assigns adsorbate and metal roles to the atoms of a placed structure
/// and answers index queries over them.
#[derive(Debug, Clone)]
pub struct RoleTagger {
    surface_symbol: String,
}

impl Default for RoleTagger {
    fn default() -> Self {
        Self::new(DEFAULT_SURFACE_SYMBOL)
    }
}

impl RoleTagger {
    pub fn new(surface_symbol: impl Into<String>) -> Self {
        Self { surface_symbol: surface_symbol.into() }
    }

    pub fn surface_symbol(&self) -> &str {
        &self.surface_symbol
    }

    /// Metal when the role column says so; files without roles fall back
    /// to matching the surface element.
    pub fn is_metal(&self, atom: &Atom) -> bool {
        match atom.role {
            AtomRole::Unassigned => atom.element == self.surface_symbol,
            role => role.is_metal(),
        }
    }

    pub fn metal_indices(&self, structure: &Structure) -> Vec<usize> {
        structure
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| self.is_metal(a))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the first non-metal atom whose element is the one tracked
    /// for `species`.
    pub fn adsorbate_index(&self, species: &str, structure: &Structure) -> Result<usize> {
        let element = tracked_element(species);
        structure
            .atoms
            .iter()
            .position(|a| !self.is_metal(a) && a.element == element)
            .ok_or_else(|| TsError::UnknownSpecies(format!("no {} atom for species {}", element, species)))
    }

    /// Index of the metal atom nearest to the tracked adsorbate atom. Ties
    /// go to the lowest index.
    pub fn nearest_surface_index(&self, species: &str, structure: &Structure) -> Result<usize> {
        let (index, _) = self.nearest_metal(species, structure)?;
        Ok(index)
    }

    /// Shortest distance between the tracked adsorbate atom and any metal atom.
    pub fn bond_distance(&self, species: &str, structure: &Structure) -> Result<f64> {
        let (_, distance) = self.nearest_metal(species, structure)?;
        Ok(distance)
    }

    fn nearest_metal(&self, species: &str, structure: &Structure) -> Result<(usize, f64)> {
        let ads = self.adsorbate_index(species, structure)?;
        let mut best: Option<(usize, f64)> = None;
        for idx in self.metal_indices(structure) {
            let d = structure.distance(ads, idx);
            if best.map_or(true, |(_, min)| d < min) {
                best = Some((idx, d));
            }
        }
        best.ok_or_else(|| {
            TsError::InvalidInput(format!("no {} surface atoms to bind {} to", self.surface_symbol, species))
        })
    }
}
