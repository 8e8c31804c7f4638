use crate::core::error::{Result, TsError};
use crate::math::rotation::{self, Axis};
use nalgebra::{Matrix3, Vector3};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENUMS & SEMANTICS
// ============================================================================

/// Role of an atom inside a candidate or reference structure.
/// Written as an explicit column so downstream stages never have to guess
/// an atom's role from its element symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtomRole {
    /// Read from a file that carried no role column.
    #[default]
    Unassigned,
    /// Metal atom below the exposed layer.
    Slab,
    /// Metal atom in the exposed layer (adsorption sites sit on these).
    Surface,
    /// Atom belonging to the placed fragment.
    Adsorbate,
}

impl AtomRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomRole::Unassigned => "unassigned",
            AtomRole::Slab => "slab",
            AtomRole::Surface => "surface",
            AtomRole::Adsorbate => "adsorbate",
        }
    }

    pub fn is_metal(&self) -> bool {
        matches!(self, AtomRole::Slab | AtomRole::Surface)
    }
}

impl fmt::Display for AtomRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AtomRole {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unassigned" => Ok(AtomRole::Unassigned),
            "slab" => Ok(AtomRole::Slab),
            "surface" => Ok(AtomRole::Surface),
            "adsorbate" => Ok(AtomRole::Adsorbate),
            other => Err(TsError::parse("atom role", 0, format!("unknown role '{}'", other))),
        }
    }
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    /// Cell vectors stored as columns.
    pub matrix: Matrix3<f64>,
    pub reciprocal_matrix: Matrix3<f64>,
}

impl Lattice {
    pub fn new(matrix: Matrix3<f64>) -> std::result::Result<Self, &'static str> {
        if matrix.determinant().abs() < 1e-6 {
            return Err("Lattice has zero or near-zero volume.");
        }
        let reciprocal_matrix = matrix
            .try_inverse()
            .ok_or("Lattice is not invertible.")?
            .transpose();
        Ok(Self {
            matrix,
            reciprocal_matrix,
        })
    }

    pub fn from_vectors(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> std::result::Result<Self, &'static str> {
        Self::new(Matrix3::from_columns(&[a, b, c]))
    }

    pub fn vector(&self, i: usize) -> Vector3<f64> {
        self.matrix.column(i).into_owned()
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> { self.matrix * frac }
    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> { self.reciprocal_matrix.transpose() * cart }

    /// Unit vector normal to the a/b plane, oriented along +c.
    pub fn surface_normal(&self) -> Vector3<f64> {
        let n = self.vector(0).cross(&self.vector(1)).normalize();
        if n.dot(&self.vector(2)) < 0.0 { -n } else { n }
    }

    /// Lattice scaled by an integer supercell along each vector.
    pub fn repeated(&self, repeats: [usize; 3]) -> Self {
        let mut matrix = self.matrix;
        for (i, &n) in repeats.iter().enumerate() {
            let scaled = matrix.column(i) * n as f64;
            matrix.set_column(i, &scaled);
        }
        let reciprocal_matrix = matrix
            .try_inverse()
            .map(|m| m.transpose())
            .unwrap_or(self.reciprocal_matrix);
        Self { matrix, reciprocal_matrix }
    }

    pub fn get_shortest_distance_vector(&self, f1: &Vector3<f64>, f2: &Vector3<f64>) -> Vector3<f64> {
        let mut d = f2 - f1;
        d.x -= d.x.round();
        d.y -= d.y.round();
        d.z -= d.z.round();
        self.to_cartesian(&d)
    }

    pub fn approx_eq(&self, other: &Lattice, tolerance: f64) -> bool {
        (self.matrix - other.matrix).abs().max() < tolerance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: String,
    /// Cartesian position in Å.
    pub position: Vector3<f64>,
    pub tag: i32,
    pub role: AtomRole,
}

impl Atom {
    pub fn new(element: impl Into<String>, position: Vector3<f64>) -> Self {
        Self {
            element: element.into(),
            position,
            tag: 0,
            role: AtomRole::Unassigned,
        }
    }

    pub fn with_role(mut self, role: AtomRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_tag(mut self, tag: i32) -> Self {
        self.tag = tag;
        self
    }
}

/// A periodic (or, without a lattice, isolated) atomic structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub lattice: Option<Lattice>,
    pub pbc: [bool; 3],
    pub atoms: Vec<Atom>,
    /// Total energy in eV, when the file carried one.
    pub energy: Option<f64>,
}

impl Structure {
    pub fn new(lattice: Option<Lattice>, atoms: Vec<Atom>) -> Self {
        let pbc = if lattice.is_some() { [true; 3] } else { [false; 3] };
        Self {
            lattice,
            pbc,
            atoms,
            energy: None,
        }
    }

    pub fn len(&self) -> usize { self.atoms.len() }
    pub fn is_empty(&self) -> bool { self.atoms.is_empty() }

    /// Replicates the structure `repeats` times along the cell vectors.
    /// Image blocks are laid out with the last vector varying fastest.
    pub fn repeat(&self, repeats: [usize; 3]) -> Result<Structure> {
        let lattice = self.lattice.as_ref().ok_or_else(|| {
            TsError::InvalidInput("cannot repeat a structure without a lattice".to_string())
        })?;
        if repeats.iter().any(|&n| n == 0) {
            return Err(TsError::InvalidInput(format!("invalid repeat factor {:?}", repeats)));
        }

        let mut atoms = Vec::with_capacity(self.atoms.len() * repeats.iter().product::<usize>());
        for m0 in 0..repeats[0] {
            for m1 in 0..repeats[1] {
                for m2 in 0..repeats[2] {
                    let shift = lattice.to_cartesian(&Vector3::new(m0 as f64, m1 as f64, m2 as f64));
                    atoms.extend(self.atoms.iter().map(|a| Atom {
                        position: a.position + shift,
                        ..a.clone()
                    }));
                }
            }
        }

        Ok(Structure {
            lattice: Some(lattice.repeated(repeats)),
            pbc: self.pbc,
            atoms,
            energy: None,
        })
    }

    pub fn distance(&self, i: usize, j: usize) -> f64 {
        (self.atoms[j].position - self.atoms[i].position).norm()
    }

    /// Element -> count, ordered by symbol.
    pub fn composition(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// An isolated fragment geometry that the placer reorients before it is
/// attached to the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    pub fn len(&self) -> usize { self.atoms.len() }
    pub fn is_empty(&self) -> bool { self.atoms.is_empty() }

    pub fn tags(&self) -> Vec<i32> {
        self.atoms.iter().map(|a| a.tag).collect()
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.atoms.len() {
            return Err(TsError::UnknownSpecies(format!(
                "atom index {} out of range for a {}-atom fragment",
                i,
                self.atoms.len()
            )));
        }
        Ok(())
    }

    pub fn distance(&self, a0: usize, a1: usize) -> Result<f64> {
        self.check_index(a0)?;
        self.check_index(a1)?;
        Ok((self.atoms[a1].position - self.atoms[a0].position).norm())
    }

    /// Rigid rotation by `angle` degrees about `axis` through the origin.
    pub fn rotate(&mut self, angle: f64, axis: Axis) {
        let rot = rotation::rotation_about(angle, &axis.unit());
        for atom in &mut self.atoms {
            atom.position = rot * atom.position;
        }
    }

    /// Moves atoms so that `|r(a1) - r(a0)| == distance`.
    ///
    /// `fix = 0.0` keeps `a0` in place and shifts every other atom of
    /// `indices` along the bond; `fix = 1.0` moves only `a0`. When `indices`
    /// is `None` only the two bond atoms take part.
    pub fn set_distance(&mut self, a0: usize, a1: usize, distance: f64, fix: f64, indices: Option<&[usize]>) -> Result<()> {
        self.check_index(a0)?;
        self.check_index(a1)?;
        let default_indices = [a0, a1];
        let indices = indices.unwrap_or(&default_indices);
        for &i in indices {
            self.check_index(i)?;
        }

        let d = self.atoms[a1].position - self.atoms[a0].position;
        let length = d.norm();
        if length < 1e-12 {
            return Err(TsError::InvalidInput(format!("atoms {} and {} coincide", a0, a1)));
        }
        let x = 1.0 - distance / length;
        for &i in indices {
            if i == a0 {
                self.atoms[a0].position += d * (x * fix);
            } else {
                self.atoms[i].position -= d * (x * (1.0 - fix));
            }
        }
        Ok(())
    }

    /// Rotates `indices` by `delta` degrees about the normal of the
    /// `a1-a2-a3` plane passing through `a2`.
    pub fn adjust_angle(&mut self, a1: usize, a2: usize, a3: usize, delta: f64, indices: &[usize]) -> Result<()> {
        for &i in [a1, a2, a3].iter().chain(indices) {
            self.check_index(i)?;
        }
        let center = self.atoms[a2].position;
        let v10 = self.atoms[a1].position - center;
        let v12 = self.atoms[a3].position - center;
        let axis = rotation::plane_normal(&v10, &v12);
        let rot = rotation::rotation_about(delta, &axis);
        for &i in indices {
            self.atoms[i].position = center + rot * (self.atoms[i].position - center);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cubic(a: f64) -> Lattice {
        Lattice::new(Matrix3::from_diagonal_element(a)).unwrap()
    }

    #[test]
    fn test_repeat_orders_images_and_scales_cell() {
        let s = Structure::new(
            Some(cubic(2.0)),
            vec![Atom::new("Cu", Vector3::zeros()), Atom::new("Cu", Vector3::new(1.0, 1.0, 0.0))],
        );
        let big = s.repeat([2, 1, 2]).unwrap();
        assert_eq!(big.len(), 8);
        // Third vector varies fastest.
        assert_abs_diff_eq!(big.atoms[2].position.z, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(big.atoms[4].position.x, 2.0, epsilon = 1e-12);
        let lattice = big.lattice.unwrap();
        assert_abs_diff_eq!(lattice.vector(0).x, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lattice.vector(1).y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_repeat_requires_lattice() {
        let s = Structure::new(None, vec![Atom::new("O", Vector3::zeros())]);
        assert!(s.repeat([2, 2, 1]).is_err());
    }

    #[test]
    fn test_set_distance_keeps_first_atom_fixed() {
        let mut m = Molecule::new(vec![
            Atom::new("O", Vector3::zeros()),
            Atom::new("H", Vector3::new(1.0, 0.0, 0.0)),
        ]);
        m.set_distance(0, 1, 1.5, 0.0, None).unwrap();
        assert_abs_diff_eq!(m.atoms[0].position.norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[1].position.x, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_set_distance_with_fix_one_moves_only_first_atom() {
        let mut m = Molecule::new(vec![
            Atom::new("C", Vector3::zeros()),
            Atom::new("O", Vector3::new(2.0, 0.0, 0.0)),
            Atom::new("H", Vector3::new(0.0, 1.0, 0.0)),
        ]);
        m.set_distance(0, 1, 3.0, 1.0, Some(&[0, 2])).unwrap();
        assert_abs_diff_eq!(m.atoms[0].position.x, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[1].position.x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[2].position.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_index_is_unknown_species() {
        let m = Molecule::new(vec![Atom::new("O", Vector3::zeros())]);
        assert!(matches!(m.distance(0, 1), Err(TsError::UnknownSpecies(_))));
    }

    #[test]
    fn test_role_round_trip() {
        for role in [AtomRole::Slab, AtomRole::Surface, AtomRole::Adsorbate, AtomRole::Unassigned] {
            assert_eq!(role.as_str().parse::<AtomRole>().unwrap(), role);
        }
        assert!("metal".parse::<AtomRole>().is_err());
    }
}
