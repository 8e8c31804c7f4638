use crate::core::elements::covalent_radius;
use crate::core::error::{Result, TsError};
use crate::core::structure::{Atom, AtomRole, Lattice, Molecule, Structure};
use log::debug;
use nalgebra::Vector3;

// --- STRICT TYPE DEFINITIONS FOR CLARITY ---
type Cartesian3 = Vector3<f64>;

/// Atoms within this height of the outermost metal atom form the exposed layer.
const SURFACE_LAYER_TOLERANCE: f64 = 0.5;
/// Neighbour shell cutoff relative to the nearest surface-surface distance.
const NEIGHBOUR_SHELL: f64 = 1.15;
/// Sites closer than this (Å, minimum image) are the same site.
const SITE_MERGE_TOLERANCE: f64 = 0.2;
/// Lowest anchor height above a site (Å).
const MIN_ANCHOR_HEIGHT: f64 = 0.8;

/// Produces one adsorbed structure per adsorption site for a fragment.
///
/// Each returned structure is the unit-cell slab (same atom order) followed
/// by the fragment atoms, so `structure.atoms[slab_len..]` is the fragment.
pub trait SiteBuilder {
    fn place(&self, fragment: &Molecule, bonded_through: usize) -> Result<Vec<Structure>>;

    /// The unit-cell slab the placements are built on.
    fn slab(&self) -> &Structure;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Top,
    Bridge,
    Hollow,
}

#[derive(Debug, Clone)]
pub struct AdsorptionSite {
    pub kind: SiteKind,
    /// Centroid of the coordinating surface atoms, wrapped into the home cell.
    pub position: Cartesian3,
    /// Distance from `position` to the coordinating atoms.
    pub radius: f64,
    /// Element of the coordinating atoms (first one when mixed).
    pub metal: String,
}

/// Marks the exposed layer of a slab as [`AtomRole::Surface`] and every
/// other atom as [`AtomRole::Slab`]. A slab that already names surface
/// atoms is left untouched.
pub fn assign_slab_roles(slab: &mut Structure) {
    if slab.atoms.iter().any(|a| a.role == AtomRole::Surface) {
        return;
    }
    let normal = surface_normal(slab);
    let top = slab
        .atoms
        .iter()
        .map(|a| a.position.dot(&normal))
        .fold(f64::NEG_INFINITY, f64::max);
    for atom in &mut slab.atoms {
        atom.role = if top - atom.position.dot(&normal) < SURFACE_LAYER_TOLERANCE {
            AtomRole::Surface
        } else {
            AtomRole::Slab
        };
    }
}

fn surface_normal(slab: &Structure) -> Cartesian3 {
    slab.lattice
        .as_ref()
        .map(Lattice::surface_normal)
        .unwrap_or_else(Vector3::z)
}

/// Top, bridge and hollow sites of the exposed layer, each translationally
/// distinct within the cell.
pub struct AdsorptionSiteBuilder {
    slab: Structure,
    sites: Vec<AdsorptionSite>,
}

impl AdsorptionSiteBuilder {
    pub fn new(mut slab: Structure) -> Result<Self> {
        let lattice = slab
            .lattice
            .clone()
            .ok_or_else(|| TsError::InvalidInput("slab has no lattice".to_string()))?;
        if slab.is_empty() {
            return Err(TsError::InvalidInput("slab has no atoms".to_string()));
        }
        assign_slab_roles(&mut slab);
        let sites = Self::find_sites(&slab, &lattice);
        debug!(
            "Found {} adsorption sites ({} top, {} bridge, {} hollow)",
            sites.len(),
            sites.iter().filter(|s| s.kind == SiteKind::Top).count(),
            sites.iter().filter(|s| s.kind == SiteKind::Bridge).count(),
            sites.iter().filter(|s| s.kind == SiteKind::Hollow).count()
        );
        Ok(Self { slab, sites })
    }

    pub fn sites(&self) -> &[AdsorptionSite] {
        &self.sites
    }

    fn find_sites(slab: &Structure, lattice: &Lattice) -> Vec<AdsorptionSite> {
        let (a, b) = (lattice.vector(0), lattice.vector(1));
        let home: Vec<&Atom> = slab.atoms.iter().filter(|x| x.role == AtomRole::Surface).collect();

        // In-plane images of the exposed layer around the home cell.
        let mut images: Vec<(Cartesian3, &str)> = Vec::with_capacity(home.len() * 9);
        for i in -1..=1 {
            for j in -1..=1 {
                let shift = a * i as f64 + b * j as f64;
                images.extend(home.iter().map(|x| (x.position + shift, x.element.as_str())));
            }
        }

        let nearest = home
            .iter()
            .flat_map(|h| images.iter().map(move |(p, _)| (p - h.position).norm()))
            .filter(|d| *d > 1e-6)
            .fold(f64::INFINITY, f64::min);
        let cutoff = nearest * NEIGHBOUR_SHELL;
        let bonded = |p: &Cartesian3, q: &Cartesian3| {
            let d = (p - q).norm();
            d > 1e-6 && d <= cutoff
        };

        let mut sites: Vec<AdsorptionSite> = Vec::new();
        let mut push = |kind: SiteKind, members: &[Cartesian3], metal: &str| {
            let centroid = members.iter().sum::<Cartesian3>() / members.len() as f64;
            let radius = members.iter().map(|m| (m - centroid).norm()).sum::<f64>() / members.len() as f64;
            let position = wrap_in_plane(lattice, &centroid);
            let duplicate = sites.iter().any(|s| {
                s.kind == kind && {
                    let f1 = lattice.to_fractional(&s.position);
                    let f2 = lattice.to_fractional(&position);
                    lattice.get_shortest_distance_vector(&f1, &f2).norm() < SITE_MERGE_TOLERANCE
                }
            });
            if !duplicate {
                sites.push(AdsorptionSite {
                    kind,
                    position,
                    radius,
                    metal: metal.to_string(),
                });
            }
        };

        for h in &home {
            push(SiteKind::Top, &[h.position], &h.element);
        }
        if nearest.is_finite() {
            for h in &home {
                for (p, _) in images.iter().filter(|(p, _)| bonded(&h.position, p)) {
                    push(SiteKind::Bridge, &[h.position, *p], &h.element);
                }
            }
            for h in &home {
                let shell: Vec<Cartesian3> = images
                    .iter()
                    .filter(|(p, _)| bonded(&h.position, p))
                    .map(|(p, _)| *p)
                    .collect();
                for (k, p) in shell.iter().enumerate() {
                    for q in shell.iter().skip(k + 1).filter(|q| bonded(p, q)) {
                        push(SiteKind::Hollow, &[h.position, *p, *q], &h.element);
                    }
                }
            }
        }

        // Stable order: all top sites, then bridges, then hollows.
        sites.sort_by_key(|s| match s.kind {
            SiteKind::Top => 0,
            SiteKind::Bridge => 1,
            SiteKind::Hollow => 2,
        });
        sites
    }

    /// Height of the anchor atom above a site so that its distance to each
    /// coordinating metal atom equals the covalent-radius sum.
    fn anchor_height(site: &AdsorptionSite, anchor_element: &str) -> Result<f64> {
        let r_metal = covalent_radius(&site.metal).ok_or_else(|| TsError::UnknownSpecies(site.metal.clone()))?;
        let r_anchor = covalent_radius(anchor_element).ok_or_else(|| TsError::UnknownSpecies(anchor_element.to_string()))?;
        let bond = r_metal + r_anchor;
        Ok((bond * bond - site.radius * site.radius).max(0.0).sqrt().max(MIN_ANCHOR_HEIGHT))
    }
}

impl SiteBuilder for AdsorptionSiteBuilder {
    fn place(&self, fragment: &Molecule, bonded_through: usize) -> Result<Vec<Structure>> {
        let anchor = fragment.atoms.get(bonded_through).ok_or_else(|| {
            TsError::UnknownSpecies(format!(
                "bonding atom {} out of range for a {}-atom fragment",
                bonded_through,
                fragment.len()
            ))
        })?;
        let normal = surface_normal(&self.slab);

        let mut placements = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            let height = Self::anchor_height(site, &anchor.element)?;
            let target = site.position + normal * height;
            let shift = target - anchor.position;

            let mut atoms = self.slab.atoms.clone();
            atoms.extend(fragment.atoms.iter().map(|x| Atom {
                position: x.position + shift,
                role: AtomRole::Adsorbate,
                ..x.clone()
            }));
            placements.push(Structure {
                lattice: self.slab.lattice.clone(),
                pbc: self.slab.pbc,
                atoms,
                energy: None,
            });
        }
        Ok(placements)
    }

    fn slab(&self) -> &Structure {
        &self.slab
    }
}

/// Brings a point into the home cell along the two in-plane vectors.
fn wrap_in_plane(lattice: &Lattice, p: &Cartesian3) -> Cartesian3 {
    let mut f = lattice.to_fractional(p);
    for k in 0..2 {
        f[k] -= f[k].floor();
        if f[k] > 1.0 - 1e-9 {
            f[k] = 0.0;
        }
    }
    lattice.to_cartesian(&f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Single-layer hexagonal close packed surface with one atom per cell.
    fn hexagonal(a: f64) -> Structure {
        let lattice = Lattice::from_vectors(
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(-a / 2.0, a * 3f64.sqrt() / 2.0, 0.0),
            Vector3::new(0.0, 0.0, 20.0),
        )
        .unwrap();
        let mut s = Structure::new(Some(lattice), vec![Atom::new("Cu", Vector3::new(0.0, 0.0, 10.0))]);
        s.pbc = [true, true, false];
        s
    }

    fn two_layer_square(a: f64) -> Structure {
        let lattice = Lattice::from_vectors(
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(0.0, a, 0.0),
            Vector3::new(0.0, 0.0, 20.0),
        )
        .unwrap();
        Structure::new(
            Some(lattice),
            vec![
                Atom::new("Cu", Vector3::new(a / 2.0, a / 2.0, 8.2)),
                Atom::new("Cu", Vector3::new(0.0, 0.0, 10.0)),
            ],
        )
    }

    #[test]
    fn test_top_layer_becomes_surface() {
        let mut slab = two_layer_square(2.55);
        assign_slab_roles(&mut slab);
        assert_eq!(slab.atoms[0].role, AtomRole::Slab);
        assert_eq!(slab.atoms[1].role, AtomRole::Surface);
    }

    #[test]
    fn test_hexagonal_surface_sites() {
        let builder = AdsorptionSiteBuilder::new(hexagonal(2.55)).unwrap();
        let kinds: Vec<SiteKind> = builder.sites().iter().map(|s| s.kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == SiteKind::Top).count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == SiteKind::Bridge).count(), 3);
        assert_eq!(kinds.iter().filter(|k| **k == SiteKind::Hollow).count(), 2);
        assert_eq!(kinds[0], SiteKind::Top);
    }

    #[test]
    fn test_square_surface_sites() {
        let builder = AdsorptionSiteBuilder::new(two_layer_square(2.55)).unwrap();
        let kinds: Vec<SiteKind> = builder.sites().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SiteKind::Top, SiteKind::Bridge, SiteKind::Bridge]);
    }

    #[test]
    fn test_placement_keeps_slab_prefix_and_bond_length() {
        let builder = AdsorptionSiteBuilder::new(hexagonal(2.55)).unwrap();
        let fragment = Molecule::new(vec![
            Atom::new("O", Vector3::new(5.0, 5.0, 5.0)),
            Atom::new("H", Vector3::new(5.0, 5.0, 6.0)),
        ]);
        let placed = builder.place(&fragment, 0).unwrap();
        assert_eq!(placed.len(), builder.sites().len());

        let top = &placed[0];
        assert_eq!(top.len(), 3);
        assert_eq!(top.atoms[0].role, AtomRole::Surface);
        assert_eq!(top.atoms[1].role, AtomRole::Adsorbate);
        assert_abs_diff_eq!(top.distance(0, 1), 1.32 + 0.66, epsilon = 1e-9);
        // Internal geometry of the fragment is untouched.
        assert_abs_diff_eq!(top.distance(1, 2), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bonding_atom_out_of_range() {
        let builder = AdsorptionSiteBuilder::new(hexagonal(2.55)).unwrap();
        let fragment = Molecule::new(vec![Atom::new("O", Vector3::zeros())]);
        assert!(matches!(builder.place(&fragment, 3), Err(TsError::UnknownSpecies(_))));
    }
}
