use crate::core::error::Result;
use crate::core::structure::Molecule;
use crate::math::rotation::Axis;
use std::collections::BTreeMap;

/// A fixed rigid rotation applied once before placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reorientation {
    pub axis: Axis,
    pub angle: f64,
}

impl Reorientation {
    pub const fn new(axis: Axis, angle: f64) -> Self {
        Self { axis, angle }
    }
}

/// How a fragment of a given formula is oriented and stretched before it
/// is put on the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementRule {
    /// Reorientation picked from the number of placement tags: fewer than
    /// three -> 90° about y, exactly three -> 90° about z, more -> left as is
    /// (no reorientation and no stretch).
    ByTagCount {
        bond: (usize, usize),
        bonded_through: usize,
    },
    /// Fixed reorientation, then the bond is stretched with its first atom held.
    Fixed {
        reorientation: Reorientation,
        bond: (usize, usize),
        bonded_through: usize,
    },
    /// Fixed reorientation, a relative angle change of `subset` about the
    /// `(bond.1, bond.0, pivot)` plane, then a stretch that moves only the
    /// first bond atom.
    Bent {
        reorientation: Reorientation,
        pivot: usize,
        bond: (usize, usize),
        bonded_through: usize,
        angle_delta: f64,
        subset: Vec<usize>,
    },
}

impl PlacementRule {
    pub fn bonded_through(&self) -> usize {
        match self {
            PlacementRule::ByTagCount { bonded_through, .. }
            | PlacementRule::Fixed { bonded_through, .. }
            | PlacementRule::Bent { bonded_through, .. } => *bonded_through,
        }
    }

    pub fn bond(&self) -> (usize, usize) {
        match self {
            PlacementRule::ByTagCount { bond, .. }
            | PlacementRule::Fixed { bond, .. }
            | PlacementRule::Bent { bond, .. } => *bond,
        }
    }

    /// Reorients `fragment` in place and sets the rule's bond to
    /// `reference length x scale`.
    ///
    /// A lone adatom under a tag-count rule has no bond and is placed as is.
    pub fn apply(&self, fragment: &mut Molecule, scale: f64) -> Result<()> {
        // The anchor atom must exist even when the rule never moves it.
        fragment.distance(self.bonded_through(), self.bonded_through())?;
        if matches!(self, PlacementRule::ByTagCount { .. }) && fragment.len() < 2 {
            return Ok(());
        }
        let (a0, a1) = self.bond();
        let bond_length = fragment.distance(a0, a1)?;

        match self {
            PlacementRule::ByTagCount { .. } => {
                let tags = fragment.tags().len();
                if tags < 3 {
                    fragment.rotate(90.0, Axis::Y);
                } else if tags == 3 {
                    fragment.rotate(90.0, Axis::Z);
                } else {
                    return Ok(());
                }
                fragment.set_distance(a0, a1, bond_length * scale, 0.0, None)
            }
            PlacementRule::Fixed { reorientation, .. } => {
                fragment.rotate(reorientation.angle, reorientation.axis);
                fragment.set_distance(a0, a1, bond_length * scale, 0.0, None)
            }
            PlacementRule::Bent {
                reorientation,
                pivot,
                angle_delta,
                subset,
                ..
            } => {
                fragment.rotate(reorientation.angle, reorientation.axis);
                fragment.adjust_angle(a1, a0, *pivot, *angle_delta, subset)?;
                fragment.set_distance(a0, a1, bond_length * scale, 1.0, Some(subset))
            }
        }
    }
}

/// Formula-keyed placement rules with a default for unlisted formulas.
/// The built-in entries are the complete, closed set; `insert` exists for
/// callers that carry their own chemistry.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: BTreeMap<String, PlacementRule>,
    default: PlacementRule,
}

impl Default for RuleTable {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        let cho = PlacementRule::ByTagCount { bond: (0, 2), bonded_through: 0 };
        rules.insert("CHO".to_string(), cho.clone());
        rules.insert("COH".to_string(), cho);
        // Formate binds through an oxygen.
        rules.insert(
            "CHO2".to_string(),
            PlacementRule::Fixed {
                reorientation: Reorientation::new(Axis::Z, 90.0),
                bond: (0, 1),
                bonded_through: 2,
            },
        );
        // H2CO*OCH3 style coupling, bound through the terminal oxygen.
        rules.insert(
            "C2H5O2".to_string(),
            PlacementRule::Bent {
                reorientation: Reorientation::new(Axis::Z, 90.0),
                pivot: 0,
                bond: (1, 5),
                bonded_through: 6,
                angle_delta: -45.0,
                subset: vec![0, 1, 2, 3, 4],
            },
        );

        Self {
            rules,
            default: PlacementRule::ByTagCount { bond: (0, 1), bonded_through: 0 },
        }
    }
}

impl RuleTable {
    pub fn lookup(&self, formula: &str) -> &PlacementRule {
        self.rules.get(formula).unwrap_or(&self.default)
    }

    /// Whether `formula` has its own entry rather than the default.
    pub fn is_listed(&self, formula: &str) -> bool {
        self.rules.contains_key(formula)
    }

    pub fn insert(&mut self, formula: impl Into<String>, rule: PlacementRule) -> Option<PlacementRule> {
        self.rules.insert(formula.into(), rule)
    }

    pub fn formulas(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TsError;
    use crate::core::structure::Atom;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn diatomic() -> Molecule {
        Molecule::new(vec![
            Atom::new("O", Vector3::zeros()),
            Atom::new("H", Vector3::new(0.0, 0.0, -1.0)),
        ])
    }

    #[test]
    fn test_every_formula_resolves_to_one_rule() {
        let table = RuleTable::default();
        assert_eq!(table.lookup("CHO"), table.lookup("COH"));
        assert!(matches!(table.lookup("CHO2"), PlacementRule::Fixed { bonded_through: 2, .. }));
        assert!(matches!(table.lookup("C2H5O2"), PlacementRule::Bent { bonded_through: 6, .. }));
        assert_eq!(table.lookup("HO"), &PlacementRule::ByTagCount { bond: (0, 1), bonded_through: 0 });
        assert!(!table.is_listed("HO"));
        assert_eq!(table.formulas().count(), 4);
    }

    #[test]
    fn test_diatomic_turns_about_y_and_stretches() {
        let mut m = diatomic();
        RuleTable::default().lookup("HO").apply(&mut m, 1.5).unwrap();
        assert_abs_diff_eq!(m.atoms[0].position.norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[1].position.x, -1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[1].position.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_three_atom_fragment_turns_about_z() {
        let mut m = Molecule::new(vec![
            Atom::new("C", Vector3::zeros()),
            Atom::new("H", Vector3::new(1.0, 0.0, 0.0)),
            Atom::new("O", Vector3::new(0.0, 0.0, -1.2)),
        ]);
        RuleTable::default().lookup("CHO").apply(&mut m, 2.0).unwrap();
        // H rotated onto +y; C-O stretched along -z.
        assert_abs_diff_eq!(m.atoms[1].position.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[2].position.z, -2.4, epsilon = 1e-12);
    }

    #[test]
    fn test_large_unlisted_fragment_is_left_alone() {
        let mut m = Molecule::new(
            (0..4).map(|i| Atom::new("H", Vector3::new(i as f64, 0.0, 0.0))).collect(),
        );
        let before = m.clone();
        RuleTable::default().lookup("H4").apply(&mut m, 3.0).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn test_lone_adatom_is_placed_unchanged() {
        let mut m = Molecule::new(vec![Atom::new("O", Vector3::new(0.0, 0.0, 0.5))]);
        let before = m.clone();
        RuleTable::default().lookup("O").apply(&mut m, 1.4).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn test_missing_bond_atom_is_unknown_species() {
        let mut m = Molecule::new(vec![Atom::new("C", Vector3::zeros()), Atom::new("O", Vector3::x())]);
        let err = RuleTable::default().lookup("CHO2").apply(&mut m, 1.0).unwrap_err();
        assert!(matches!(err, TsError::UnknownSpecies(_)));
    }

    #[test]
    fn test_formate_turns_about_z_and_stretches_from_carbon() {
        let mut m = Molecule::new(vec![
            Atom::new("C", Vector3::zeros()),
            Atom::new("H", Vector3::new(1.1, 0.0, 0.0)),
            Atom::new("O", Vector3::new(0.0, 0.0, -1.25)),
            Atom::new("O", Vector3::new(0.5, 0.0, 1.2)),
        ]);
        RuleTable::default().lookup("CHO2").apply(&mut m, 1.4).unwrap();

        assert_abs_diff_eq!(m.distance(0, 1).unwrap(), 1.54, epsilon = 1e-9);
        assert_abs_diff_eq!(m.atoms[0].position.norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[1].position.y, 1.54, epsilon = 1e-9);
        assert_abs_diff_eq!(m.atoms[2].position.z, -1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m.atoms[3].position.y, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(m.atoms[3].position.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bent_rule_closes_angle_then_stretches() {
        let positions = [
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 0.0),
            (-1.0, -1.0, 0.0),
            (-1.0, 0.0, 1.0),
            (0.0, -1.0, 1.0),
            (1.5, 0.0, 0.0),
            (2.5, 0.0, 0.0),
            (3.0, 1.0, 0.0),
            (3.0, -1.0, 0.0),
        ];
        let mut m = Molecule::new(
            positions
                .iter()
                .map(|&(x, y, z)| Atom::new("C", Vector3::new(x, y, z)))
                .collect(),
        );
        RuleTable::default().lookup("C2H5O2").apply(&mut m, 1.2).unwrap();

        assert_abs_diff_eq!(m.distance(1, 5).unwrap(), 1.8, epsilon = 1e-9);
        // 90° between the bond and atom 0 about the rotation centre, less 45°.
        let bond = m.atoms[5].position;
        let arm = m.atoms[0].position;
        assert_abs_diff_eq!(bond.angle(&arm).to_degrees(), 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.atoms[1].position.y, -0.3, epsilon = 1e-9);
        // Outside the subset only the 90° turn applies.
        assert_abs_diff_eq!(m.atoms[6].position.y, 2.5, epsilon = 1e-9);
        assert_abs_diff_eq!(m.atoms[6].position.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bent_rule_moves_only_pivot_side_bond_atom() {
        let mut m = Molecule::new(
            (0..9)
                .map(|i| Atom::new(if i == 6 { "O" } else { "C" }, Vector3::new(i as f64, (i % 2) as f64, 0.0)))
                .collect(),
        );
        let rule = RuleTable::default().lookup("C2H5O2").clone();
        let before = m.clone();
        rule.apply(&mut m, 1.2).unwrap();
        let after = m.distance(1, 5).unwrap();
        let original = before.distance(1, 5).unwrap();
        assert_abs_diff_eq!(after, original * 1.2, epsilon = 1e-9);
        // Atoms outside the subset only saw the rigid reorientation.
        assert_abs_diff_eq!(m.atoms[6].position.norm(), before.atoms[6].position.norm(), epsilon = 1e-9);
    }
}
