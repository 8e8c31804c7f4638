use crate::core::connectivity::{BondOrder, GeometryEmbedder};
use crate::core::elements::is_known_element;
use crate::core::error::{Result, TsError};
use crate::core::structure::Molecule;
use petgraph::algo::is_isomorphic_matching;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::BTreeMap;

/// One atom of a species graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesAtom {
    pub element: String,
    /// 1 when the atom is bonded to a surface site in the adjacency list.
    pub tag: i32,
}

impl SpeciesAtom {
    pub fn new(element: impl Into<String>, tag: i32) -> Self {
        Self { element: element.into(), tag }
    }
}

/// A chemical species as an element-labelled bond graph.
///
/// Node `i` of the graph is atom `i` in input order, which the placement
/// rules index into.
#[derive(Debug, Clone)]
pub struct Species {
    graph: UnGraph<SpeciesAtom, BondOrder>,
}

impl Species {
    pub fn new(atoms: Vec<SpeciesAtom>, bonds: &[(usize, usize, BondOrder)]) -> Result<Self> {
        if atoms.is_empty() {
            return Err(TsError::parse("species", 0, "species has no atoms"));
        }
        let mut graph = UnGraph::with_capacity(atoms.len(), bonds.len());
        for atom in atoms {
            if !is_known_element(&atom.element) {
                return Err(TsError::UnknownSpecies(atom.element));
            }
            graph.add_node(atom);
        }
        for &(i, j, order) in bonds {
            let n = graph.node_count();
            if i >= n || j >= n || i == j {
                return Err(TsError::parse("species", 0, format!("invalid bond {}-{}", i, j)));
            }
            let (a, b) = (NodeIndex::new(i), NodeIndex::new(j));
            if graph.find_edge(a, b).is_none() {
                graph.add_edge(a, b, order);
            }
        }
        Ok(Self { graph })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn elements(&self) -> Vec<String> {
        self.graph.node_weights().map(|a| a.element.clone()).collect()
    }

    pub fn tags(&self) -> Vec<i32> {
        self.graph.node_weights().map(|a| a.tag).collect()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Formula in order of appearance with consecutive runs collapsed,
    /// e.g. `O H` -> `OH`, `C H H H O` -> `CH3O`.
    pub fn symbols(&self) -> String {
        let mut out = String::new();
        let mut run: Option<(&str, usize)> = None;
        for atom in self.graph.node_weights() {
            match run {
                Some((el, n)) if el == atom.element => run = Some((el, n + 1)),
                _ => {
                    if let Some((el, n)) = run {
                        push_count(&mut out, el, n);
                    }
                    run = Some((atom.element.as_str(), 1));
                }
            }
        }
        if let Some((el, n)) = run {
            push_count(&mut out, el, n);
        }
        out
    }

    /// Hill-order formula: C and H first when carbon is present, the rest
    /// alphabetically (everything alphabetically without carbon).
    pub fn chemical_formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for atom in self.graph.node_weights() {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }

        let mut out = String::new();
        if let Some(c) = counts.remove("C") {
            push_count(&mut out, "C", c);
            if let Some(h) = counts.remove("H") {
                push_count(&mut out, "H", h);
            }
        }
        for (el, n) in counts {
            push_count(&mut out, el, n);
        }
        out
    }

    /// Same species under element-labelled, bond-order-labelled graph
    /// isomorphism, independent of atom order.
    pub fn is_isomorphic(&self, other: &Species) -> bool {
        if self.len() != other.len() || self.bond_count() != other.bond_count() {
            return false;
        }
        is_isomorphic_matching(
            &self.graph,
            &other.graph,
            |a, b| a.element == b.element,
            |x, y| x == y,
        )
    }

    /// Canonical 3-D geometry derived from the bond graph.
    pub fn embed(&self) -> Result<Molecule> {
        GeometryEmbedder::embed(&self.graph, &self.elements(), &self.tags())
    }
}

fn push_count(out: &mut String, element: &str, n: usize) {
    out.push_str(element);
    if n > 1 {
        out.push_str(&n.to_string());
    }
}

/// Which side of a reaction the placer enumerates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reactants,
    Products,
}

impl Side {
    /// The side with strictly fewer species; ties go to the products.
    pub fn smaller(reactants: usize, products: usize) -> Self {
        if reactants < products {
            Side::Reactants
        } else {
            Side::Products
        }
    }
}

/// An elementary surface reaction.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub reactants: Vec<Species>,
    pub products: Vec<Species>,
}

impl Reaction {
    pub fn side(&self) -> Side {
        Side::smaller(self.reactants.len(), self.products.len())
    }

    pub fn species(&self, side: Side) -> &[Species] {
        match side {
            Side::Reactants => &self.reactants,
            Side::Products => &self.products,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydroxyl(o_first: bool) -> Species {
        let (atoms, bonds) = if o_first {
            (vec![SpeciesAtom::new("O", 1), SpeciesAtom::new("H", 0)], vec![(0, 1, BondOrder::Single)])
        } else {
            (vec![SpeciesAtom::new("H", 0), SpeciesAtom::new("O", 1)], vec![(1, 0, BondOrder::Single)])
        };
        Species::new(atoms, &bonds).unwrap()
    }

    fn methoxy() -> Species {
        let atoms = vec![
            SpeciesAtom::new("C", 0),
            SpeciesAtom::new("H", 0),
            SpeciesAtom::new("H", 0),
            SpeciesAtom::new("H", 0),
            SpeciesAtom::new("O", 1),
        ];
        let bonds = vec![
            (0, 1, BondOrder::Single),
            (0, 2, BondOrder::Single),
            (0, 3, BondOrder::Single),
            (0, 4, BondOrder::Single),
        ];
        Species::new(atoms, &bonds).unwrap()
    }

    #[test]
    fn test_symbols_keep_input_order() {
        assert_eq!(hydroxyl(true).symbols(), "OH");
        assert_eq!(hydroxyl(false).symbols(), "HO");
        assert_eq!(methoxy().symbols(), "CH3O");
    }

    #[test]
    fn test_hill_formula() {
        assert_eq!(hydroxyl(true).chemical_formula(), "HO");
        assert_eq!(methoxy().chemical_formula(), "CH3O");
    }

    #[test]
    fn test_isomorphism_ignores_atom_order() {
        assert!(hydroxyl(true).is_isomorphic(&hydroxyl(false)));
        assert!(!hydroxyl(true).is_isomorphic(&methoxy()));
    }

    #[test]
    fn test_bond_order_is_part_of_identity() {
        let single = Species::new(
            vec![SpeciesAtom::new("C", 0), SpeciesAtom::new("O", 0)],
            &[(0, 1, BondOrder::Single)],
        )
        .unwrap();
        let double = Species::new(
            vec![SpeciesAtom::new("C", 0), SpeciesAtom::new("O", 0)],
            &[(0, 1, BondOrder::Double)],
        )
        .unwrap();
        assert!(!single.is_isomorphic(&double));
    }

    #[test]
    fn test_unknown_element_is_rejected() {
        let err = Species::new(vec![SpeciesAtom::new("Qq", 0)], &[]).unwrap_err();
        assert!(matches!(err, TsError::UnknownSpecies(ref s) if s == "Qq"));
    }

    #[test]
    fn test_smaller_side_ties_go_to_products() {
        assert_eq!(Side::smaller(1, 2), Side::Reactants);
        assert_eq!(Side::smaller(2, 1), Side::Products);
        assert_eq!(Side::smaller(1, 1), Side::Products);
    }
}
