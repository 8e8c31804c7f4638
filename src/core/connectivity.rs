use crate::core::elements::covalent_radius;
use crate::core::error::{Result, TsError};
use crate::core::structure::{Atom, Molecule};
use crate::math::rotation;
use nalgebra::Vector3;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{Bfs, EdgeRef};
use std::collections::{HashMap, VecDeque};
use std::fmt;

// ============================================================================
// BOND ORDERS
// ============================================================================

/// Bond label as written in an adjacency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
    Resonance,
    VanDerWaals,
}

impl BondOrder {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "S" => Some(BondOrder::Single),
            "D" => Some(BondOrder::Double),
            "T" => Some(BondOrder::Triple),
            "Q" => Some(BondOrder::Quadruple),
            "B" => Some(BondOrder::Aromatic),
            "R" => Some(BondOrder::Resonance),
            "vdW" => Some(BondOrder::VanDerWaals),
            _ => None,
        }
    }

    /// Multiplier on the covalent-radius sum used when embedding.
    fn length_factor(&self) -> f64 {
        match self {
            BondOrder::Single | BondOrder::Resonance => 1.0,
            BondOrder::Aromatic => 0.93,
            BondOrder::Double => 0.88,
            BondOrder::Triple | BondOrder::Quadruple => 0.80,
            BondOrder::VanDerWaals => 1.6,
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BondOrder::Single => "S",
            BondOrder::Double => "D",
            BondOrder::Triple => "T",
            BondOrder::Quadruple => "Q",
            BondOrder::Aromatic => "B",
            BondOrder::Resonance => "R",
            BondOrder::VanDerWaals => "vdW",
        };
        f.write_str(label)
    }
}

// ============================================================================
// GRAPH REPRESENTATION
// ============================================================================

/// Connectivity of the atoms listed in one adjacency block.
/// Node payloads are the atom positions in that block.
pub struct GraphRepresentation {
    pub graph: UnGraph<usize, BondOrder>,
}

impl GraphRepresentation {
    /// Builds the graph from explicit bonds. Repeated bonds are stored once.
    pub fn from_bonds(num_atoms: usize, bonds: &[(usize, usize, BondOrder)]) -> Self {
        let mut graph = UnGraph::<usize, BondOrder>::with_capacity(num_atoms, bonds.len());

        let node_indices: Vec<NodeIndex> = (0..num_atoms)
            .map(|i| graph.add_node(i))
            .collect();

        for &(i, j, order) in bonds {
            if i == j || i >= num_atoms || j >= num_atoms {
                continue;
            }
            if graph.find_edge(node_indices[i], node_indices[j]).is_none() {
                graph.add_edge(node_indices[i], node_indices[j], order);
            }
        }
        Self { graph }
    }

    /// Finds all connected components (subgraphs) in the graph.
    /// Returns a list of vectors, where each vector contains the atom indices of a molecule.
    pub fn find_connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.graph.node_count()];
        let mut all_components = Vec::new();

        for i in 0..self.graph.node_count() {
            if !visited[i] {
                let mut component = Vec::new();
                let start_node = NodeIndex::new(i);

                let mut bfs = Bfs::new(&self.graph, start_node);
                while let Some(nx) = bfs.next(&self.graph) {
                    let atom_index = self.graph[nx];
                    if !visited[atom_index] {
                        visited[atom_index] = true;
                        component.push(atom_index);
                    }
                }

                // Sort for determinism
                component.sort_unstable();
                if !component.is_empty() {
                    all_components.push(component);
                }
            }
        }
        all_components
    }
}

// ============================================================================
// GEOMETRY EMBEDDER
// ============================================================================

/// Builds a 3-D geometry for a bond graph by walking it breadth first and
/// placing each neighbour at its bond length along an idealised VSEPR
/// direction.
pub struct GeometryEmbedder;

impl GeometryEmbedder {
    /// `elements` and `tags` are indexed by node; the graph payload is ignored.
    pub fn embed<N>(graph: &UnGraph<N, BondOrder>, elements: &[String], tags: &[i32]) -> Result<Molecule> {
        let num_atoms = graph.node_count();
        if num_atoms == 0 {
            return Ok(Molecule::new(Vec::new()));
        }
        if elements.len() != num_atoms || tags.len() != num_atoms {
            return Err(TsError::InvalidInput("element/tag count does not match graph".to_string()));
        }

        let mut positions: HashMap<usize, Vector3<f64>> = HashMap::with_capacity(num_atoms);
        let mut parents: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        // Disconnected pieces are laid out side by side along +x.
        let mut offset = 0.0;
        for root in 0..num_atoms {
            if positions.contains_key(&root) {
                continue;
            }
            positions.insert(root, Vector3::new(offset, 0.0, 0.0));
            queue.push_back(root);

            while let Some(current) = queue.pop_front() {
                let current_pos = positions[&current];
                let node = NodeIndex::new(current);

                let mut neighbors: Vec<(usize, BondOrder)> = graph
                    .edges(node)
                    .map(|e| {
                        let other = if e.source() == node { e.target() } else { e.source() };
                        (other.index(), *e.weight())
                    })
                    .collect();
                neighbors.sort_by_key(|(idx, _)| *idx);

                let mut directions = Self::ideal_directions(neighbors.len());
                // Point the first slot back at the parent so children fill the rest.
                let parent_dir = parents
                    .get(&current)
                    .map(|p| (positions[p] - current_pos).normalize());
                if let Some(to_parent) = parent_dir {
                    let rot = rotation::align(&directions[0], &to_parent);
                    directions = directions.into_iter().map(|d| rot * d).collect();
                }
                let mut free_slots = directions.into_iter().skip(usize::from(parent_dir.is_some()));

                for (neighbor, order) in neighbors {
                    if positions.contains_key(&neighbor) {
                        continue;
                    }
                    let Some(direction) = free_slots.next() else { break };
                    let length = Self::bond_length(&elements[current], &elements[neighbor], order)?;
                    positions.insert(neighbor, current_pos + direction * length);
                    parents.insert(neighbor, current);
                    queue.push_back(neighbor);
                }
            }
            offset = positions.values().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max) + 3.0;
        }

        let atoms = (0..num_atoms)
            .map(|i| {
                let pos = positions.get(&i).copied().unwrap_or_else(Vector3::zeros);
                Atom::new(elements[i].clone(), pos).with_tag(tags[i])
            })
            .collect();
        Ok(Molecule::new(atoms))
    }

    fn bond_length(a: &str, b: &str, order: BondOrder) -> Result<f64> {
        let ra = covalent_radius(a).ok_or_else(|| TsError::UnknownSpecies(a.to_string()))?;
        let rb = covalent_radius(b).ok_or_else(|| TsError::UnknownSpecies(b.to_string()))?;
        Ok((ra + rb) * order.length_factor())
    }

    /// Unit directions for an atom with `n` bonded neighbours. The first
    /// direction is always -z so isolated fragments start upright.
    fn ideal_directions(n: usize) -> Vec<Vector3<f64>> {
        let third = 1.0_f64 / 3.0;
        let s = (8.0_f64 / 9.0).sqrt();
        match n {
            0 => Vec::new(),
            1 => vec![-Vector3::z()],
            2 => vec![-Vector3::z(), Vector3::z()],
            3 => {
                let (sin, cos) = (120.0_f64.to_radians().sin(), 120.0_f64.to_radians().cos());
                vec![
                    -Vector3::z(),
                    Vector3::new(sin, 0.0, -cos),
                    Vector3::new(-sin, 0.0, -cos),
                ]
            }
            4 => {
                let t = (2.0_f64 * std::f64::consts::PI) / 3.0;
                vec![
                    -Vector3::z(),
                    Vector3::new(s, 0.0, third),
                    Vector3::new(s * t.cos(), s * t.sin(), third),
                    Vector3::new(s * t.cos(), -s * t.sin(), third),
                ]
            }
            _ => {
                let mut dirs = vec![
                    -Vector3::z(),
                    Vector3::z(),
                    Vector3::x(),
                    -Vector3::x(),
                    Vector3::y(),
                    -Vector3::y(),
                ];
                // Beyond octahedral coordination, fill the cube diagonals.
                for sx in [1.0, -1.0] {
                    for sy in [1.0, -1.0] {
                        for sz in [1.0, -1.0] {
                            dirs.push(Vector3::new(sx, sy, sz).normalize());
                        }
                    }
                }
                dirs.truncate(n);
                dirs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_components_are_sorted_and_disjoint() {
        let g = GraphRepresentation::from_bonds(
            5,
            &[(0, 2, BondOrder::Single), (3, 4, BondOrder::Double), (2, 0, BondOrder::Single)],
        );
        assert_eq!(g.graph.edge_count(), 2);
        assert_eq!(g.find_connected_components(), vec![vec![0, 2], vec![1], vec![3, 4]]);
    }

    #[test]
    fn test_embedded_bond_lengths_follow_covalent_radii() {
        let g = GraphRepresentation::from_bonds(3, &[(0, 1, BondOrder::Single), (0, 2, BondOrder::Single)]);
        let elements = vec!["O".to_string(), "H".to_string(), "H".to_string()];
        let m = GeometryEmbedder::embed(&g.graph, &elements, &[1, 0, 0]).unwrap();
        assert_abs_diff_eq!(m.distance(0, 1).unwrap(), 0.97, epsilon = 1e-9);
        assert_abs_diff_eq!(m.distance(0, 2).unwrap(), 0.97, epsilon = 1e-9);
        // The two hydrogens must not overlap.
        assert!(m.distance(1, 2).unwrap() > 1.0);
        assert_eq!(m.tags(), vec![1, 0, 0]);
    }

    #[test]
    fn test_chain_children_point_away_from_parent() {
        let g = GraphRepresentation::from_bonds(
            3,
            &[(0, 1, BondOrder::Single), (1, 2, BondOrder::Single)],
        );
        let elements = vec!["C".to_string(), "C".to_string(), "C".to_string()];
        let m = GeometryEmbedder::embed(&g.graph, &elements, &[0, 0, 0]).unwrap();
        assert_abs_diff_eq!(m.distance(0, 2).unwrap(), 2.0 * 1.52, epsilon = 1e-9);
    }
}
