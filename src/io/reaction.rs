use crate::chemistry::species::{Reaction, Species, SpeciesAtom};
use crate::core::connectivity::{BondOrder, GraphRepresentation};
use crate::core::elements::is_known_element;
use crate::core::error::{Result, TsError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Symbol used for surface binding sites in adjacency lists.
pub const SURFACE_SITE: &str = "X";

/// One entry of the reaction document. Extra keys (e.g. `index`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionRecord {
    pub reactant: String,
    pub product: String,
}

impl ReactionRecord {
    pub fn to_reaction(&self) -> Result<Reaction> {
        Ok(Reaction {
            reactants: parse_adjacency_list(&self.reactant)?,
            products: parse_adjacency_list(&self.product)?,
        })
    }
}

pub fn load_reactions(path: &Path) -> Result<Vec<ReactionRecord>> {
    let content = fs::read_to_string(path)?;
    parse_reactions(&content)
}

pub fn parse_reactions(content: &str) -> Result<Vec<ReactionRecord>> {
    let records: Vec<ReactionRecord> = serde_yaml::from_str(content).map_err(|e| {
        let line = e.location().map(|l| l.line()).unwrap_or(0);
        TsError::parse("reaction document", line, e.to_string())
    })?;
    if records.is_empty() {
        return Err(TsError::parse("reaction document", 0, "no reactions listed"));
    }
    Ok(records)
}

struct ParsedAtom {
    element: String,
    bonds: Vec<(usize, BondOrder)>,
}

/// Parses an RMG-style adjacency list into its species.
///
/// ```text
/// multiplicity -1
/// 1 *1 O u0 p2 c0 {2,S} {3,S}
/// 2    H u0 p0 c0 {1,S}
/// 3    X u0 p0 c0 {1,S}
/// ```
///
/// Surface sites (`X`) are dropped; atoms bonded to one get tag 1. Each
/// connected component of the remaining atoms is one species, ordered by
/// its first atom.
pub fn parse_adjacency_list(text: &str) -> Result<Vec<Species>> {
    let mut atoms: Vec<ParsedAtom> = Vec::new();
    let mut label_to_pos: HashMap<usize, usize> = HashMap::new();
    let mut seen_content = false;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let Ok(label) = tokens[0].parse::<usize>() else {
            // Only the leading line may be a header (species name or multiplicity).
            if !seen_content {
                seen_content = true;
                continue;
            }
            return Err(TsError::parse("adjacency list", line_no + 1, format!("expected atom line, got '{}'", line)));
        };
        seen_content = true;

        let mut rest = tokens[1..].iter().peekable();
        if rest.peek().map_or(false, |t| t.starts_with('*')) {
            rest.next();
        }
        let element = rest
            .next()
            .ok_or_else(|| TsError::parse("adjacency list", line_no + 1, "missing element symbol"))?
            .to_string();
        if element != SURFACE_SITE && !is_known_element(&element) {
            return Err(TsError::UnknownSpecies(element));
        }

        let mut bonds = Vec::new();
        for token in rest {
            if let Some(inner) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
                let (target, order) = inner
                    .split_once(',')
                    .ok_or_else(|| TsError::parse("adjacency list", line_no + 1, format!("malformed bond '{}'", token)))?;
                let target: usize = target
                    .trim()
                    .parse()
                    .map_err(|_| TsError::parse("adjacency list", line_no + 1, format!("malformed bond '{}'", token)))?;
                let order = BondOrder::from_label(order.trim())
                    .ok_or_else(|| TsError::parse("adjacency list", line_no + 1, format!("unknown bond order in '{}'", token)))?;
                bonds.push((target, order));
            } else if !is_electronic_descriptor(token) {
                return Err(TsError::parse("adjacency list", line_no + 1, format!("unexpected token '{}'", token)));
            }
        }

        if label_to_pos.insert(label, atoms.len()).is_some() {
            return Err(TsError::parse("adjacency list", line_no + 1, format!("duplicate atom label {}", label)));
        }
        atoms.push(ParsedAtom { element, bonds });
    }

    if atoms.is_empty() {
        return Err(TsError::parse("adjacency list", 0, "no atoms found"));
    }

    // Resolve bonds to positions and split off the surface sites.
    let mut tags = vec![0; atoms.len()];
    let mut molecular_bonds = Vec::new();
    for (i, atom) in atoms.iter().enumerate() {
        for &(label, order) in &atom.bonds {
            let j = *label_to_pos
                .get(&label)
                .ok_or_else(|| TsError::parse("adjacency list", 0, format!("bond to missing atom {}", label)))?;
            let i_site = atom.element == SURFACE_SITE;
            let j_site = atoms[j].element == SURFACE_SITE;
            match (i_site, j_site) {
                (false, false) => molecular_bonds.push((i, j, order)),
                (false, true) => tags[i] = 1,
                (true, false) => tags[j] = 1,
                (true, true) => {}
            }
        }
    }

    let molecular: Vec<usize> = (0..atoms.len())
        .filter(|&i| atoms[i].element != SURFACE_SITE)
        .collect();
    let mut compact = vec![usize::MAX; atoms.len()];
    for (new, &old) in molecular.iter().enumerate() {
        compact[old] = new;
    }
    let bonds: Vec<(usize, usize, BondOrder)> = molecular_bonds
        .iter()
        .map(|&(i, j, o)| (compact[i], compact[j], o))
        .collect();

    let graph = GraphRepresentation::from_bonds(molecular.len(), &bonds);
    let mut species = Vec::new();
    for component in graph.find_connected_components() {
        let mut local = vec![usize::MAX; molecular.len()];
        for (k, &idx) in component.iter().enumerate() {
            local[idx] = k;
        }
        let species_atoms = component
            .iter()
            .map(|&idx| {
                let old = molecular[idx];
                SpeciesAtom::new(atoms[old].element.clone(), tags[old])
            })
            .collect();
        let species_bonds: Vec<_> = bonds
            .iter()
            .filter(|(i, j, _)| local[*i] != usize::MAX && local[*j] != usize::MAX)
            .map(|&(i, j, o)| (local[i], local[j], o))
            .collect();
        species.push(Species::new(species_atoms, &species_bonds)?);
    }

    if species.is_empty() {
        return Err(TsError::parse("adjacency list", 0, "only surface sites listed"));
    }
    Ok(species)
}

/// Unpaired-electron, lone-pair and charge tokens (`u0`, `p2`, `c0`, `c-1`).
fn is_electronic_descriptor(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some('u') | Some('p') | Some('c') => {
            let rest: String = chars.collect();
            !rest.is_empty()
                && rest
                    .trim_start_matches(['+', '-'])
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == '[' || c == ']' || c == ',')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OH_TO_O_H: &str = r#"
- index: 0
  reactant: |
    multiplicity -1
    1 *1 O u0 p2 c0 {2,S} {4,S}
    2 *2 H u0 p0 c0 {1,S}
    3 *3 X u0 p0 c0
    4    X u0 p0 c0 {1,S}
  product: |
    multiplicity -1
    1 *1 O u0 p2 c0 {4,D}
    2 *2 H u0 p0 c0 {3,S}
    3 *3 X u0 p0 c0 {2,S}
    4    X u0 p0 c0 {1,D}
"#;

    #[test]
    fn test_parse_reaction_document() {
        let records = parse_reactions(OH_TO_O_H).unwrap();
        assert_eq!(records.len(), 1);
        let rxn = records[0].to_reaction().unwrap();
        assert_eq!(rxn.reactants.len(), 1);
        assert_eq!(rxn.products.len(), 2);
        assert_eq!(rxn.reactants[0].symbols(), "OH");
        assert_eq!(rxn.reactants[0].tags(), vec![1, 0]);
        assert_eq!(rxn.products[0].symbols(), "O");
        assert_eq!(rxn.products[1].symbols(), "H");
    }

    #[test]
    fn test_unknown_element_in_adjacency_list() {
        let err = parse_adjacency_list("1 Zz u0 p0 c0\n").unwrap_err();
        assert!(matches!(err, TsError::UnknownSpecies(_)));
    }

    #[test]
    fn test_malformed_bond_is_parse_error() {
        let err = parse_adjacency_list("1 O u0 {2;S}\n2 H u0 {1,S}\n").unwrap_err();
        assert!(matches!(err, TsError::Parse { .. }));
    }

    #[test]
    fn test_bond_to_missing_atom_is_parse_error() {
        let err = parse_adjacency_list("1 O u0 p2 c0 {7,S}\n").unwrap_err();
        assert!(matches!(err, TsError::Parse { .. }));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = parse_reactions("- reactant: [1, 2\n").unwrap_err();
        assert!(matches!(err, TsError::Parse { .. }));
    }

    #[test]
    fn test_second_header_line_is_rejected() {
        let err = parse_adjacency_list("OH\nmultiplicity 2\n1 O u0\n").unwrap_err();
        assert!(matches!(err, TsError::Parse { .. }));
    }
}
