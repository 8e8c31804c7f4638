/// Single-bond covalent radius (Å) for a given element symbol.
/// Data Source: Cordero, B. et al. (2008). Dalton Trans., 2832-2838.
///
/// Returns `None` for symbols outside the table, which callers treat as an
/// unknown element.
pub fn covalent_radius(element: &str) -> Option<f64> {
    let r = match element {
        // Period 1
        "H" => 0.31, "He" => 0.28,
        // Period 2
        "Li" => 1.28, "Be" => 0.96, "B" => 0.84, "C" => 0.76,
        "N" => 0.71, "O" => 0.66, "F" => 0.57, "Ne" => 0.58,
        // Period 3
        "Na" => 1.66, "Mg" => 1.41, "Al" => 1.21, "Si" => 1.11,
        "P" => 1.07, "S" => 1.05, "Cl" => 1.02, "Ar" => 1.06,
        // Period 4
        "K" => 2.03, "Ca" => 1.76, "Sc" => 1.70, "Ti" => 1.60, "V" => 1.53, "Cr" => 1.39,
        "Mn" => 1.39, "Fe" => 1.32, "Co" => 1.26, "Ni" => 1.24, "Cu" => 1.32, "Zn" => 1.22,
        "Ga" => 1.22, "Ge" => 1.20, "As" => 1.19, "Se" => 1.20, "Br" => 1.20, "Kr" => 1.16,
        // Period 5
        "Rb" => 2.20, "Sr" => 1.95, "Y" => 1.90, "Zr" => 1.75, "Nb" => 1.64, "Mo" => 1.54,
        "Tc" => 1.47, "Ru" => 1.46, "Rh" => 1.42, "Pd" => 1.39, "Ag" => 1.45, "Cd" => 1.44,
        "In" => 1.42, "Sn" => 1.39, "Sb" => 1.39, "Te" => 1.38, "I" => 1.39, "Xe" => 1.40,
        // Period 6
        "Cs" => 2.44, "Ba" => 2.15, "La" => 2.07, "Hf" => 1.75, "Ta" => 1.70, "W" => 1.62,
        "Re" => 1.51, "Os" => 1.44, "Ir" => 1.41, "Pt" => 1.36, "Au" => 1.36, "Hg" => 1.32,
        "Tl" => 1.45, "Pb" => 1.46, "Bi" => 1.48,
        _ => return None,
    };
    Some(r)
}

pub fn is_known_element(element: &str) -> bool {
    covalent_radius(element).is_some()
}

/// CPK-style fill colour used by the preview renderer.
pub fn display_color(element: &str) -> &'static str {
    match element {
        "H" => "#f2f2f2",
        "C" => "#555555",
        "N" => "#3050f8",
        "O" => "#ff0d0d",
        "S" => "#ffff30",
        "Cu" => "#c88033",
        "Ag" => "#c0c0c0",
        "Au" => "#ffd123",
        "Pt" | "Pd" => "#d0d0e0",
        "Ni" => "#50d050",
        _ => "#ff1493",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_symbols() {
        assert!(is_known_element("Cu"));
        assert!(is_known_element("O"));
        assert!(!is_known_element("Xx"));
        assert!(!is_known_element("X"));
    }
}
