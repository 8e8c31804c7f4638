use crate::core::elements::{covalent_radius, display_color};
use crate::core::error::Result;
use crate::core::structure::Structure;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Serialises a structure as one extended-XYZ frame. Output is fully
/// determined by the structure, so rewriting an unchanged candidate gives
/// byte-identical files.
pub fn format_xyz(structure: &Structure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", structure.atoms.len());

    let mut header = Vec::new();
    if let Some(lattice) = &structure.lattice {
        let values: Vec<String> = (0..3)
            .flat_map(|i| {
                let v = lattice.vector(i);
                [v.x, v.y, v.z]
            })
            .map(|x| format!("{:.8}", x))
            .collect();
        header.push(format!("Lattice=\"{}\"", values.join(" ")));
    }
    header.push("Properties=species:S:1:pos:R:3:tags:I:1:role:S:1".to_string());
    let flags: Vec<&str> = structure.pbc.iter().map(|&p| if p { "T" } else { "F" }).collect();
    header.push(format!("pbc=\"{}\"", flags.join(" ")));
    if let Some(energy) = structure.energy {
        header.push(format!("energy={:.8}", energy));
    }
    let _ = writeln!(out, "{}", header.join(" "));

    for atom in &structure.atoms {
        let p = atom.position;
        let _ = writeln!(
            out,
            "{:<2} {:>16.8} {:>16.8} {:>16.8} {:>4} {}",
            atom.element, p.x, p.y, p.z, atom.tag, atom.role
        );
    }
    out
}

pub fn to_xyz(structure: &Structure, path: &Path) -> Result<()> {
    fs::write(path, format_xyz(structure))?;
    Ok(())
}

// ============================================================================
// PREVIEW RENDERING
// ============================================================================

const PREVIEW_SIZE: f64 = 480.0;
const PREVIEW_PADDING: f64 = 30.0;

/// Top view (projected on xy) of a structure, drawn bottom layer first.
/// The periodic cell is outlined when present.
pub fn render_preview_svg(structure: &Structure) -> String {
    let mut xs: Vec<f64> = structure.atoms.iter().map(|a| a.position.x).collect();
    let mut ys: Vec<f64> = structure.atoms.iter().map(|a| a.position.y).collect();
    let corners = structure.lattice.as_ref().map(|l| {
        let (a, b) = (l.vector(0), l.vector(1));
        [(0.0, 0.0), (a.x, a.y), (a.x + b.x, a.y + b.y), (b.x, b.y)]
    });
    if let Some(corners) = &corners {
        xs.extend(corners.iter().map(|c| c.0));
        ys.extend(corners.iter().map(|c| c.1));
    }

    let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
    let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(1.0);
    let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
    let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(1.0);
    let span = (max_x - min_x).max(max_y - min_y).max(1e-6);
    let scale = (PREVIEW_SIZE - 2.0 * PREVIEW_PADDING) / span;
    let to_screen = |x: f64, y: f64| {
        (
            PREVIEW_PADDING + (x - min_x) * scale,
            PREVIEW_PADDING + (max_y - y) * scale,
        )
    };

    let mut svg = String::new();
    let _ = write!(
        svg,
        "<svg xmlns='http://www.w3.org/2000/svg' width='{0}' height='{0}' viewBox='0 0 {0} {0}'>",
        PREVIEW_SIZE
    );
    svg.push_str("<rect width='100%' height='100%' fill='#ffffff'/>");

    if let Some(corners) = corners {
        let points: Vec<String> = corners
            .iter()
            .map(|&(x, y)| {
                let (sx, sy) = to_screen(x, y);
                format!("{:.2},{:.2}", sx, sy)
            })
            .collect();
        let _ = write!(
            svg,
            "<polygon points='{}' fill='none' stroke='#888888' stroke-dasharray='4 3'/>",
            points.join(" ")
        );
    }

    let mut order: Vec<usize> = (0..structure.atoms.len()).collect();
    order.sort_by(|&i, &j| structure.atoms[i].position.z.total_cmp(&structure.atoms[j].position.z));

    svg.push_str("<g stroke='#333333' stroke-width='1'>");
    for i in order {
        let atom = &structure.atoms[i];
        let (sx, sy) = to_screen(atom.position.x, atom.position.y);
        let radius = covalent_radius(&atom.element).unwrap_or(0.7) * scale * 0.8;
        let _ = write!(
            svg,
            "<circle cx='{:.2}' cy='{:.2}' r='{:.2}' fill='{}'><title>{} {}</title></circle>",
            sx,
            sy,
            radius,
            display_color(&atom.element),
            i,
            atom.element
        );
    }
    svg.push_str("</g></svg>");
    svg
}

pub fn write_preview(structure: &Structure, path: &Path) -> Result<()> {
    fs::write(path, render_preview_svg(structure))?;
    Ok(())
}
