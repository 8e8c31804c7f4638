use crate::core::error::{Result, TsError};
use crate::core::structure::{Atom, AtomRole, Lattice, Structure};
use nalgebra::{Matrix3, Vector3};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const WHAT: &str = "extended XYZ";

/// Parses a float value, naming the offending token on failure.
fn parse_float(s: &str, line: usize) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|_| TsError::parse(WHAT, line, format!("'{}' is not a number", s)))
}

/// Reads the first frame of an (extended) XYZ file.
pub fn from_xyz(path: &Path) -> Result<Structure> {
    let mut frames = read_xyz_frames(path)?;
    if frames.is_empty() {
        return Err(TsError::parse(WHAT, 0, format!("no frames in {:?}", path)));
    }
    Ok(frames.swap_remove(0))
}

/// Reads every frame of a (possibly multi-frame) XYZ file.
pub fn read_xyz_frames(path: &Path) -> Result<Vec<Structure>> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TsError::FileSystem(path.to_path_buf()),
        _ => TsError::from(e),
    })?;
    parse_xyz_str(&contents)
}

/// Parses the frames held in `contents`.
///
/// Each frame is an atom count, a comment line of `key=value` pairs
/// (`Lattice`, `Properties`, `pbc`, `energy` are understood; everything
/// else is ignored) and one line per atom. Plain XYZ files are frames
/// whose comment carries none of these keys.
pub fn parse_xyz_str(contents: &str) -> Result<Vec<Structure>> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut frames = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let header = lines[i].trim();
        if header.is_empty() {
            i += 1;
            continue;
        }
        let count: usize = header
            .parse()
            .map_err(|_| TsError::parse(WHAT, i + 1, format!("expected atom count, got '{}'", header)))?;
        if i + 2 + count > lines.len() {
            return Err(TsError::parse(WHAT, i + 1, format!("frame declares {} atoms but the file ends early", count)));
        }

        let comment = lines[i + 1];
        let info = parse_comment(comment);
        let columns = parse_properties(info.get("Properties").map(String::as_str), i + 2)?;

        let mut atoms = Vec::with_capacity(count);
        for (k, raw) in lines[i + 2..i + 2 + count].iter().enumerate() {
            let line_no = i + 3 + k;
            atoms.push(parse_atom_line(raw, &columns, line_no)?);
        }

        let lattice = match info.get("Lattice") {
            Some(value) => Some(parse_lattice(value, i + 2)?),
            None => None,
        };
        let mut structure = Structure::new(lattice, atoms);
        if let Some(value) = info.get("pbc") {
            structure.pbc = parse_pbc(value, i + 2)?;
        }
        if let Some(value) = info.get("energy") {
            structure.energy = Some(parse_float(value, i + 2)?);
        }
        frames.push(structure);

        i += 2 + count;
    }
    Ok(frames)
}

/// Splits a comment line into `key=value` pairs. Values may be double
/// quoted; bare words without `=` are dropped.
fn parse_comment(comment: &str) -> HashMap<String, String> {
    let mut info = HashMap::new();
    let mut chars = comment.chars().peekable();

    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            continue;
        }
        chars.next();

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                value.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        info.insert(key, value);
    }
    info
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Species,
    Position,
    Tag,
    Role,
    Skip,
}

/// Expands `species:S:1:pos:R:3:...` into one entry per whitespace column.
fn parse_properties(value: Option<&str>, line: usize) -> Result<Vec<Column>> {
    let Some(value) = value else {
        return Ok(vec![Column::Species, Column::Position, Column::Position, Column::Position]);
    };
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() % 3 != 0 {
        return Err(TsError::parse(WHAT, line, format!("malformed Properties '{}'", value)));
    }

    let mut columns = Vec::new();
    for chunk in parts.chunks(3) {
        let width: usize = chunk[2]
            .parse()
            .map_err(|_| TsError::parse(WHAT, line, format!("bad column count in Properties '{}'", value)))?;
        let kind = match chunk[0] {
            "species" => Column::Species,
            "pos" => Column::Position,
            "tags" => Column::Tag,
            "role" => Column::Role,
            _ => Column::Skip,
        };
        columns.extend(std::iter::repeat(kind).take(width));
    }

    if !columns.contains(&Column::Species) || columns.iter().filter(|c| **c == Column::Position).count() != 3 {
        return Err(TsError::parse(WHAT, line, "Properties must name species and a 3-column pos"));
    }
    Ok(columns)
}

fn parse_atom_line(raw: &str, columns: &[Column], line: usize) -> Result<Atom> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < columns.len() {
        return Err(TsError::parse(WHAT, line, format!("expected {} columns, found {}", columns.len(), tokens.len())));
    }

    let mut element = "";
    let mut position = Vec::with_capacity(3);
    let mut tag = 0;
    let mut role = AtomRole::Unassigned;
    for (column, token) in columns.iter().zip(&tokens) {
        match column {
            Column::Species => element = *token,
            Column::Position => position.push(parse_float(token, line)?),
            Column::Tag => {
                tag = token
                    .parse()
                    .map_err(|_| TsError::parse(WHAT, line, format!("'{}' is not an integer tag", token)))?;
            }
            Column::Role => {
                role = token
                    .parse()
                    .map_err(|_| TsError::parse(WHAT, line, format!("unknown role '{}'", token)))?;
            }
            Column::Skip => {}
        }
    }

    Ok(Atom::new(element, Vector3::new(position[0], position[1], position[2]))
        .with_tag(tag)
        .with_role(role))
}

/// `Lattice="ax ay az bx by bz cx cy cz"`, one cell vector per triple.
fn parse_lattice(value: &str, line: usize) -> Result<Lattice> {
    let numbers = value
        .split_whitespace()
        .map(|t| parse_float(t, line))
        .collect::<Result<Vec<f64>>>()?;
    if numbers.len() != 9 {
        return Err(TsError::parse(WHAT, line, format!("Lattice needs 9 numbers, got {}", numbers.len())));
    }
    // Row-major fill puts each vector in a row; transpose to columns.
    let matrix = Matrix3::from_row_slice(&numbers).transpose();
    Lattice::new(matrix).map_err(|e| TsError::parse(WHAT, line, e))
}

fn parse_pbc(value: &str, line: usize) -> Result<[bool; 3]> {
    let flags = value
        .split_whitespace()
        .map(|t| match t {
            "T" | "True" | "true" | "1" => Ok(true),
            "F" | "False" | "false" | "0" => Ok(false),
            other => Err(TsError::parse(WHAT, line, format!("bad pbc flag '{}'", other))),
        })
        .collect::<Result<Vec<bool>>>()?;
    match flags.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(TsError::parse(WHAT, line, format!("pbc needs 3 flags, got '{}'", value))),
    }
}
