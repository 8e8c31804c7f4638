use crate::core::error::{Result, TsError};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Field(String),
}

/// A job script with `{name}` placeholders. `{{` and `}}` stand for
/// literal braces.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    segments: Vec<Segment>,
}

impl JobTemplate {
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TsError::Template(format!("unterminated placeholder '{{{}'", name)));
                    }
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(TsError::Template(format!("unsupported placeholder '{{{}}}'", name)));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name));
                }
                '}' => return Err(TsError::Template("single '}' in template".to_string())),
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }
        Ok(Self { segments })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TsError::FileSystem(path.to_path_buf()),
            _ => TsError::from(e),
        })?;
        Self::parse(&text)
    }

    /// Placeholder names in order of first use.
    pub fn fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Fills every placeholder. A placeholder without a value is an error;
    /// values the template does not use are ignored.
    pub fn render(&self, values: &BTreeMap<&str, String>) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = values
                        .get(name.as_str())
                        .ok_or_else(|| TsError::Template(format!("no value for field '{}'", name)))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

// ============================================================================
// PYTHON LITERALS
// ============================================================================

/// Float the way Python prints it: integral values keep a trailing `.0`.
pub fn py_float(x: f64) -> String {
    let s = format!("{}", x);
    if x.is_finite() && !s.contains(['.', 'e', 'E']) {
        format!("{}.0", s)
    } else {
        s
    }
}

fn py_tuple(items: &[String]) -> String {
    match items {
        [single] => format!("({},)", single),
        _ => format!("({})", items.join(", ")),
    }
}

/// `(3, 3, 1)`
pub fn py_int_tuple(values: &[usize]) -> String {
    py_tuple(&values.iter().map(|v| v.to_string()).collect::<Vec<_>>())
}

/// `(1.95, 1.7)`
pub fn py_float_tuple(values: &[f64]) -> String {
    py_tuple(&values.iter().map(|v| py_float(*v)).collect::<Vec<_>>())
}

/// `[(12, 3), (13, 7)]`
pub fn py_pair_list(pairs: &[(usize, usize)]) -> String {
    let items: Vec<String> = pairs.iter().map(|(a, b)| format!("({}, {})", a, b)).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_and_escapes() {
        let t = JobTemplate::parse("geom = '{geom}'\nd = {{'a': {avDists}}}\nagain = {geom}\n").unwrap();
        assert_eq!(t.fields(), vec!["geom", "avDists"]);
        let mut values = BTreeMap::new();
        values.insert("geom", "000_OH_O+H.xyz".to_string());
        values.insert("avDists", "(1.0, 2.0)".to_string());
        values.insert("unused", "x".to_string());
        assert_eq!(
            t.render(&values).unwrap(),
            "geom = '000_OH_O+H.xyz'\nd = {'a': (1.0, 2.0)}\nagain = 000_OH_O+H.xyz\n"
        );
    }

    #[test]
    fn test_missing_value_is_template_error() {
        let t = JobTemplate::parse("x = {slabopt}").unwrap();
        assert!(matches!(t.render(&BTreeMap::new()), Err(TsError::Template(_))));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(JobTemplate::parse("x = {geom").is_err());
        assert!(JobTemplate::parse("x = geom}").is_err());
        assert!(JobTemplate::parse("x = {geom!r}").is_err());
    }

    #[test]
    fn test_python_literals() {
        assert_eq!(py_float(2.0), "2.0");
        assert_eq!(py_float(1.95), "1.95");
        assert_eq!(py_int_tuple(&[3, 3, 1]), "(3, 3, 1)");
        assert_eq!(py_float_tuple(&[1.95, 1.7]), "(1.95, 1.7)");
        assert_eq!(py_float_tuple(&[1.5]), "(1.5,)");
        assert_eq!(py_pair_list(&[(12, 3), (13, 7)]), "[(12, 3), (13, 7)]");
    }
}
