//! Query parameter parsing for `sort` and `populate`. Structured JSON is tried first;
//! anything that does not deserialize is read as a plain list.

use crate::error::UserError;
use crate::store::{Projection, SortDirection, SortSpec};
use serde_json::Value;

/// `[A-Za-z_$][A-Za-z0-9_.$]*`
fn is_field_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

fn direction(v: &Value) -> Option<SortDirection> {
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(SortDirection::Asc),
            Some(-1) => Some(SortDirection::Desc),
            _ => None,
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(SortDirection::Asc),
            "desc" | "descending" | "-1" => Some(SortDirection::Desc),
            _ => None,
        },
        _ => None,
    }
}

fn sort_token(token: &str) -> Result<(String, SortDirection), UserError> {
    let (name, dir) = match token.strip_prefix('-') {
        Some(rest) => (rest, SortDirection::Desc),
        None => (token.strip_prefix('+').unwrap_or(token), SortDirection::Asc),
    };
    if is_field_name(name) {
        Ok((name.to_string(), dir))
    } else {
        Err(UserError::UnparsableSort)
    }
}

fn structured_sort(value: &Value) -> Result<SortSpec, UserError> {
    let mut keys = Vec::new();
    match value {
        Value::Object(map) => {
            for (field, dir) in map {
                keys.push((field.clone(), direction(dir).ok_or(UserError::UnparsableSort)?));
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(token) => keys.push(sort_token(token)?),
                    Value::Array(pair) if pair.len() == 2 => {
                        let field = pair[0].as_str().ok_or(UserError::UnparsableSort)?;
                        let dir = direction(&pair[1]).ok_or(UserError::UnparsableSort)?;
                        keys.push((field.to_string(), dir));
                    }
                    _ => return Err(UserError::UnparsableSort),
                }
            }
        }
        _ => return Err(UserError::UnparsableSort),
    }
    Ok(SortSpec(keys))
}

/// Parse `sort`. Blank input is no sort.
pub fn parse_sort(raw: &str) -> Result<Option<SortSpec>, UserError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(value @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str::<Value>(raw) {
        let spec = structured_sort(&value)?;
        return Ok(Some(spec).filter(|s| !s.is_empty()));
    }
    let keys = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(sort_token)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(SortSpec(keys)).filter(|s| !s.is_empty()))
}

/// One relation path to expand, optionally narrowed to selected fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopulatePath {
    pub path: String,
    pub select: Option<Projection>,
}

/// Ordered relation paths to expand.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopulateSpec(pub Vec<PopulatePath>);

impl PopulateSpec {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the raw parameter. Non-JSON input is a whitespace- or comma-separated path list.
    pub fn parse(raw: &str) -> Option<PopulateSpec> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|v| Self::from_value(&v))
            .or_else(|| Self::from_paths(raw))
    }

    /// Structured form: `"path"`, `{path, select}`, or an array of either.
    pub fn from_value(value: &Value) -> Option<PopulateSpec> {
        let mut paths = Vec::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    paths.extend(Self::from_value(item)?.0);
                }
            }
            Value::String(s) => paths.extend(Self::from_paths(s)?.0),
            Value::Object(map) => {
                let path = map.get("path")?.as_str()?.trim();
                if path.is_empty() {
                    return None;
                }
                let select = match map.get("select") {
                    Some(Value::String(s)) => Projection::parse(s),
                    Some(Value::Array(fields)) => {
                        let joined: Vec<&str> = fields.iter().filter_map(Value::as_str).collect();
                        Projection::parse(&joined.join(" "))
                    }
                    _ => None,
                };
                paths.push(PopulatePath {
                    path: path.to_string(),
                    select,
                });
            }
            _ => return None,
        }
        Some(PopulateSpec(paths)).filter(|s| !s.is_empty())
    }

    fn from_paths(raw: &str) -> Option<PopulateSpec> {
        let paths: Vec<PopulatePath> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .map(|p| PopulatePath {
                path: p.to_string(),
                select: None,
            })
            .collect();
        Some(PopulateSpec(paths)).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asc(f: &str) -> (String, SortDirection) {
        (f.to_string(), SortDirection::Asc)
    }

    fn desc(f: &str) -> (String, SortDirection) {
        (f.to_string(), SortDirection::Desc)
    }

    #[test]
    fn plain_sort_list() {
        assert_eq!(parse_sort("prop1 -prop2").unwrap(), Some(SortSpec(vec![asc("prop1"), desc("prop2")])));
        assert_eq!(parse_sort("a,b.c").unwrap(), Some(SortSpec(vec![asc("a"), asc("b.c")])));
        assert_eq!(parse_sort("  ").unwrap(), None);
    }

    #[test]
    fn structured_sort_forms() {
        assert_eq!(
            parse_sort(r#"{"prop1": -1, "prop2": "asc"}"#).unwrap(),
            Some(SortSpec(vec![desc("prop1"), asc("prop2")]))
        );
        assert_eq!(
            parse_sort(r#"[["prop1", "descending"], "-prop2"]"#).unwrap(),
            Some(SortSpec(vec![desc("prop1"), desc("prop2")]))
        );
    }

    #[test]
    fn malformed_sort_is_unparsable() {
        assert_eq!(parse_sort(r#"{"prop1": 2}"#), Err(UserError::UnparsableSort));
        assert_eq!(parse_sort(r#"{"prop1": -1"#), Err(UserError::UnparsableSort));
        assert_eq!(parse_sort("[prop1"), Err(UserError::UnparsableSort));
    }

    #[test]
    fn populate_plain_and_structured() {
        let plain = PopulateSpec::parse("test1").unwrap();
        assert_eq!(plain.0, vec![PopulatePath { path: "test1".into(), select: None }]);

        let one = PopulateSpec::parse(r#"{"path": "test1", "select": "prop1a prop1b"}"#).unwrap();
        assert_eq!(one.0[0].select.as_ref().unwrap().include, vec!["prop1a", "prop1b"]);

        let many = PopulateSpec::parse(r#"["test1", {"path": "test2", "select": "-prop2a"}]"#).unwrap();
        assert_eq!(many.0.len(), 2);
        assert_eq!(many.0[1].select.as_ref().unwrap().exclude, vec!["prop2a"]);
    }

    #[test]
    fn populate_falls_back_to_raw_path() {
        let spec = PopulateSpec::parse("test1 test2").unwrap();
        assert_eq!(spec.0.iter().map(|p| p.path.as_str()).collect::<Vec<_>>(), vec!["test1", "test2"]);
        assert_eq!(PopulateSpec::parse("{test1").unwrap().0[0].path, "{test1");
        assert!(PopulateSpec::parse("").is_none());
        assert!(PopulateSpec::from_value(&Value::Null).is_none());
    }
}
