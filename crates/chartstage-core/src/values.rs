//! Override values: inline assignments and deep merge

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

use crate::error::{CoreError, Result};

/// Largest list index an assignment may address
const MAX_INDEX: usize = 65_536;

/// Override values handed to the chart engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub Map<String, JsonValue>);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse a YAML (or JSON) document that must be a mapping.
    ///
    /// An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::parse("values document", e.to_string()))?;
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            JsonValue::Null => Ok(Self::new()),
            other => Err(CoreError::parse(
                "values document",
                format!("expected a mapping at the top level, found {}", kind(&other)),
            )),
        }
    }

    /// Load a values document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::classify::classify("Reading custom yaml", &e))?;
        Self::from_yaml(&content)
    }

    /// Get a value by dotted path (e.g., "image.tag")
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.0.get(first)?, |value, key| value.as_object()?.get(key))
    }

    /// Return a new mapping with `overlay` merged on top of `self`.
    ///
    /// Neither side is modified.
    pub fn merged(&self, overlay: &Values) -> Values {
        Values(merge_maps(&self.0, &overlay.0))
    }

    pub fn inner(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize as JSON. Keys are ordered, so equal values give equal bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| CoreError::validation(e.to_string()))
    }
}

/// Merge `overlay` on top of `base` into a new map.
///
/// Keys holding a mapping on both sides merge recursively. Any other value
/// from `overlay`, lists included, replaces the base value wholesale.
pub fn merge_maps(
    base: &Map<String, JsonValue>,
    overlay: &Map<String, JsonValue>,
) -> Map<String, JsonValue> {
    let mut out = base.clone();
    for (key, value) in overlay {
        let merged = match (out.get(key), value) {
            (Some(JsonValue::Object(b)), JsonValue::Object(o)) => {
                JsonValue::Object(merge_maps(b, o))
            }
            _ => value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

/// Apply inline assignments in order.
///
/// Each string uses the `--set` syntax: `a.b=c,d[0]=e,list={x,y}`. Later
/// assignments win at the same path.
pub fn parse_assignments(assignments: &[String]) -> Result<Values> {
    let mut values = Values::new();
    for assignment in assignments {
        AssignmentParser::new(assignment)
            .parse_into(&mut values.0)
            .map_err(|reason| {
                CoreError::validation(format!(
                    "Process values: cannot parse '{assignment}': {reason}"
                ))
            })?;
    }
    Ok(values)
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

struct AssignmentParser<'a> {
    chars: Peekable<Chars<'a>>,
}

type ParseResult<T> = std::result::Result<T, String>;

impl<'a> AssignmentParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn parse_into(&mut self, data: &mut Map<String, JsonValue>) -> ParseResult<()> {
        while self.chars.peek().is_some() {
            self.assignment(data)?;
        }
        Ok(())
    }

    /// One `path=value` item, including its trailing comma
    fn assignment(&mut self, data: &mut Map<String, JsonValue>) -> ParseResult<()> {
        let (key, stop) = self.read_until(&['=', '[', ',', '.']);
        if key.is_empty() {
            return Err("empty key".to_string());
        }
        match stop {
            Some('=') => {
                let value = self.value()?;
                data.insert(key, value);
                Ok(())
            }
            Some('.') => {
                let child = ensure_object(data.entry(key).or_insert(JsonValue::Null));
                self.assignment(child)
            }
            Some('[') => {
                let index = self.index()?;
                let list = ensure_array(data.entry(key).or_insert(JsonValue::Null));
                self.list_item(list, index)
            }
            _ => Err(format!("key \"{key}\" has no value")),
        }
    }

    fn list_item(&mut self, list: &mut Vec<JsonValue>, index: usize) -> ParseResult<()> {
        if list.len() <= index {
            list.resize(index + 1, JsonValue::Null);
        }
        match self.chars.next() {
            Some('=') => {
                list[index] = self.value()?;
                Ok(())
            }
            Some('.') => self.assignment(ensure_object(&mut list[index])),
            Some('[') => {
                let inner = self.index()?;
                self.list_item(ensure_array(&mut list[index]), inner)
            }
            Some(c) => Err(format!("unexpected '{c}' after list index")),
            None => Err("list index has no value".to_string()),
        }
    }

    fn index(&mut self) -> ParseResult<usize> {
        let (raw, stop) = self.read_until(&[']']);
        if stop.is_none() {
            return Err("unterminated list index".to_string());
        }
        let index: usize = raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid list index '{raw}'"))?;
        if index > MAX_INDEX {
            return Err(format!("list index {index} exceeds {MAX_INDEX}"));
        }
        Ok(index)
    }

    fn value(&mut self) -> ParseResult<JsonValue> {
        if self.chars.peek() == Some(&'{') {
            self.chars.next();
            return self.list_literal();
        }
        let (raw, _) = self.read_until(&[',']);
        Ok(typed_value(&raw))
    }

    /// `{a,b,c}` after the opening brace
    fn list_literal(&mut self) -> ParseResult<JsonValue> {
        let mut items = Vec::new();
        loop {
            let (raw, stop) = self.read_until(&[',', '}']);
            match stop {
                Some(',') => items.push(typed_value(&raw)),
                Some('}') => {
                    if !(raw.is_empty() && items.is_empty()) {
                        items.push(typed_value(&raw));
                    }
                    break;
                }
                _ => return Err("list must terminate with '}'".to_string()),
            }
        }
        match self.chars.next() {
            None | Some(',') => Ok(JsonValue::Array(items)),
            Some(c) => Err(format!("unexpected '{c}' after list")),
        }
    }

    /// Read up to (and consume) the first unescaped stop character
    fn read_until(&mut self, stops: &[char]) -> (String, Option<char>) {
        let mut out = String::new();
        while let Some(c) = self.chars.next() {
            if c == '\\' {
                if let Some(escaped) = self.chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            if stops.contains(&c) {
                return (out, Some(c));
            }
            out.push(c);
        }
        (out, None)
    }
}

fn ensure_object(value: &mut JsonValue) -> &mut Map<String, JsonValue> {
    if !value.is_object() {
        *value = JsonValue::Object(Map::new());
    }
    match value {
        JsonValue::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn ensure_array(value: &mut JsonValue) -> &mut Vec<JsonValue> {
    if !value.is_array() {
        *value = JsonValue::Array(Vec::new());
    }
    match value {
        JsonValue::Array(list) => list,
        _ => unreachable!("value was just replaced with an array"),
    }
}

/// Scalar typing for assignment values.
///
/// Booleans and `null` are recognised case-insensitively. Integers become
/// numbers unless they carry a leading zero (`007` stays a string). Floats
/// stay strings so versions like `1.10` survive untouched.
fn typed_value(raw: &str) -> JsonValue {
    if raw.eq_ignore_ascii_case("true") {
        JsonValue::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        JsonValue::Bool(false)
    } else if raw.eq_ignore_ascii_case("null") {
        JsonValue::Null
    } else if raw == "0" {
        JsonValue::Number(0.into())
    } else if !raw.starts_with('0') {
        match raw.parse::<i64>() {
            Ok(n) => JsonValue::Number(n.into()),
            Err(_) => JsonValue::String(raw.to_string()),
        }
    } else {
        JsonValue::String(raw.to_string())
    }
}
