//! Minimal ISO 10303-21 (STEP physical file) reader, enough to walk the
//! entity graph of an exported IFC file.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{CdError, CdResult};

static ENTITY_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(\d+)\s*=\s*([A-Z0-9_]+)\s*\(").expect("entity header pattern is valid"));

/// One attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    Ref(u64),
    Str(String),
    Num(f64),
    Enum(String),
    List(Vec<StepValue>),
    /// Typed value such as `IFCLABEL('x')`
    Typed(String, Box<StepValue>),
    /// `$`
    Null,
    /// `*`
    Derived,
}

impl StepValue {
    pub fn as_ref_id(&self) -> Option<u64> {
        match self {
            StepValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StepValue::Str(s) => Some(s),
            StepValue::Typed(_, inner) => inner.as_str(),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            StepValue::Num(n) => Some(*n),
            StepValue::Typed(_, inner) => inner.as_num(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StepValue]> {
        match self {
            StepValue::List(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepEntity {
    pub id: u64,
    /// Upper-case entity type ("IFCSPACE")
    pub kind: String,
    pub attrs: Vec<StepValue>,
}

impl StepEntity {
    pub fn attr(&self, index: usize) -> Option<&StepValue> {
        self.attrs.get(index)
    }
}

/// The DATA section of a STEP file, keyed by instance id
#[derive(Debug, Clone, Default)]
pub struct StepFile {
    pub entities: BTreeMap<u64, StepEntity>,
}

impl StepFile {
    pub fn get(&self, id: u64) -> Option<&StepEntity> {
        self.entities.get(&id)
    }

    /// Follow the reference stored at `index` of `entity`
    pub fn follow(&self, entity: &StepEntity, index: usize) -> Option<&StepEntity> {
        entity.attr(index)?.as_ref_id().and_then(|id| self.get(id))
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a StepEntity> + 'a {
        self.entities.values().filter(move |e| e.kind == kind)
    }
}

/// Split on `;` outside quoted strings
fn statements(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            ';' if !in_string => {
                out.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

pub fn parse(text: &str) -> CdResult<StepFile> {
    if !text.trim_start().starts_with("ISO-10303-21") {
        return Err(CdError::export("bim", "missing ISO-10303-21 header"));
    }
    let mut file = StepFile::default();
    let mut in_data = false;
    for statement in statements(text) {
        match statement {
            "DATA" => in_data = true,
            "ENDSEC" => in_data = false,
            s if in_data && s.starts_with('#') => {
                let entity = parse_entity(s)?;
                file.entities.insert(entity.id, entity);
            }
            _ => {}
        }
    }
    Ok(file)
}

fn parse_entity(statement: &str) -> CdResult<StepEntity> {
    let caps = ENTITY_HEADER
        .captures(statement)
        .ok_or_else(|| CdError::export("bim", format!("bad entity '{}'", truncate(statement))))?;
    let id = caps[1]
        .parse::<u64>()
        .map_err(|e| CdError::export("bim", e.to_string()))?;
    let kind = caps[2].to_string();
    let open = caps.get(0).map(|m| m.end()).unwrap_or(0);

    // Reparse from the opening parenthesis as one list
    let mut parser = ValueParser {
        chars: statement[open - 1..].chars().collect(),
        pos: 0,
    };
    let attrs = match parser.value()? {
        StepValue::List(items) => items,
        _ => return Err(CdError::export("bim", format!("#{}: expected attribute list", id))),
    };
    Ok(StepEntity { id, kind, attrs })
}

fn truncate(s: &str) -> String {
    s.chars().take(40).collect()
}

struct ValueParser {
    chars: Vec<char>,
    pos: usize,
}

impl ValueParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> CdError {
        CdError::export("bim", format!("{} at offset {}", what, self.pos))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn value(&mut self) -> CdResult<StepValue> {
        self.skip_ws();
        match self.peek() {
            Some('$') => {
                self.pos += 1;
                Ok(StepValue::Null)
            }
            Some('*') => {
                self.pos += 1;
                Ok(StepValue::Derived)
            }
            Some('#') => {
                self.pos += 1;
                let digits = self.take_while(|c| c.is_ascii_digit());
                digits
                    .parse()
                    .map(StepValue::Ref)
                    .map_err(|_| self.error("bad reference"))
            }
            Some('\'') => self.string(),
            Some('.') => {
                self.pos += 1;
                let name = self.take_while(|c| c != '.');
                self.pos += 1;
                Ok(StepValue::Enum(name))
            }
            Some('(') => self.list(),
            Some(c) if c.is_ascii_uppercase() => {
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                self.skip_ws();
                if self.peek() != Some('(') {
                    return Err(self.error("expected '(' after type name"));
                }
                self.pos += 1;
                let inner = self.value()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(self.error("unclosed typed value"));
                }
                self.pos += 1;
                Ok(StepValue::Typed(name, Box::new(inner)))
            }
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => {
                let text = self.take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'E' | 'e'));
                text.parse().map(StepValue::Num).map_err(|_| self.error("bad number"))
            }
            _ => Err(self.error("unexpected character")),
        }
    }

    fn list(&mut self) -> CdResult<StepValue> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(')') => {
                    self.pos += 1;
                    return Ok(StepValue::List(items));
                }
                Some(',') => self.pos += 1,
                None => return Err(self.error("unclosed list")),
                _ => items.push(self.value()?),
            }
        }
    }

    fn string(&mut self) -> CdResult<StepValue> {
        self.pos += 1;
        let mut raw = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\'') if self.chars.get(self.pos + 1) == Some(&'\'') => {
                    raw.push('\'');
                    self.pos += 2;
                }
                Some('\'') => {
                    self.pos += 1;
                    return Ok(StepValue::Str(decode_string(&raw)));
                }
                Some(c) => {
                    raw.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

/// Encode text for a STEP string body (quotes not included)
pub fn encode_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut wide: Vec<u16> = Vec::new();
    let flush = |out: &mut String, wide: &mut Vec<u16>| {
        if !wide.is_empty() {
            out.push_str("\\X2\\");
            for unit in wide.drain(..) {
                out.push_str(&format!("{:04X}", unit));
            }
            out.push_str("\\X0\\");
        }
    };
    for c in s.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            flush(&mut out, &mut wide);
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                c => out.push(c),
            }
        } else if !c.is_ascii_control() {
            let mut buf = [0u16; 2];
            wide.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush(&mut out, &mut wide);
    out
}

/// Decode `\X2\...\X0\` runs and doubled backslashes
fn decode_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        let next_wide = rest.find("\\X2\\");
        let next_slash = rest.find("\\\\");
        match (next_wide, next_slash) {
            (Some(w), s) if s.map_or(true, |s| w < s) => {
                out.push_str(&rest[..w]);
                let body = &rest[w + 4..];
                let end = body.find("\\X0\\").unwrap_or(body.len());
                let units: Vec<u16> = body[..end]
                    .as_bytes()
                    .chunks(4)
                    .filter_map(|h| std::str::from_utf8(h).ok().and_then(|h| u16::from_str_radix(h, 16).ok()))
                    .collect();
                out.push_str(&String::from_utf16_lossy(&units));
                rest = body.get(end + 4..).unwrap_or("");
            }
            (_, Some(s)) => {
                out.push_str(&rest[..s]);
                out.push('\\');
                rest = &rest[s + 2..];
            }
            _ => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ISO-10303-21;\nHEADER;\nFILE_NAME('a;b.ifc','2024-01-01T00:00:00',(''),(''),'','','');\nENDSEC;\nDATA;\n\
#1=IFCCARTESIANPOINT((0.,1500.,-2.5E1));\n\
#2=IFCSPACE('0abc',$,'101',$,$,#1,*,'Living ''Room''',.ELEMENT.,$);\n\
#3=IFCPROPERTYSINGLEVALUE('Area',$,IFCAREAMEASURE(21.5),$);\n\
ENDSEC;\nEND-ISO-10303-21;\n";

    #[test]
    fn test_parse_entities() {
        let file = parse(SAMPLE).unwrap();
        assert_eq!(file.entities.len(), 3);

        let point = file.get(1).unwrap();
        let coords: Vec<f64> = point.attrs[0].as_list().unwrap().iter().filter_map(StepValue::as_num).collect();
        assert_eq!(coords, vec![0.0, 1500.0, -25.0]);

        let space = file.get(2).unwrap();
        assert_eq!(space.kind, "IFCSPACE");
        assert_eq!(space.attr(1), Some(&StepValue::Null));
        assert_eq!(space.attr(6), Some(&StepValue::Derived));
        assert_eq!(space.attr(7).and_then(StepValue::as_str), Some("Living 'Room'"));
        assert_eq!(space.attr(8), Some(&StepValue::Enum("ELEMENT".to_string())));
        assert_eq!(file.follow(space, 5).map(|e| e.id), Some(1));

        let prop = file.get(3).unwrap();
        assert_eq!(prop.attr(2).and_then(StepValue::as_num), Some(21.5));
    }

    #[test]
    fn test_string_encoding() {
        assert_eq!(encode_string("Kid's Room"), "Kid''s Room");
        assert_eq!(encode_string("Büro"), "B\\X2\\00FC\\X0\\ro");
        assert_eq!(decode_string("B\\X2\\00FC\\X0\\ro"), "Büro");
        assert_eq!(decode_string("a\\\\b"), "a\\b");
    }

    #[test]
    fn test_rejects_non_step() {
        assert!(parse("hello").is_err());
        assert!(parse("ISO-10303-21;\nDATA;\n#1=IFCWALL(;\nENDSEC;").is_err());
    }
}
