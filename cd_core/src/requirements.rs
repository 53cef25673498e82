//! # Requirements Interpreter
//!
//! Turns a room program into canonical [`RoomRequirement`]s. Three inputs are
//! accepted: structured requests, a JSON document, or free text with one room
//! per line:
//!
//! ```text
//! # Riverside House
//! Living: 25 m2
//! 2x Bedroom: 16 sqm [adj: Living; window]
//! Bathroom 6
//! Storage: 40 sqft
//! ```
//!
//! Function detection is a keyword heuristic (`"bed"` → bedroom, `"hall"` →
//! corridor, ...). It is a best-effort normalizer, not a classifier; names it
//! does not recognise become [`RoomFunction::Custom`].

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CdError, CdResult};
use crate::units::{SquareFeet, SquareMeters};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomFunction {
    Living,
    Kitchen,
    Bedroom,
    Bathroom,
    Dining,
    Office,
    Storage,
    Corridor,
    Lobby,
    Utility,
    Custom,
}

/// Keyword table, first match wins
const FUNCTION_KEYWORDS: &[(&str, RoomFunction)] = &[
    ("corridor", RoomFunction::Corridor),
    ("hallway", RoomFunction::Corridor),
    ("hall", RoomFunction::Corridor),
    ("passage", RoomFunction::Corridor),
    ("lobby", RoomFunction::Lobby),
    ("entry", RoomFunction::Lobby),
    ("entrance", RoomFunction::Lobby),
    ("foyer", RoomFunction::Lobby),
    ("vestibule", RoomFunction::Lobby),
    ("kitchen", RoomFunction::Kitchen),
    ("living", RoomFunction::Living),
    ("lounge", RoomFunction::Living),
    ("family", RoomFunction::Living),
    ("dining", RoomFunction::Dining),
    ("bed", RoomFunction::Bedroom),
    ("bath", RoomFunction::Bathroom),
    ("ensuite", RoomFunction::Bathroom),
    ("shower", RoomFunction::Bathroom),
    ("toilet", RoomFunction::Bathroom),
    ("wc", RoomFunction::Bathroom),
    ("office", RoomFunction::Office),
    ("study", RoomFunction::Office),
    ("storage", RoomFunction::Storage),
    ("store", RoomFunction::Storage),
    ("closet", RoomFunction::Storage),
    ("pantry", RoomFunction::Storage),
    ("utility", RoomFunction::Utility),
    ("laundry", RoomFunction::Utility),
    ("mechanical", RoomFunction::Utility),
];

impl RoomFunction {
    /// Guess a function from a room name, falling back to `Custom`
    pub fn from_name(name: &str) -> RoomFunction {
        let lower = name.to_lowercase();
        FUNCTION_KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, function)| *function)
            .unwrap_or(RoomFunction::Custom)
    }

    /// Rooms that get windows unless told otherwise
    pub fn is_habitable(self) -> bool {
        matches!(
            self,
            RoomFunction::Living | RoomFunction::Bedroom | RoomFunction::Kitchen | RoomFunction::Dining
        )
    }

    /// Rooms other rooms open onto
    pub fn is_circulation(self) -> bool {
        matches!(self, RoomFunction::Corridor | RoomFunction::Lobby)
    }

    pub fn label(self) -> &'static str {
        match self {
            RoomFunction::Living => "Living",
            RoomFunction::Kitchen => "Kitchen",
            RoomFunction::Bedroom => "Bedroom",
            RoomFunction::Bathroom => "Bathroom",
            RoomFunction::Dining => "Dining",
            RoomFunction::Office => "Office",
            RoomFunction::Storage => "Storage",
            RoomFunction::Corridor => "Corridor",
            RoomFunction::Lobby => "Lobby",
            RoomFunction::Utility => "Utility",
            RoomFunction::Custom => "Custom",
        }
    }

    fn default_floor_finish(self) -> &'static str {
        match self {
            RoomFunction::Bathroom | RoomFunction::Kitchen | RoomFunction::Utility => "Ceramic Tile",
            _ => "Concrete",
        }
    }
}

impl fmt::Display for RoomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Finish materials shown on the room finish schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finishes {
    pub floor: String,
    pub wall: String,
    pub ceiling: String,
}

impl Finishes {
    pub fn for_function(function: RoomFunction) -> Self {
        Finishes {
            floor: function.default_floor_finish().to_string(),
            wall: "Paint".to_string(),
            ceiling: "Gypsum".to_string(),
        }
    }
}

/// A canonical, validated room requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRequirement {
    pub name: String,
    pub function: RoomFunction,
    pub area_m2: f64,
    pub count: u32,
    /// Names of requirements this room should border
    pub adjacencies: Vec<String>,
    pub must_have_window: Option<bool>,
    pub finishes: Finishes,
    pub ceiling_height_m: f64,
}

impl RoomRequirement {
    pub fn new(name: impl Into<String>, area_m2: f64) -> Self {
        let name = name.into();
        let function = RoomFunction::from_name(&name);
        RoomRequirement {
            name,
            function,
            area_m2,
            count: 1,
            adjacencies: Vec::new(),
            must_have_window: None,
            finishes: Finishes::for_function(function),
            ceiling_height_m: DEFAULT_CEILING_HEIGHT_M,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_function(mut self, function: RoomFunction) -> Self {
        self.function = function;
        self.finishes = Finishes::for_function(function);
        self
    }

    pub fn adjacent_to(mut self, name: impl Into<String>) -> Self {
        self.adjacencies.push(name.into());
        self
    }

    pub fn with_window(mut self, window: bool) -> Self {
        self.must_have_window = Some(window);
        self
    }

    /// Whether rooms from this requirement get windows
    pub fn wants_window(&self) -> bool {
        self.must_have_window.unwrap_or_else(|| self.function.is_habitable())
    }
}

pub const DEFAULT_CEILING_HEIGHT_M: f64 = 3.0;

/// Loosely-typed room request as collaborators send it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRequest {
    pub name: String,
    #[serde(default)]
    pub function: Option<RoomFunction>,
    #[serde(alias = "area")]
    pub area_m2: f64,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default, alias = "adjacent_to")]
    pub adjacencies: Vec<String>,
    #[serde(default)]
    pub must_have_window: Option<bool>,
    #[serde(default)]
    pub finishes: Option<Finishes>,
    #[serde(default)]
    pub ceiling_height_m: Option<f64>,
}

fn default_count() -> u32 {
    1
}

impl From<RoomRequirement> for RoomRequest {
    fn from(req: RoomRequirement) -> Self {
        RoomRequest {
            name: req.name,
            function: Some(req.function),
            area_m2: req.area_m2,
            count: req.count,
            adjacencies: req.adjacencies,
            must_have_window: req.must_have_window,
            finishes: Some(req.finishes),
            ceiling_height_m: Some(req.ceiling_height_m),
        }
    }
}

/// Either structured requests or free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementsInput {
    Structured(Vec<RoomRequest>),
    Text(String),
}

/// Normalized program
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomProgram {
    pub project_name: Option<String>,
    pub rooms: Vec<RoomRequirement>,
    /// Text lines that were not recognised as rooms
    pub notes: Vec<String>,
}

impl RoomProgram {
    pub fn total_area_m2(&self) -> f64 {
        self.rooms.iter().map(|r| r.area_m2 * r.count as f64).sum()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.iter().map(|r| r.count as usize).sum()
    }
}

// ============================================================================
// Interpretation
// ============================================================================

/// Normalize any accepted input into a program
pub fn interpret(input: &RequirementsInput) -> CdResult<RoomProgram> {
    match input {
        RequirementsInput::Structured(requests) => Ok(RoomProgram {
            project_name: None,
            rooms: normalize(requests.clone())?,
            notes: Vec::new(),
        }),
        RequirementsInput::Text(text) => parse_text(text),
    }
}

/// Validate structured requests, fill defaults and disambiguate names
pub fn normalize(requests: Vec<RoomRequest>) -> CdResult<Vec<RoomRequirement>> {
    if requests.is_empty() {
        return Err(CdError::parse(0, "room program is empty"));
    }

    let mut taken = HashSet::new();
    let mut rooms = Vec::with_capacity(requests.len());
    for (i, request) in requests.into_iter().enumerate() {
        let line = i + 1;
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(CdError::parse(line, "room name is empty"));
        }
        if !request.area_m2.is_finite() || request.area_m2 <= 0.0 {
            return Err(CdError::parse(line, format!("room '{}' needs a positive area", name)));
        }
        if request.count == 0 {
            return Err(CdError::parse(line, format!("room '{}' has count 0", name)));
        }
        let ceiling_height_m = request.ceiling_height_m.unwrap_or(DEFAULT_CEILING_HEIGHT_M);
        if !(ceiling_height_m > 0.0) {
            return Err(CdError::parse(line, format!("room '{}' needs a positive ceiling height", name)));
        }

        let function = request.function.unwrap_or_else(|| RoomFunction::from_name(&name));
        rooms.push(RoomRequirement {
            name: unique_name(&name, &mut taken),
            function,
            area_m2: request.area_m2,
            count: request.count,
            adjacencies: request
                .adjacencies
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            must_have_window: request.must_have_window,
            finishes: request.finishes.unwrap_or_else(|| Finishes::for_function(function)),
            ceiling_height_m,
        });
    }
    Ok(rooms)
}

/// "Office", "Office 2", "Office 3", ...
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut n = 2;
    while taken.contains(&candidate.to_lowercase()) {
        candidate = format!("{} {}", name, n);
        n += 1;
    }
    taken.insert(candidate.to_lowercase());
    candidate
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonProgram {
    Rooms(Vec<RoomRequest>),
    Document {
        #[serde(default)]
        project_name: Option<String>,
        rooms: Vec<RoomRequest>,
    },
}

/// Parse a JSON program: either a bare array of rooms or
/// `{"project_name": ..., "rooms": [...]}`
pub fn parse_json(json: &str) -> CdResult<RoomProgram> {
    let parsed: JsonProgram = serde_json::from_str(json).map_err(|e| CdError::parse(e.line(), e.to_string()))?;
    let (project_name, requests) = match parsed {
        JsonProgram::Rooms(rooms) => (None, rooms),
        JsonProgram::Document { project_name, rooms } => (project_name, rooms),
    };
    Ok(RoomProgram {
        project_name,
        rooms: normalize(requests)?,
        notes: Vec::new(),
    })
}

static ROOM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(?:[-*]\s*)?
        (?:(?P<count>\d+)\s*(?:[x×]\s*|\s+))?
        (?P<name>[^:=\[]+?)
        \s*(?::|=|\s)\s*
        (?P<area>\d+(?:[.,]\d+)?)
        \s*(?P<unit>m²|m2|sq\.?\s*m|sqm|ft²|ft2|sq\.?\s*ft|sqft)?
        \s*(?:\[(?P<opts>[^\]]*)\])?
        \s*$",
    )
    .expect("room line pattern is valid")
});

/// Parse a free-text program, one room per line
pub fn parse_text(text: &str) -> CdResult<RoomProgram> {
    let mut project_name = None;
    let mut notes = Vec::new();
    let mut requests = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if let Some(title) = line.strip_prefix("# ") {
            if project_name.is_none() {
                project_name = Some(title.trim().to_string());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let Some(caps) = ROOM_LINE.captures(line) else {
            debug!(line = line_no, text = line, "unrecognised requirements line");
            notes.push(line.to_string());
            continue;
        };

        let count: u32 = match caps.name("count") {
            Some(c) => c
                .as_str()
                .parse()
                .map_err(|_| CdError::parse(line_no, format!("bad count '{}'", c.as_str())))?,
            None => 1,
        };
        let area_text = caps["area"].replace(',', ".");
        let value: f64 = area_text
            .parse()
            .map_err(|_| CdError::parse(line_no, format!("bad area '{}'", &caps["area"])))?;
        let area_m2 = match caps.name("unit").map(|u| u.as_str().to_lowercase()) {
            Some(unit) if unit.contains("ft") => SquareMeters::from(SquareFeet(value)).0,
            _ => value,
        };
        if area_m2 <= 0.0 {
            return Err(CdError::parse(line_no, "area must be positive"));
        }

        let mut request = RoomRequest {
            name: caps["name"].trim().to_string(),
            function: None,
            area_m2,
            count,
            adjacencies: Vec::new(),
            must_have_window: None,
            finishes: None,
            ceiling_height_m: None,
        };
        if let Some(opts) = caps.name("opts") {
            apply_options(&mut request, opts.as_str());
        }
        requests.push(request);
    }

    if requests.is_empty() {
        return Err(CdError::parse(
            text.lines().count(),
            "no room lines recognised (expected '[count]x Name: area [unit]')",
        ));
    }

    Ok(RoomProgram {
        project_name,
        rooms: normalize(requests)?,
        notes,
    })
}

/// `[adj: Kitchen, Dining; window]`
fn apply_options(request: &mut RoomRequest, opts: &str) {
    for opt in opts.split(';').map(str::trim).filter(|o| !o.is_empty()) {
        let lower = opt.to_lowercase();
        if let Some((key, value)) = opt.split_once(':') {
            let key = key.trim().to_lowercase();
            if key.starts_with("adj") || key == "next to" {
                request
                    .adjacencies
                    .extend(value.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()));
            } else if key == "ceiling" {
                request.ceiling_height_m = value.trim().trim_end_matches('m').trim().parse().ok();
            }
        } else if lower == "window" {
            request.must_have_window = Some(true);
        } else if lower == "no window" || lower == "nowindow" {
            request.must_have_window = Some(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(RoomFunction::from_name("Master Bedroom"), RoomFunction::Bedroom);
        assert_eq!(RoomFunction::from_name("Guest Bath"), RoomFunction::Bathroom);
        assert_eq!(RoomFunction::from_name("Entry"), RoomFunction::Lobby);
        assert_eq!(RoomFunction::from_name("Hallway"), RoomFunction::Corridor);
        assert_eq!(RoomFunction::from_name("Workshop"), RoomFunction::Custom);
    }

    #[test]
    fn test_parse_text_program() {
        let text = "# Riverside House\nLiving: 25 m2\n2x Bedroom: 16 sqm [adj: Living; window]\nBathroom 6\nStorage: 40 sqft\n";
        let program = parse_text(text).unwrap();
        assert_eq!(program.project_name.as_deref(), Some("Riverside House"));
        assert_eq!(program.rooms.len(), 4);

        let bed = &program.rooms[1];
        assert_eq!(bed.name, "Bedroom");
        assert_eq!(bed.count, 2);
        assert_eq!(bed.function, RoomFunction::Bedroom);
        assert_eq!(bed.adjacencies, vec!["Living".to_string()]);
        assert_eq!(bed.must_have_window, Some(true));

        assert_eq!(program.rooms[2].area_m2, 6.0);
        assert!((program.rooms[3].area_m2 - 3.716).abs() < 0.01);
        assert_eq!(program.room_count(), 5);
    }

    #[test]
    fn test_parse_text_collects_notes() {
        let program = parse_text("Open plan please\nKitchen: 12\n").unwrap();
        assert_eq!(program.rooms.len(), 1);
        assert_eq!(program.notes, vec!["Open plan please".to_string()]);
    }

    #[test]
    fn test_parse_text_without_rooms_fails() {
        let err = parse_text("just some words\nand more words").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_duplicate_names_get_suffix() {
        let program = parse_text("Office: 10\nOffice: 12\noffice: 9").unwrap();
        let names: Vec<_> = program.rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Office", "Office 2", "office 3"]);
    }

    #[test]
    fn test_structured_validation() {
        let bad = vec![RoomRequest::from(RoomRequirement::new("Den", 0.0))];
        assert!(normalize(bad).is_err());
        let zero = vec![RoomRequest::from(RoomRequirement::new("Den", 10.0).with_count(0))];
        assert!(normalize(zero).is_err());
    }

    #[test]
    fn test_parse_json_forms() {
        let bare = parse_json(r#"[{"name": "Living", "area": 25}, {"name": "Bedroom", "area": 16, "count": 2}]"#).unwrap();
        assert_eq!(bare.rooms[0].function, RoomFunction::Living);
        assert_eq!(bare.rooms[1].count, 2);

        let doc = parse_json(r#"{"project_name": "Loft", "rooms": [{"name": "Studio", "area_m2": 30, "function": "living"}]}"#)
            .unwrap();
        assert_eq!(doc.project_name.as_deref(), Some("Loft"));
        assert_eq!(doc.rooms[0].function, RoomFunction::Living);
    }

    #[test]
    fn test_input_untagged() {
        let text: RequirementsInput = serde_json::from_str(r#""Kitchen: 10""#).unwrap();
        assert!(matches!(text, RequirementsInput::Text(_)));
        let structured: RequirementsInput = serde_json::from_str(r#"[{"name": "Kitchen", "area": 10}]"#).unwrap();
        assert_eq!(interpret(&structured).unwrap().rooms.len(), 1);
    }

    #[test]
    fn test_window_defaults() {
        assert!(RoomRequirement::new("Bedroom", 12.0).wants_window());
        assert!(!RoomRequirement::new("Storage", 3.0).wants_window());
        assert!(RoomRequirement::new("Storage", 3.0).with_window(true).wants_window());
    }
}
