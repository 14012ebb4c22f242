use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};

pub type AssignmentId = i64;
pub type BlockId = i64;

pub const DEFAULT_WORK_INTERVAL_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_SHORT_BREAKS_BEFORE_LONG: u32 = 3;
pub const DEFAULT_PREFERRED_START_HOUR: u32 = 9;
pub const DEFAULT_PREFERRED_END_HOUR: u32 = 17;

const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Study,
    Busy,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Study => "study",
            BlockType::Busy => "busy",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "study" => Ok(BlockType::Study),
            "busy" => Ok(BlockType::Busy),
            other => Err(format!("block_type must be 'study' or 'busy', got '{other}'")),
        }
    }
}

/// How a block is presented. Breaks are persisted as `busy` and recognized by title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Study,
    Busy,
    Break,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Study => "study",
            BlockKind::Busy => "busy",
            BlockKind::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarBlock {
    pub id: BlockId,
    pub title: String,
    #[serde(with = "local_timestamp")]
    pub start: NaiveDateTime,
    #[serde(with = "local_timestamp")]
    pub end: NaiveDateTime,
    pub block_type: BlockType,
    #[serde(default)]
    pub assignment_id: Option<AssignmentId>,
}

impl CalendarBlock {
    pub fn from_new(id: BlockId, payload: &NewBlock) -> Self {
        Self {
            id,
            title: payload.title.clone(),
            start: payload.start,
            end: payload.end,
            block_type: payload.block_type,
            assignment_id: payload.assignment_id,
        }
    }

    pub fn kind(&self) -> BlockKind {
        if is_break_title(&self.title) {
            BlockKind::Break
        } else if self.block_type == BlockType::Busy {
            BlockKind::Busy
        } else {
            BlockKind::Study
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_study_for(&self, assignment_id: AssignmentId) -> bool {
        self.block_type == BlockType::Study && self.assignment_id == Some(assignment_id)
    }
}

/// Body of `POST /api/calendar/blocks`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewBlock {
    pub title: String,
    #[serde(with = "local_timestamp")]
    pub start: NaiveDateTime,
    #[serde(with = "local_timestamp")]
    pub end: NaiveDateTime,
    pub block_type: BlockType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<AssignmentId>,
}

impl NewBlock {
    pub fn study(
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        assignment_id: AssignmentId,
    ) -> Self {
        Self {
            title: title.to_string(),
            start: truncate_seconds(start),
            end: truncate_seconds(end),
            block_type: BlockType::Study,
            assignment_id: Some(assignment_id),
        }
    }

    pub fn busy(title: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            title: title.to_string(),
            start: truncate_seconds(start),
            end: truncate_seconds(end),
            block_type: BlockType::Busy,
            assignment_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("block.title must not be empty".to_string());
        }
        if self.end <= self.start {
            return Err("block.end must be after block.start".to_string());
        }
        if self.block_type == BlockType::Busy && self.assignment_id.is_some() {
            return Err("block.assignment_id is only allowed on study blocks".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub name: String,
    #[serde(alias = "estimated_time_minutes")]
    pub estimated_time: i64,
    #[serde(default, alias = "time_spent_minutes")]
    pub time_spent: i64,
    #[serde(default, deserialize_with = "deserialize_due_date")]
    pub due_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub completed: bool,
}

/// Per-user pacing settings as returned by `GET /api/settings/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "work_interval_minutes")]
    pub work_interval: u32,
    #[serde(alias = "short_break_minutes")]
    pub short_break: u32,
    #[serde(alias = "long_break_minutes")]
    pub long_break: u32,
    #[serde(alias = "short_breaks_before_long_break_count")]
    pub short_breaks_before_long: u32,
    pub preferred_start_hour: Option<u32>,
    pub preferred_end_hour: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_interval: DEFAULT_WORK_INTERVAL_MINUTES,
            short_break: DEFAULT_SHORT_BREAK_MINUTES,
            long_break: DEFAULT_LONG_BREAK_MINUTES,
            short_breaks_before_long: DEFAULT_SHORT_BREAKS_BEFORE_LONG,
            preferred_start_hour: Some(DEFAULT_PREFERRED_START_HOUR),
            preferred_end_hour: Some(DEFAULT_PREFERRED_END_HOUR),
        }
    }
}

/// Settings after zero values and out-of-range hours have been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub work_interval: u32,
    pub short_break: u32,
    pub long_break: u32,
    pub cadence: u32,
    pub preferred_start_hour: u32,
    pub preferred_end_hour: u32,
}

impl Settings {
    /// Clamps the preferred window into `[day_start_hour, day_end_hour]`; an empty
    /// or inverted window falls back to the whole working day.
    pub fn pacing(&self, day_start_hour: u32, day_end_hour: u32) -> Pacing {
        let non_zero = |value: u32, fallback: u32| if value == 0 { fallback } else { value };
        let preferred_start = self
            .preferred_start_hour
            .unwrap_or(DEFAULT_PREFERRED_START_HOUR)
            .clamp(day_start_hour, day_end_hour);
        let preferred_end = self
            .preferred_end_hour
            .unwrap_or(DEFAULT_PREFERRED_END_HOUR)
            .clamp(day_start_hour, day_end_hour);
        let (preferred_start_hour, preferred_end_hour) = if preferred_start < preferred_end {
            (preferred_start, preferred_end)
        } else {
            (day_start_hour, day_end_hour)
        };

        Pacing {
            work_interval: non_zero(self.work_interval, DEFAULT_WORK_INTERVAL_MINUTES),
            short_break: non_zero(self.short_break, DEFAULT_SHORT_BREAK_MINUTES),
            long_break: non_zero(self.long_break, DEFAULT_LONG_BREAK_MINUTES),
            cadence: non_zero(self.short_breaks_before_long, DEFAULT_SHORT_BREAKS_BEFORE_LONG),
            preferred_start_hour,
            preferred_end_hour,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Short,
    Long,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakActivity {
    pub id: i64,
    pub name: String,
    pub activity_type: ActivityType,
}

pub fn is_break_title(title: &str) -> bool {
    let lowered = title.to_ascii_lowercase();
    lowered.contains("break") || lowered.contains("rest")
}

pub fn truncate_seconds(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(value)
}

pub fn format_local_timestamp(value: NaiveDateTime) -> String {
    truncate_seconds(value).format(LOCAL_TIMESTAMP_FORMAT).to_string()
}

/// Accepts naive local timestamps (optionally with fractional seconds or without
/// seconds) and offset-carrying ones, whose offset is dropped.
pub fn parse_local_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    let trimmed = value.trim();
    let without_zulu = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    if let Ok(parsed) = NaiveDateTime::parse_from_str(without_zulu, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(parsed);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(without_zulu, "%Y-%m-%dT%H:%M") {
        return Ok(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_local());
    }
    Err(format!("'{value}' is not a YYYY-MM-DDTHH:MM:SS timestamp"))
}

/// A bare date means "due by the end of that day".
pub fn parse_due_date(value: &str) -> Result<NaiveDateTime, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN) + Duration::days(1));
    }
    parse_local_timestamp(value)
}

fn deserialize_due_date<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_due_date(value).map(Some).map_err(serde::de::Error::custom),
    }
}

pub mod local_timestamp {
    use super::{format_local_timestamp, parse_local_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_local_timestamp(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_local_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
