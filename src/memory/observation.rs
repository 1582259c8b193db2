//! Observation values, the entry grammar, and the relative-date model.
//!
//! An observation is a dated, priority-tagged, sanitized textual record.
//! The on-disk header is one line:
//!
//! ```text
//! 🔴 observed_on:2026-02-20 event_date:2026-02-18 [EXT] origin:https://example
//! OAuth token expired during upload step.
//! ```
//!
//! `relative` ("2_days_ago") is derived from today and `event_date` at
//! render time and never stored. The parser is deliberately tolerant:
//! LLM output with stray separators or missing dates still yields
//! usable entries, and anything without a priority glyph is skipped and
//! counted rather than failing the load.

use chrono::NaiveDate;

use crate::security::Trust;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Red,
    Yellow,
    Green,
}

impl Priority {
    pub fn glyph(&self) -> &'static str {
        match self {
            Priority::Red => "🔴",
            Priority::Yellow => "🟡",
            Priority::Green => "🟢",
        }
    }

    fn all() -> [Priority; 3] {
        [Priority::Red, Priority::Yellow, Priority::Green]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub priority: Priority,
    /// When this was written down.
    pub observed_on: NaiveDate,
    /// When the described event happened. Never after `observed_on`.
    pub event_date: NaiveDate,
    pub trust: Trust,
    /// URL or file path the content came from, for external entries.
    pub origin: Option<String>,
    pub body: String,
}

impl Observation {
    pub fn new(priority: Priority, observed_on: NaiveDate, body: impl Into<String>) -> Self {
        Self {
            priority,
            observed_on,
            event_date: observed_on,
            trust: Trust::Internal,
            origin: None,
            body: body.into(),
        }
    }

    pub fn with_event_date(mut self, event_date: NaiveDate) -> Self {
        self.event_date = event_date.min(self.observed_on);
        self
    }

    pub fn external(mut self, origin: Option<String>) -> Self {
        self.trust = Trust::External;
        self.origin = origin;
        self
    }

    /// Serialize to the on-disk entry form (no `relative` key).
    pub fn serialize_entry(&self) -> String {
        let mut header = format!(
            "{} observed_on:{} event_date:{}",
            self.priority.glyph(),
            self.observed_on,
            self.event_date
        );
        if self.trust == Trust::External {
            header.push_str(" [EXT]");
        }
        if let Some(ref origin) = self.origin {
            header.push_str(" origin:");
            header.push_str(origin);
        }
        if self.body.is_empty() {
            header
        } else {
            format!("{}\n{}", header, self.body)
        }
    }

    /// Render for the assembled context: `[EXT]` directly after the
    /// glyph and a derived `relative` bucket in the header. A pure
    /// function of the observation and `today`.
    pub fn render(&self, today: NaiveDate) -> String {
        let mut header = self.priority.glyph().to_string();
        if self.trust == Trust::External {
            header.push_str(" [EXT]");
        }
        header.push_str(&format!(
            " observed_on:{} event_date:{} relative:{}",
            self.observed_on,
            self.event_date,
            relative_date(today, self.event_date)
        ));
        if let Some(ref origin) = self.origin {
            header.push_str(" origin:");
            header.push_str(origin);
        }
        if self.body.is_empty() {
            header
        } else {
            format!("{}\n{}", header, self.body)
        }
    }
}

/// Human bucket for `today − event_date`.
pub fn relative_date(today: NaiveDate, event_date: NaiveDate) -> String {
    let days = (today - event_date).num_days();
    match days {
        d if d <= 0 => "0_days_ago".to_string(),
        1 => "1_day_ago".to_string(),
        d if d < 14 => format!("{}_days_ago", d),
        d if d < 61 => format!("{}_weeks_ago", d / 7),
        d if d < 365 => format!("{}_months_ago", d / 30),
        d if d < 730 => "1_year_ago".to_string(),
        d => format!("{}_years_ago", d / 365),
    }
}

/// Parse a whole log: entries separated by two-or-more newlines.
///
/// Returns the parsed observations in file order plus the count of
/// malformed (glyph-less) entries that were skipped.
pub fn parse_log(text: &str, fallback_date: NaiveDate) -> (Vec<Observation>, usize) {
    let mut observations = Vec::new();
    let mut malformed = 0;

    for block in text.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        match parse_entry(block, fallback_date) {
            Some(obs) => observations.push(obs),
            None => malformed += 1,
        }
    }

    (observations, malformed)
}

/// Parse one entry with the tolerant header grammar.
///
/// A priority glyph, optional separators (`:`, `-`, whitespace), then
/// whitespace-delimited header tokens: `observed_on:`/`event_date:`
/// dates, `origin:`, the `[EXT]` marker, and ignored legacy keys. The
/// first token that is none of these starts the body, which runs to the
/// end of the block. Missing `observed_on` falls back to the supplied
/// date; missing `event_date` defaults to `observed_on`.
pub fn parse_entry(block: &str, fallback_date: NaiveDate) -> Option<Observation> {
    let text = block.trim();
    let priority = Priority::all()
        .into_iter()
        .find(|p| text.starts_with(p.glyph()))?;

    let rest = text[priority.glyph().len()..].trim_start_matches([':', '-', ' ', '\t']);
    let (first_line, tail) = match rest.find('\n') {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };

    let mut observed_on = None;
    let mut event_date = None;
    let mut origin: Option<String> = None;
    let mut trust = Trust::Internal;

    let mut line = first_line;
    loop {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            line = trimmed;
            break;
        }
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let token = &trimmed[..end];

        let consumed = if token == "[EXT]" {
            trust = Trust::External;
            true
        } else if let Some(value) = token.strip_prefix("observed_on:") {
            observed_on = parse_date(value);
            true
        } else if let Some(value) = token.strip_prefix("event_date:") {
            event_date = parse_date(value);
            true
        } else if let Some(value) = token.strip_prefix("origin:") {
            origin = Some(value.to_string());
            true
        } else {
            // Legacy keys are dropped; relative is always re-derived
            token.starts_with("relative:") || token.starts_with("trust:")
        };

        if consumed {
            line = &trimmed[end..];
        } else {
            line = trimmed;
            break;
        }
    }

    let mut body = String::new();
    if !line.is_empty() {
        body.push_str(line);
    }
    if let Some(tail) = tail {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(tail);
    }

    let observed_on = observed_on.unwrap_or(fallback_date);
    let event_date = event_date.unwrap_or(observed_on).min(observed_on);

    Some(Observation {
        priority,
        observed_on,
        event_date,
        trust,
        origin,
        body: body.trim().to_string(),
    })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
