//! Two-block context assembly.
//!
//! Block 1 is the rendered observation log — a pure function of the
//! observation list and today's date, so its bytes are identical across
//! turns whenever the log is unchanged. That byte stability is what
//! makes the prefix provider-cacheable. Block 2 is the rolling session
//! tail and changes freely.

use chrono::NaiveDate;

use super::observation::Observation;
use super::session::SessionMessage;

pub const OBSERVATION_BLOCK_START: &str = "<observation_log>";
pub const OBSERVATION_BLOCK_END: &str = "</observation_log>";
pub const SESSION_BLOCK_START: &str = "<session>";
pub const SESSION_BLOCK_END: &str = "</session>";

/// Render Block 1. Entries are ordered newest `observed_on` first;
/// insertion order breaks ties (the sort is stable).
pub fn block1(observations: &[Observation], today: NaiveDate) -> String {
    let mut ordered: Vec<&Observation> = observations.iter().collect();
    ordered.sort_by(|a, b| b.observed_on.cmp(&a.observed_on));

    let mut out = String::from(OBSERVATION_BLOCK_START);
    out.push('\n');
    for observation in ordered {
        out.push_str(&observation.render(today));
        out.push_str("\n\n");
    }
    out.push_str(OBSERVATION_BLOCK_END);
    out.push('\n');
    out
}

/// Assemble the full context: stable Block 1 followed by the rolling
/// session block.
pub fn build(
    observations: &[Observation],
    session: &[SessionMessage],
    today: NaiveDate,
) -> String {
    let mut out = block1(observations, today);
    out.push_str(SESSION_BLOCK_START);
    out.push('\n');
    for message in session {
        out.push_str(message.role.as_str());
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out.push_str(SESSION_BLOCK_END);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Role;
    use crate::memory::observation::Priority;
    use crate::security::Trust;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn observations() -> Vec<Observation> {
        vec![
            Observation::new(Priority::Yellow, date(2026, 2, 15), "older"),
            Observation::new(Priority::Red, date(2026, 2, 20), "newest")
                .with_event_date(date(2026, 2, 18))
                .external(Some("https://example".to_string())),
            Observation::new(Priority::Green, date(2026, 2, 15), "older tie"),
        ]
    }

    fn message(content: &str) -> SessionMessage {
        SessionMessage {
            role: Role::User,
            content: content.to_string(),
            trust: Trust::Internal,
            origin: None,
            ts: Utc::now(),
        }
    }

    #[test]
    fn block1_orders_newest_first_with_stable_ties() {
        let today = date(2026, 2, 20);
        let rendered = block1(&observations(), today);

        let newest = rendered.find("newest").unwrap();
        let older = rendered.find("older").unwrap();
        let tie = rendered.find("older tie").unwrap();
        assert!(newest < older);
        assert!(older < tie);
    }

    #[test]
    fn block1_is_byte_identical_across_calls() {
        let today = date(2026, 2, 20);
        let observations = observations();
        assert_eq!(block1(&observations, today), block1(&observations, today));
    }

    #[test]
    fn build_starts_with_block1_for_any_session_tail() {
        let today = date(2026, 2, 20);
        let observations = observations();
        let prefix = block1(&observations, today);

        let a = build(&observations, &[message("tail one")], today);
        let b = build(&observations, &[message("a different tail")], today);
        assert!(a.starts_with(&prefix));
        assert!(b.starts_with(&prefix));
        assert_ne!(a, b);
    }

    #[test]
    fn session_block_carries_roles_and_content() {
        let today = date(2026, 2, 20);
        let rendered = build(&[], &[message("hello there")], today);
        assert!(rendered.contains("<session>\nuser: hello there\n</session>"));
    }

    #[test]
    fn external_entries_carry_ext_marker() {
        let today = date(2026, 2, 20);
        let rendered = block1(&observations(), today);
        assert!(rendered.contains("🔴 [EXT] observed_on:2026-02-20"));
        assert!(rendered.contains("relative:2_days_ago"));
    }
}
