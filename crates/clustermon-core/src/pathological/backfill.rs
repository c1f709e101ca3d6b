//! Retroactive pathological marking
//!
//! The ingest path only labels an event once its count crosses the
//! threshold. Earlier occurrences of the same message were recorded as
//! plain instants; this pass finds them through the `hmsg/<hash>` locator
//! token and labels them too.

use tracing::info;

use crate::interval::Intervals;
use crate::pathological::patterns::{
    NEW_LABEL, hashed_locator, is_interesting, is_pathological, labeled, strip_counts,
};

struct Marked {
    locator: String,
    /// Labeled message with counts removed
    message: String,
    hash: String,
}

/// Label earlier occurrences of every new pathological repeat.
///
/// Returns the number of intervals rewritten. Running it twice changes
/// nothing the second time.
pub fn mark_missed_pathological(intervals: &mut Intervals) -> usize {
    let marked: Vec<Marked> = intervals
        .iter()
        .filter(|i| is_pathological(i.message()) && !is_interesting(i.message()))
        .filter_map(|i| {
            let (_, hash) = i.locator().rsplit_once(" hmsg/")?;
            Some(Marked {
                locator: i.locator().to_string(),
                message: strip_counts(i.message()).into_owned(),
                hash: hash.to_string(),
            })
        })
        .collect();
    if marked.is_empty() {
        return 0;
    }

    let mut rewritten = 0;
    for interval in intervals.iter_mut() {
        if is_pathological(interval.message()) {
            continue;
        }
        let hashed = format!("{} hmsg/", interval.locator());
        let candidate = labeled(NEW_LABEL, &strip_counts(interval.message()));
        let hit = marked.iter().any(|m| {
            m.locator.len() == hashed.len() + m.hash.len()
                && m.locator.starts_with(&hashed)
                && m.message == candidate
        });
        if hit {
            let message = labeled(NEW_LABEL, interval.message());
            interval.condition.locator = hashed_locator(interval.locator(), &message);
            interval.condition.message = message;
            rewritten += 1;
        }
    }
    info!(marked = marked.len(), rewritten, "pathological backfill complete");
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Condition, EventInterval};
    use crate::pathological::classifier::Placement;
    use chrono::{TimeZone, Utc};

    const LOCATOR: &str = "ns/openshift-dns pod/dns-1 node/m0";

    fn timeline() -> Intervals {
        let at = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
        let first = Condition::warning(LOCATOR, "reason/Boom it broke");
        let earlier = Condition::warning(LOCATOR, "reason/Boom it broke (5 times)");
        let labeled = Placement::New.label(Condition::warning(LOCATOR, "reason/Boom it broke (21 times)"));
        let unrelated = Condition::warning(LOCATOR, "reason/Other thing (5 times)");
        let elsewhere = Condition::warning("ns/openshift-dns pod/dns-2 node/m0", "reason/Boom it broke (7 times)");
        vec![
            EventInterval::instant(first, at(0)),
            EventInterval::instant(earlier, at(10)),
            EventInterval::new(labeled, at(20), at(21)),
            EventInterval::instant(unrelated, at(30)),
            EventInterval::instant(elsewhere, at(40)),
        ]
        .into()
    }

    #[test]
    fn earlier_occurrences_are_labeled() {
        let mut intervals = timeline();
        let marked_locator = intervals[2].locator().to_string();

        assert_eq!(mark_missed_pathological(&mut intervals), 2);
        assert_eq!(intervals[0].message(), "pathological/true reason/Boom it broke");
        assert_eq!(intervals[0].locator(), marked_locator);
        assert_eq!(
            intervals[1].message(),
            "pathological/true reason/Boom it broke (5 times)"
        );
        assert_eq!(intervals[1].locator(), marked_locator);
    }

    #[test]
    fn other_messages_and_locators_are_untouched() {
        let mut intervals = timeline();
        mark_missed_pathological(&mut intervals);
        assert_eq!(intervals[3].message(), "reason/Other thing (5 times)");
        assert_eq!(intervals[3].locator(), LOCATOR);
        assert_eq!(intervals[4].message(), "reason/Boom it broke (7 times)");
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut intervals = timeline();
        mark_missed_pathological(&mut intervals);
        let once = intervals.clone();
        assert_eq!(mark_missed_pathological(&mut intervals), 0);
        assert_eq!(intervals, once);
    }

    #[test]
    fn known_repeats_are_not_sources() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let known = Placement::Known.label(Condition::warning(LOCATOR, "reason/Boom it broke (21 times)"));
        let mut intervals: Intervals = vec![
            EventInterval::instant(Condition::warning(LOCATOR, "reason/Boom it broke"), at),
            EventInterval::instant(known, at),
        ]
        .into();
        assert_eq!(mark_missed_pathological(&mut intervals), 0);
    }
}
