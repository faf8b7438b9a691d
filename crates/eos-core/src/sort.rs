//! Multi-key ordering of filtered records.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::normalize::{parse_calendar_date, DAYS_OPEN_ENDED};
use crate::{Catalog, OpportunityRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortProfile {
    /// Featured, then soonest deadline, then catalog tiebreaks.
    #[default]
    Urgency,
    /// Featured, then category / priority / speed, deadline not consulted.
    Curated,
}

impl FromStr for SortProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgency" | "deadline" => Ok(Self::Urgency),
            "curated" | "priority" => Ok(Self::Curated),
            other => Err(format!("unknown sort profile: {other}")),
        }
    }
}

impl fmt::Display for SortProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Urgency => f.write_str("urgency"),
            Self::Curated => f.write_str("curated"),
        }
    }
}

pub fn priority_rank(priority: &str) -> u8 {
    match priority.trim().to_ascii_lowercase().as_str() {
        "high" => 0,
        "medium" => 1,
        "low" => 2,
        _ => 3,
    }
}

pub fn speed_rank(speed: &str) -> u8 {
    match speed.trim().to_ascii_lowercase().as_str() {
        "fast" => 0,
        "medium" => 1,
        "slow" => 2,
        _ => 3,
    }
}

/// Missing, unparseable, zero or past countdowns sort with the open-ended ones.
pub fn deadline_sort_key(days_left: i64) -> i64 {
    if days_left <= 0 {
        DAYS_OPEN_ENDED
    } else {
        days_left
    }
}

pub fn compare(
    a: &OpportunityRecord,
    b: &OpportunityRecord,
    catalog: &Catalog,
    profile: SortProfile,
) -> Ordering {
    let featured = b.featured.cmp(&a.featured);
    let category = catalog
        .category_rank(&a.category)
        .cmp(&catalog.category_rank(&b.category));
    let priority = priority_rank(&a.priority_for_user).cmp(&priority_rank(&b.priority_for_user));
    let speed = speed_rank(&a.money_speed).cmp(&speed_rank(&b.money_speed));
    let recency = parse_calendar_date(&b.date_found).cmp(&parse_calendar_date(&a.date_found));
    let insertion = a.position.cmp(&b.position);

    match profile {
        SortProfile::Urgency => featured
            .then(deadline_sort_key(a.days_left).cmp(&deadline_sort_key(b.days_left)))
            .then(category)
            .then(priority)
            .then(speed)
            .then(recency)
            .then(insertion),
        SortProfile::Curated => featured
            .then(category)
            .then(priority)
            .then(speed)
            .then(recency)
            .then(insertion),
    }
}

/// Stable in-place sort.
pub fn sort_records<R: Borrow<OpportunityRecord>>(
    records: &mut [R],
    catalog: &Catalog,
    profile: SortProfile,
) {
    records.sort_by(|a, b| {
        compare(
            Borrow::<OpportunityRecord>::borrow(a),
            Borrow::<OpportunityRecord>::borrow(b),
            catalog,
            profile,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize, RawRecord};
    use chrono::NaiveDate;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
    }

    fn rec(id: &str, extra: serde_json::Value, position: usize) -> OpportunityRecord {
        let mut raw = RawRecord::from_pairs([("id", json!(id)), ("title", json!(id))]);
        if let serde_json::Value::Object(map) = extra {
            for (k, v) in map {
                raw.insert(k, v);
            }
        }
        normalize(&raw, position, today())
    }

    fn order(records: &[OpportunityRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn featured_always_first() {
        let mut records = vec![
            rec("soon", json!({"deadline": "2026-02-02", "priorityForUser": "high"}), 0),
            rec("feat", json!({"featured": true, "category": "Lottery"}), 1),
        ];
        for profile in [SortProfile::Urgency, SortProfile::Curated] {
            sort_records(&mut records, &Catalog::default(), profile);
            assert_eq!(records[0].id, "feat");
        }
    }

    #[test]
    fn urgency_orders_by_deadline_then_tiebreaks() {
        let mut records = vec![
            rec("open", json!({"deadline": "Ongoing"}), 0),
            rec("later", json!({"deadline": "2026-03-01"}), 1),
            rec("unknown", json!({}), 2),
            rec("soon", json!({"deadline": "2026-02-05"}), 3),
            rec("today", json!({"deadline": "2026-02-01", "category": "Grants"}), 4),
        ];
        sort_records(&mut records, &Catalog::default(), SortProfile::Urgency);
        // open-ended, unknown and zero-day records share key 999; "today" wins on category.
        assert_eq!(order(&records), vec!["soon", "later", "today", "open", "unknown"]);
    }

    #[test]
    fn curated_orders_by_category_priority_speed() {
        let mut records = vec![
            rec("other-fast", json!({"moneySpeed": "Fast"}), 0),
            rec("refund-low", json!({"category": "Unclaimed money & refunds", "priority": "low"}), 1),
            rec("refund-high", json!({"category": "Unclaimed money & refunds", "priority": "high"}), 2),
            rec("other-slow", json!({"moneySpeed": "Slow"}), 3),
        ];
        sort_records(&mut records, &Catalog::default(), SortProfile::Curated);
        assert_eq!(
            order(&records),
            vec!["refund-high", "refund-low", "other-fast", "other-slow"]
        );
    }

    #[test]
    fn recency_then_insertion_break_remaining_ties() {
        let mut records = vec![
            rec("old", json!({"date_found": "2026-01-01"}), 0),
            rec("none-a", json!({}), 1),
            rec("new", json!({"date_found": "2026-01-20"}), 2),
            rec("none-b", json!({}), 3),
        ];
        sort_records(&mut records, &Catalog::default(), SortProfile::Curated);
        assert_eq!(order(&records), vec!["new", "old", "none-a", "none-b"]);
    }

    #[test]
    fn sorting_twice_is_stable() {
        let mut records = vec![
            rec("b", json!({"deadline": "2026-02-10"}), 0),
            rec("a", json!({"deadline": "2026-02-10"}), 1),
            rec("c", json!({"featured": "yes"}), 2),
        ];
        sort_records(&mut records, &Catalog::default(), SortProfile::Urgency);
        let first = order(&records).into_iter().map(String::from).collect::<Vec<_>>();
        sort_records(&mut records, &Catalog::default(), SortProfile::Urgency);
        assert_eq!(order(&records), first);
        assert_eq!(first, vec!["c", "b", "a"]);
    }

    #[test]
    fn ranks_and_profile_parsing() {
        assert!(priority_rank("HIGH") < priority_rank("medium"));
        assert!(priority_rank("low") < priority_rank("whenever"));
        assert!(speed_rank("Fast") < speed_rank("Slow"));
        assert_eq!(deadline_sort_key(0), 999);
        assert_eq!(deadline_sort_key(-1), 999);
        assert_eq!(deadline_sort_key(12), 12);
        assert_eq!("Curated".parse::<SortProfile>().unwrap(), SortProfile::Curated);
        assert!("random".parse::<SortProfile>().is_err());
    }
}
