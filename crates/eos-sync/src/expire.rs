use chrono::NaiveDate;
use eos_core::normalize::parse_calendar_date;
use eos_core::RawRecord;
use tracing::debug;

/// Drop records whose deadline is a date before `today`. Open-ended or
/// unparseable deadlines are kept. Returns the survivors and the removed count.
pub fn expire(records: Vec<RawRecord>, today: NaiveDate) -> (Vec<RawRecord>, usize) {
    let before = records.len();
    let kept: Vec<RawRecord> = records
        .into_iter()
        .filter(|record| {
            let expired = record
                .text(&["deadline"])
                .and_then(|deadline| parse_calendar_date(&deadline))
                .is_some_and(|date| date < today);
            if expired {
                debug!(title = %record.title().unwrap_or_default(), "expiring record");
            }
            !expired
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_deadline(deadline: &str) -> RawRecord {
        RawRecord::from_pairs([("title", json!(deadline)), ("deadline", json!(deadline))])
    }

    #[test]
    fn removes_only_past_dated_records() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let records = vec![
            with_deadline("2026-05-31"),
            with_deadline("2026-06-01"),
            with_deadline("12/31/2026"),
            with_deadline("Ongoing"),
            with_deadline("Check program"),
            with_deadline(""),
            with_deadline("01/15/2020"),
        ];
        let (kept, removed) = expire(records, today);
        assert_eq!(removed, 2);
        let titles: Vec<String> = kept.iter().filter_map(RawRecord::title).collect();
        assert_eq!(titles, vec!["2026-06-01", "12/31/2026", "Ongoing", "Check program"]);
    }
}
