use std::sync::Arc;

use serde::Serialize;
use serde::ser::SerializeStruct;
use time::{Duration, OffsetDateTime, Time};

use super::{BlockStore, MemoryRecord, format_timestamp};

const FALLBACK_LIMIT: usize = 10;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lang {
    En,
    Ko,
}

/// Resolved time range for a relative expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    /// Expression that produced the window, as matched.
    pub expression: String,
    /// Inclusive lower bound.
    pub start: OffsetDateTime,
    /// Inclusive upper bound.
    pub end: OffsetDateTime,
}

impl TimeWindow {
    fn new(expression: impl Into<String>, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            expression: expression.into(),
            start,
            end,
        }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let render = |at: OffsetDateTime| {
            format_timestamp(at).map_err(|err| serde::ser::Error::custom(err.to_string()))
        };
        let mut state = serializer.serialize_struct("TimeWindow", 3)?;
        state.serialize_field("expression", &self.expression)?;
        state.serialize_field("start", &render(self.start)?)?;
        state.serialize_field("end", &render(self.end)?)?;
        state.end()
    }
}

/// Outcome of a time-aware search.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalSearch {
    /// Window resolved from the query, if any.
    pub window: Option<TimeWindow>,
    /// Matching blocks, newest first.
    pub records: Vec<MemoryRecord>,
}

/// Resolves relative time references ("yesterday", "3 days ago", "어제", "2일 전") against
/// the block store.
pub struct TemporalReasoner {
    block_store: Arc<BlockStore>,
    default_language: String,
}

impl TemporalReasoner {
    /// Create a reasoner over `block_store`. `default_language` is `auto`, `en`, or `ko`.
    pub fn create(block_store: Arc<BlockStore>, default_language: impl Into<String>) -> Self {
        Self {
            block_store,
            default_language: default_language.into(),
        }
    }

    /// Language used when a caller does not pass one.
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Block store this reasoner searches.
    pub fn block_store(&self) -> &Arc<BlockStore> {
        &self.block_store
    }

    /// Resolve the first time expression found in `text`, relative to now.
    pub fn resolve(&self, text: &str, language: Option<&str>) -> Option<TimeWindow> {
        let language = language.unwrap_or(self.default_language.as_str());
        resolve_at(text, language, OffsetDateTime::now_utc())
    }

    /// Blocks created inside the window named by `query`; plain content search otherwise.
    pub fn search(&self, query: &str, language: Option<&str>) -> TemporalSearch {
        match self.resolve(query, language) {
            Some(window) => {
                let mut records: Vec<MemoryRecord> = self
                    .block_store
                    .all()
                    .into_iter()
                    .filter(|record| record.created_at().is_some_and(|at| window.contains(at)))
                    .collect();
                records.reverse();
                TemporalSearch {
                    window: Some(window),
                    records,
                }
            }
            None => TemporalSearch {
                window: None,
                records: self.block_store.search(query, FALLBACK_LIMIT),
            },
        }
    }
}

fn accepts(language: &str, lang: Lang) -> bool {
    match language.to_lowercase().as_str() {
        "en" | "english" => lang == Lang::En,
        "ko" | "korean" => lang == Lang::Ko,
        _ => true,
    }
}

/// Resolve `text` relative to `now`. Counted expressions win over fixed keywords.
pub(crate) fn resolve_at(text: &str, language: &str, now: OffsetDateTime) -> Option<TimeWindow> {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    let midnight = now.replace_time(Time::MIDNIGHT);

    if accepts(language, Lang::En) {
        for window in tokens.windows(3) {
            if window[2] != "ago" {
                continue;
            }
            let Ok(count) = window[0].parse::<i64>() else {
                continue;
            };
            let unit = window[1].trim_end_matches('s');
            let expression = window.join(" ");
            if let Some(found) = counted_window(&expression, unit, count, now, midnight) {
                return Some(found);
            }
        }
    }

    if accepts(language, Lang::Ko) {
        for (idx, token) in tokens.iter().enumerate() {
            let (body, expression) = match token.strip_suffix('전') {
                Some(body) if !body.is_empty() => (body, token.to_string()),
                _ if tokens.get(idx + 1) == Some(&"전") => (*token, format!("{token} 전")),
                _ => continue,
            };
            for (suffix, unit) in [("시간", "hour"), ("일", "day"), ("주", "week")] {
                let Some(digits) = body.strip_suffix(suffix) else {
                    continue;
                };
                if let Ok(count) = digits.parse::<i64>() {
                    if let Some(found) = counted_window(&expression, unit, count, now, midnight) {
                        return Some(found);
                    }
                }
            }
        }
    }

    let keywords: [(&str, Lang, OffsetDateTime, OffsetDateTime); 8] = [
        ("yesterday", Lang::En, midnight - Duration::days(1), midnight),
        ("어제", Lang::Ko, midnight - Duration::days(1), midnight),
        ("today", Lang::En, midnight, now),
        ("오늘", Lang::Ko, midnight, now),
        ("last week", Lang::En, now - Duration::days(7), now),
        ("지난주", Lang::Ko, now - Duration::days(7), now),
        ("last month", Lang::En, now - Duration::days(30), now),
        ("지난달", Lang::Ko, now - Duration::days(30), now),
    ];
    keywords
        .into_iter()
        .find(|(keyword, lang, _, _)| accepts(language, *lang) && lower.contains(*keyword))
        .map(|(keyword, _, start, end)| TimeWindow::new(keyword, start, end))
}

const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_WEEK: i64 = 604_800;

// `None` when the count is negative or the window falls outside the representable range.
fn counted_window(
    expression: &str,
    unit: &str,
    count: i64,
    now: OffsetDateTime,
    midnight: OffsetDateTime,
) -> Option<TimeWindow> {
    if count < 0 {
        return None;
    }
    let back = |anchor: OffsetDateTime, unit_seconds: i64| {
        count
            .checked_mul(unit_seconds)
            .and_then(|seconds| anchor.checked_sub(Duration::seconds(seconds)))
    };
    let (start, end) = match unit {
        // The last `count` hours.
        "hour" => (back(now, SECONDS_PER_HOUR)?, now),
        // The calendar day `count` days before today.
        "day" => {
            let start = back(midnight, SECONDS_PER_DAY)?;
            (start, start.checked_add(Duration::seconds(SECONDS_PER_DAY - 1))?)
        }
        "week" => {
            let start = back(now, SECONDS_PER_WEEK)?;
            (start, start.checked_add(Duration::seconds(SECONDS_PER_WEEK))?)
        }
        _ => return None,
    };
    Some(TimeWindow::new(expression, start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-03-10 15:30:00 UTC);

    #[test]
    fn yesterday_covers_previous_calendar_day() {
        let window = resolve_at("what did I say yesterday?", "auto", NOW).unwrap();
        assert_eq!(window.expression, "yesterday");
        assert_eq!(window.start, datetime!(2024-03-09 00:00:00 UTC));
        assert_eq!(window.end, datetime!(2024-03-10 00:00:00 UTC));
    }

    #[test]
    fn counted_days_pick_a_single_day() {
        let window = resolve_at("notes from 3 days ago", "en", NOW).unwrap();
        assert_eq!(window.expression, "3 days ago");
        assert_eq!(window.start, datetime!(2024-03-07 00:00:00 UTC));
        assert_eq!(window.end, datetime!(2024-03-07 23:59:59 UTC));
    }

    #[test]
    fn korean_expressions_resolve() {
        let window = resolve_at("2일 전 회의", "ko", NOW).unwrap();
        assert_eq!(window.start, datetime!(2024-03-08 00:00:00 UTC));

        let spaced = resolve_at("5시간 전", "auto", NOW).unwrap();
        assert_eq!(spaced.start, datetime!(2024-03-10 10:30:00 UTC));

        let keyword = resolve_at("어제 메모", "auto", NOW).unwrap();
        assert_eq!(keyword.expression, "어제");
    }

    #[test]
    fn unrepresentable_counts_resolve_to_nothing() {
        assert!(resolve_at("100000000 days ago", "en", NOW).is_none());
        assert!(resolve_at("1000000000000000 days ago", "en", NOW).is_none());
        assert!(resolve_at("9223372036854775807 weeks ago", "auto", NOW).is_none());
        assert!(resolve_at("10000000일 전", "ko", NOW).is_none());
        assert!(resolve_at("99999999999999시간 전", "auto", NOW).is_none());
    }

    #[test]
    fn oversized_counts_fall_back_to_content_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStore::create(dir.path(), None).unwrap());
        store.add("remember 100000000 days ago", 0.5).unwrap();
        let reasoner = TemporalReasoner::create(store, "auto");

        let outcome = reasoner.search("100000000 days ago", None);
        assert!(outcome.window.is_none());
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn language_filter_excludes_other_vocabulary() {
        assert!(resolve_at("어제", "en", NOW).is_none());
        assert!(resolve_at("yesterday", "ko", NOW).is_none());
        assert!(resolve_at("no time here", "auto", NOW).is_none());
    }

    #[test]
    fn search_filters_blocks_by_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStore::create(dir.path(), None).unwrap());
        store.add("written just now", 0.5).unwrap();
        let reasoner = TemporalReasoner::create(store, "auto");

        let today = reasoner.search("today", None);
        assert!(today.window.is_some());
        assert_eq!(today.records.len(), 1);

        let yesterday = reasoner.search("yesterday", None);
        assert!(yesterday.records.is_empty());

        let plain = reasoner.search("just now", None);
        assert!(plain.window.is_none());
        assert_eq!(plain.records.len(), 1);
    }
}
