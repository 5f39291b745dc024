//! Popularity ranking by traded turnover

use crate::feed::table::{self, FeedRow};

/// Upper bound on how many popular instruments a caller can request.
pub const MAX_TOP_N: usize = 100;

/// Best quote row kept per instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PopularQuote {
    pub secid: String,
    pub board: Option<String>,
    pub last: f64,
    pub valtoday: f64,
    pub voltoday: f64,
    pub time: Option<String>,
}

/// Rank quote snapshot rows by turnover.
///
/// An instrument can show up on several pages or boards; per SECID the
/// row with the larger `VALTODAY` wins. Rows without a positive
/// last-trade price are discarded even when they are the symbol's only
/// row. Turnover ties keep the first-seen row.
pub fn rank_by_turnover(rows: &[FeedRow], top_n: usize) -> Vec<PopularQuote> {
    let top_n = top_n.clamp(1, MAX_TOP_N);

    // Vec instead of a map to keep encounter order for stable ties.
    let mut best: Vec<PopularQuote> = Vec::new();

    for row in rows {
        let secid = match table::pick_str(row, &["SECID"]) {
            Some(s) => s.trim().to_uppercase(),
            None => continue,
        };
        if secid.is_empty() {
            continue;
        }

        let last = table::pick_f64(row, &["LAST"]).unwrap_or(0.0);
        if last <= 0.0 {
            continue;
        }

        let candidate = PopularQuote {
            secid: secid.clone(),
            board: table::pick_str(row, &["BOARDID"]),
            last,
            valtoday: table::pick_f64(row, &["VALTODAY"]).unwrap_or(0.0),
            voltoday: table::pick_f64(row, &["VOLTODAY"]).unwrap_or(0.0),
            time: table::pick_str(row, &["UPDATETIME", "SYSTIME"]),
        };

        match best.iter_mut().find(|q| q.secid == secid) {
            Some(prev) => {
                if candidate.valtoday > prev.valtoday {
                    *prev = candidate;
                }
            }
            None => best.push(candidate),
        }
    }

    best.sort_by(|a, b| {
        b.valtoday
            .partial_cmp(&a.valtoday)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    best.truncate(top_n);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quote(secid: &str, last: Option<f64>, valtoday: f64) -> FeedRow {
        json!({
            "SECID": secid,
            "BOARDID": "TQBR",
            "LAST": last,
            "VALTODAY": valtoday,
            "VOLTODAY": 1000.0,
            "UPDATETIME": "12:30:00",
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn zero_price_rows_are_discarded_and_turnover_orders() {
        let rows = vec![
            quote("A", Some(10.0), 100.0),
            quote("A", Some(0.0), 500.0),
            quote("B", Some(5.0), 50.0),
        ];

        let ranked = rank_by_turnover(&rows, 10);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].secid, "A");
        assert_eq!(ranked[0].valtoday, 100.0);
        assert_eq!(ranked[1].secid, "B");
    }

    #[test]
    fn larger_turnover_wins_per_secid() {
        let rows = vec![
            quote("SBER", Some(280.0), 1_000.0),
            quote("SBER", Some(281.0), 9_000.0),
        ];

        let ranked = rank_by_turnover(&rows, 10);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].valtoday, 9_000.0);
        assert_eq!(ranked[0].last, 281.0);
    }

    #[test]
    fn null_last_price_never_qualifies() {
        let rows = vec![quote("GAZP", None, 50_000.0)];
        assert!(rank_by_turnover(&rows, 10).is_empty());
    }

    #[test]
    fn top_n_truncates_after_sorting() {
        let rows = vec![
            quote("A", Some(1.0), 10.0),
            quote("B", Some(1.0), 30.0),
            quote("C", Some(1.0), 20.0),
        ];

        let ranked = rank_by_turnover(&rows, 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].secid, "B");
        assert_eq!(ranked[1].secid, "C");
    }

    #[test]
    fn turnover_ties_keep_encounter_order() {
        let rows = vec![
            quote("X", Some(1.0), 100.0),
            quote("Y", Some(1.0), 100.0),
        ];

        let ranked = rank_by_turnover(&rows, 10);

        assert_eq!(ranked[0].secid, "X");
        assert_eq!(ranked[1].secid, "Y");
    }
}
