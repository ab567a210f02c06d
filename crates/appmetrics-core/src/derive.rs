//! Derivation engine: trailing averages and day-over-day indicators over a full,
//! chronologically sorted per-app sequence. Pure; identical input yields identical output.

use crate::model::{DailyMetricRecord, round_to};

/// Trailing window sizes, in days, inclusive of the current date.
pub const TRAILING_WINDOWS: [usize; 3] = [3, 7, 14];

/// Mean of the defined values in `values[index + 1 - window ..= index]`, rounded to two
/// decimals.
///
/// Undefined while fewer than `window` dates exist up to `index`; a partial window is never
/// averaged. Undefined datapoints inside a full window are skipped, but at least one must
/// be present.
pub fn trailing_average(values: &[Option<f64>], index: usize, window: usize) -> Option<f64> {
    if window == 0 || index >= values.len() || index + 1 < window {
        return None;
    }
    let (sum, count) = values[index + 1 - window..=index]
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    Some(round_to(sum / count as f64, 2))
}

/// Percentage change of `values[index]` against `values[index - 1]`.
///
/// Undefined for the first date, when either value is undefined, or when the previous value
/// is exactly zero. An unchanged value yields `Some(0.0)`.
pub fn percent_change(values: &[Option<f64>], index: usize) -> Option<f64> {
    if index == 0 || index >= values.len() {
        return None;
    }
    let current = values[index]?;
    let previous = values[index - 1]?;
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// Sorts `records` by date and fills in every record's trailing metrics.
pub fn derive_trailing_metrics(records: &mut [DailyMetricRecord]) {
    records.sort_by_key(|r| r.date);
    let roas: Vec<Option<f64>> = records.iter().map(|r| r.roas).collect();
    let roi: Vec<Option<f64>> = records.iter().map(|r| r.roi).collect();

    for (i, record) in records.iter_mut().enumerate() {
        let [w3, w7, w14] = TRAILING_WINDOWS;
        let t = &mut record.trailing;
        t.l3_roas = trailing_average(&roas, i, w3);
        t.l7_roas = trailing_average(&roas, i, w7);
        t.l14_roas = trailing_average(&roas, i, w14);
        t.l3_roi = trailing_average(&roi, i, w3);
        t.l7_roi = trailing_average(&roi, i, w7);
        t.l14_roi = trailing_average(&roi, i, w14);
        t.roas_indicator = percent_change(&roas, i);
        t.roi_indicator = percent_change(&roi, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RenewalDay, RevenueDay};
    use chrono::NaiveDate;

    fn record(day: u32, spend: f64, revenue: f64) -> DailyMetricRecord {
        DailyMetricRecord::assemble(
            NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            spend,
            RevenueDay {
                total_revenue: revenue,
                ..Default::default()
            },
            RenewalDay::default(),
        )
    }

    #[test]
    fn average_undefined_until_window_fills() {
        let values = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        assert_eq!(trailing_average(&values, 0, 3), None);
        assert_eq!(trailing_average(&values, 1, 3), None);
        assert_eq!(trailing_average(&values, 2, 3), Some(2.0));
        assert_eq!(trailing_average(&values, 3, 3), Some(3.0));
    }

    #[test]
    fn average_skips_undefined_points() {
        let values = vec![Some(1.0), None, Some(2.0)];
        assert_eq!(trailing_average(&values, 2, 3), Some(1.5));
        let empty = vec![None, None, None];
        assert_eq!(trailing_average(&empty, 2, 3), None);
    }

    #[test]
    fn average_is_rounded() {
        let values = vec![Some(1.0), Some(1.0), Some(1.01)];
        assert_eq!(trailing_average(&values, 2, 3), Some(1.0));
    }

    #[test]
    fn change_rules() {
        let values = vec![Some(2.0), Some(2.0), Some(3.0), Some(0.0), Some(1.0), None, Some(1.0)];
        assert_eq!(percent_change(&values, 0), None);
        assert_eq!(percent_change(&values, 1), Some(0.0));
        assert_eq!(percent_change(&values, 2), Some(50.0));
        assert_eq!(percent_change(&values, 3), Some(-100.0));
        assert_eq!(percent_change(&values, 4), None);
        assert_eq!(percent_change(&values, 5), None);
        assert_eq!(percent_change(&values, 6), None);
    }

    #[test]
    fn derives_constant_series() {
        let mut records: Vec<_> = (1..=14).rev().map(|d| record(d, 50.0, 100.0)).collect();
        derive_trailing_metrics(&mut records);

        assert_eq!(records[0].date.to_string(), "2024-06-01");
        assert!(records.iter().all(|r| r.roas == Some(2.0) && r.roi == Some(1.0)));
        assert_eq!(records[1].trailing.l3_roas, None);
        assert_eq!(records[2].trailing.l3_roas, Some(2.0));
        assert_eq!(records[5].trailing.l7_roas, None);
        assert_eq!(records[6].trailing.l7_roi, Some(1.0));
        assert_eq!(records[12].trailing.l14_roas, None);
        assert_eq!(records[13].trailing.l14_roas, Some(2.0));
        assert_eq!(records[0].trailing.roas_indicator, None);
        assert_eq!(records[1].trailing.roas_indicator, Some(0.0));
    }

    #[test]
    fn days_without_spend_break_indicators() {
        let mut records = vec![record(1, 50.0, 100.0), record(2, 0.0, 80.0), record(3, 40.0, 120.0)];
        derive_trailing_metrics(&mut records);
        assert_eq!(records[1].trailing.roas_indicator, None);
        assert_eq!(records[2].trailing.roas_indicator, None);
        assert_eq!(records[2].trailing.l3_roas, Some(2.5));
    }
}
