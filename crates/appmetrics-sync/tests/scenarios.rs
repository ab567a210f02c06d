use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use appmetrics_connectors::analytics::RevenueSource;
use appmetrics_connectors::{
    ConnectorError, ConnectorFactory, SheetHandle, SheetStore, SpendQuery, SpendRow, SpendSource,
};
use appmetrics_core::config::{AdsConfig, AnalyticsConfig, SheetConfig};
use appmetrics_core::reconcile::LookbackWindow;
use appmetrics_core::report::ROW_WIDTH;
use appmetrics_core::{AppConfig, CellValue, RenewalDay, RevenueDay, SheetRow, SheetTarget, SyncError};
use appmetrics_sync::{run_app, run_batch};
use chrono::NaiveDate;

const TAB: &str = "Puzzle";

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

#[derive(Default)]
struct MemorySheet {
    tabs: Vec<String>,
    rows: RefCell<Vec<SheetRow>>,
    appends: RefCell<usize>,
}

impl MemorySheet {
    fn with_column(cells: &[&str]) -> Rc<Self> {
        Rc::new(Self {
            tabs: vec![TAB.to_string()],
            rows: RefCell::new(cells.iter().map(|c| vec![CellValue::text(*c)]).collect()),
            appends: RefCell::new(0),
        })
    }

    fn rows(&self) -> Vec<SheetRow> {
        self.rows.borrow().clone()
    }

    fn first_cells(&self) -> Vec<String> {
        self.rows.borrow().iter().map(|r| r[0].display()).collect()
    }

    fn row_for(&self, date_cell: &str) -> SheetRow {
        self.rows
            .borrow()
            .iter()
            .find(|r| r[0].display() == date_cell)
            .cloned()
            .unwrap_or_else(|| panic!("no row for {}", date_cell))
    }
}

struct SharedSheet(Rc<MemorySheet>);

impl SheetStore for SharedSheet {
    fn open(&self, target: &SheetTarget) -> Result<SheetHandle, ConnectorError> {
        if !self.0.tabs.contains(&target.tab) {
            return Err(ConnectorError::not_found("sheets", format!("no tab {}", target.tab)));
        }
        Ok(SheetHandle {
            sheet_id: target.sheet_id.clone(),
            tab: target.tab.clone(),
        })
    }

    fn read_column(&self, _handle: &SheetHandle, column: usize) -> Result<Vec<String>, ConnectorError> {
        Ok(self
            .0
            .rows
            .borrow()
            .iter()
            .map(|r| r.get(column - 1).map(CellValue::display).unwrap_or_default())
            .collect())
    }

    fn append_rows(&self, _handle: &SheetHandle, rows: &[SheetRow]) -> Result<(), ConnectorError> {
        *self.0.appends.borrow_mut() += 1;
        self.0.rows.borrow_mut().extend_from_slice(rows);
        Ok(())
    }
}

struct FixedSpend(Result<Vec<SpendRow>, ConnectorError>);

impl SpendSource for FixedSpend {
    fn query_spend(&self, _query: &SpendQuery) -> Result<Vec<SpendRow>, ConnectorError> {
        self.0.clone()
    }
}

#[derive(Clone)]
struct FixedRevenue {
    revenue: Result<BTreeMap<NaiveDate, RevenueDay>, ConnectorError>,
    renewals: BTreeMap<NaiveDate, RenewalDay>,
}

impl RevenueSource for FixedRevenue {
    fn revenue_by_date(
        &self,
        _property_id: &str,
        _window: &LookbackWindow,
    ) -> Result<BTreeMap<NaiveDate, RevenueDay>, ConnectorError> {
        self.revenue.clone()
    }

    fn renewals_by_date(
        &self,
        _property_id: &str,
        _window: &LookbackWindow,
    ) -> Result<BTreeMap<NaiveDate, RenewalDay>, ConnectorError> {
        Ok(self.renewals.clone())
    }
}

struct Fakes {
    spend: Result<Vec<SpendRow>, ConnectorError>,
    revenue: FixedRevenue,
    sheet: Rc<MemorySheet>,
}

impl ConnectorFactory for Fakes {
    fn spend_source(&self, _app: &AppConfig) -> Result<Box<dyn SpendSource>, SyncError> {
        Ok(Box::new(FixedSpend(self.spend.clone())))
    }

    fn revenue_source(&self, _app: &AppConfig) -> Result<Box<dyn RevenueSource>, SyncError> {
        Ok(Box::new(self.revenue.clone()))
    }

    fn sheet_store(&self, _app: &AppConfig) -> Result<Box<dyn SheetStore>, SyncError> {
        Ok(Box::new(SharedSheet(self.sheet.clone())))
    }
}

fn app() -> AppConfig {
    AppConfig {
        app_name: Some(TAB.into()),
        gads: Some(AdsConfig {
            customer_id: Some("123-456-7890".into()),
            ..AdsConfig::default()
        }),
        ga4: Some(AnalyticsConfig {
            property_id: Some("42".into()),
            service_account_info: None,
        }),
        date_range_days: Some(14),
        app_sheet: Some(SheetConfig {
            sheet_link: Some("https://docs.google.com/spreadsheets/d/sheet-1/edit".into()),
            ..SheetConfig::default()
        }),
        ..AppConfig::default()
    }
}

fn spend_rows(days: impl IntoIterator<Item = NaiveDate>, cost: f64) -> Vec<SpendRow> {
    days.into_iter()
        .map(|date| SpendRow {
            campaign: "PZ_us".into(),
            date,
            cost_micros: (cost * 1_000_000.0) as i64,
        })
        .collect()
}

fn revenue_days(days: impl IntoIterator<Item = (NaiveDate, f64)>) -> FixedRevenue {
    FixedRevenue {
        revenue: Ok(days
            .into_iter()
            .map(|(date, total)| {
                (
                    date,
                    RevenueDay {
                        total_revenue: total,
                        iap_revenue: 0.0,
                        purchase_count: 1,
                    },
                )
            })
            .collect()),
        renewals: BTreeMap::new(),
    }
}

fn text(row: &SheetRow, column: usize) -> String {
    row[column].display()
}

#[test]
fn steady_spend_and_revenue_render_constant_ratios() {
    let fakes = Fakes {
        spend: Ok(spend_rows((1..=14).map(|d| date(6, d)), 50.0)),
        revenue: revenue_days((1..=14).map(|d| (date(6, d), 100.0))),
        sheet: MemorySheet::with_column(&[]),
    };
    let outcome = run_app(&app(), &fakes, date(6, 15)).unwrap();
    assert_eq!(outcome.data_rows, 2);

    assert_eq!(
        fakes.sheet.first_cells(),
        vec!["June", "13-06-2024", "14-06-2024", "", "", ""]
    );
    let header = &fakes.sheet.rows()[0];
    assert_eq!(header.len(), ROW_WIDTH);
    assert_eq!(text(header, 10), "ROAS");

    let row = fakes.sheet.row_for("14-06-2024");
    assert_eq!(row.len(), ROW_WIDTH);
    assert_eq!(text(&row, 1), "$50.00");
    assert_eq!(text(&row, 3), "$100.00");
    assert_eq!(text(&row, 10), "2.0");
    assert_eq!(text(&row, 11), "1.0");
    assert_eq!(text(&row, 12), "2.0");
    assert_eq!(text(&row, 14), "2.0");
    assert_eq!(text(&row, 17), "1.0");
    assert_eq!(text(&row, 18), "0%");
    assert_eq!(text(&row, 19), "0%");
}

#[test]
fn unreachable_spend_still_writes_revenue_rows() {
    let fakes = Fakes {
        spend: Err(ConnectorError::transport("google_ads", "connection refused")),
        revenue: revenue_days([(date(6, 13), 150.0), (date(6, 14), 200.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    let outcome = run_app(&app(), &fakes, date(6, 15)).unwrap();
    assert_eq!(outcome.spend_days, 0);
    assert_eq!(outcome.data_rows, 2);

    for (cell, revenue) in [("13-06-2024", "$150.00"), ("14-06-2024", "$200.00")] {
        let row = fakes.sheet.row_for(cell);
        assert_eq!(text(&row, 2), "$0.00");
        assert_eq!(text(&row, 3), revenue);
        assert_eq!(text(&row, 10), "0");
        assert_eq!(text(&row, 11), "0");
    }
}

#[test]
fn recorded_dates_and_month_headers_are_not_repeated() {
    let fakes = Fakes {
        spend: Ok(vec![]),
        revenue: revenue_days([(date(6, 1), 10.0), (date(6, 2), 20.0)]),
        sheet: MemorySheet::with_column(&["June", "01-06-2024"]),
    };
    let outcome = run_app(&app(), &fakes, date(6, 3)).unwrap();
    assert_eq!(outcome.data_rows, 1);
    assert_eq!(outcome.already_recorded, 1);
    assert!(outcome.new_months.is_empty());
    assert_eq!(
        fakes.sheet.first_cells(),
        vec!["June", "01-06-2024", "02-06-2024", "", "", ""]
    );
}

#[test]
fn unpadded_historical_dates_count_as_recorded() {
    let fakes = Fakes {
        spend: Ok(vec![]),
        revenue: revenue_days([(date(6, 1), 10.0), (date(6, 2), 20.0)]),
        sheet: MemorySheet::with_column(&["June", "1-6-2024", "2024-06-02"]),
    };
    let outcome = run_app(&app(), &fakes, date(6, 3)).unwrap();
    assert_eq!(outcome.rows_appended, 0);
    assert_eq!(*fakes.sheet.appends.borrow(), 0);
}

#[test]
fn rerunning_appends_nothing() {
    let fakes = Fakes {
        spend: Ok(spend_rows([date(6, 13), date(6, 14)], 20.0)),
        revenue: revenue_days([(date(6, 13), 30.0), (date(6, 14), 10.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    let first = run_app(&app(), &fakes, date(6, 15)).unwrap();
    assert_eq!(first.data_rows, 2);
    let before = fakes.sheet.rows();

    let second = run_app(&app(), &fakes, date(6, 15)).unwrap();
    assert_eq!(second.rows_appended, 0);
    assert_eq!(second.already_recorded, 2);
    assert_eq!(fakes.sheet.rows(), before);
}

#[test]
fn window_spanning_months_writes_both_blocks_in_order() {
    let fakes = Fakes {
        spend: Ok(vec![]),
        revenue: revenue_days([(date(6, 30), 10.0), (date(7, 1), 20.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    let outcome = run_app(&app(), &fakes, date(7, 2)).unwrap();
    assert_eq!(outcome.new_months, vec!["June".to_string(), "July".to_string()]);
    assert_eq!(
        fakes.sheet.first_cells(),
        vec!["June", "30-06-2024", "", "", "", "July", "01-07-2024", "", "", ""]
    );
}

#[test]
fn spend_only_day_shows_spend_with_zero_revenue() {
    let fakes = Fakes {
        spend: Ok(spend_rows([date(6, 14)], 50.0)),
        revenue: revenue_days([(date(6, 13), 80.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    run_app(&app(), &fakes, date(6, 15)).unwrap();
    let row = fakes.sheet.row_for("14-06-2024");
    assert_eq!(text(&row, 1), "$50.00");
    assert_eq!(text(&row, 3), "$0.00");
    assert_eq!(text(&row, 10), "0");
    assert_eq!(text(&row, 11), "-1.0");
}

#[test]
fn revenue_outage_writes_placeholders_only_when_spend_is_known() {
    let outage = FixedRevenue {
        revenue: Err(ConnectorError::transport("ga4", "timed out")),
        renewals: BTreeMap::new(),
    };
    let with_spend = Fakes {
        spend: Ok(spend_rows([date(6, 14)], 12.5)),
        revenue: outage.clone(),
        sheet: MemorySheet::with_column(&[]),
    };
    run_app(&app(), &with_spend, date(6, 15)).unwrap();
    let row = with_spend.sheet.row_for("14-06-2024");
    assert_eq!(text(&row, 1), "$12.50");
    assert_eq!(text(&row, 12), "0");
    assert_eq!(text(&row, 18), "N/A");
    assert_eq!(text(&with_spend.sheet.row_for("13-06-2024"), 1), "$0.00");

    let without_spend = Fakes {
        spend: Ok(vec![]),
        revenue: outage,
        sheet: MemorySheet::with_column(&[]),
    };
    let outcome = run_app(&app(), &without_spend, date(6, 15)).unwrap();
    assert_eq!(outcome.derived_records, 0);
    assert!(without_spend.sheet.rows().is_empty());
}

#[test]
fn failing_app_does_not_abort_the_batch() {
    let fakes = Fakes {
        spend: Ok(vec![]),
        revenue: revenue_days([(date(6, 14), 5.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    let mut no_target = app();
    no_target.app_name = Some("Orphan".into());
    no_target.app_sheet = None;
    let mut wrong_tab = app();
    wrong_tab.app_name = Some("Ghost".into());

    let summary = run_batch(&[no_target, wrong_tab, app()], &fakes, date(6, 15));
    assert!(!summary.run_id.is_empty());
    assert_eq!(summary.processed.len(), 1);
    assert_eq!(summary.processed[0].app, TAB);
    let kinds: Vec<(&str, &str)> = summary
        .skipped
        .iter()
        .map(|s| (s.app.as_str(), s.kind))
        .collect();
    assert_eq!(kinds, vec![("Orphan", "configuration"), ("Ghost", "destination_access")]);
    assert!(summary.rows_appended() > 0);
}

#[test]
fn missing_ad_account_means_zero_spend() {
    let fakes = Fakes {
        spend: Ok(spend_rows([date(6, 14)], 99.0)),
        revenue: revenue_days([(date(6, 14), 40.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    let mut cfg = app();
    cfg.gads = None;
    let outcome = run_app(&cfg, &fakes, date(6, 15)).unwrap();
    assert_eq!(outcome.spend_days, 0);
    let row = fakes.sheet.row_for("14-06-2024");
    assert_eq!(text(&row, 1), "$0.00");
    assert_eq!(text(&row, 3), "$40.00");
}

#[test]
fn oversized_lookback_does_not_stop_the_batch() {
    let fakes = Fakes {
        spend: Ok(spend_rows([date(6, 14)], 99.0)),
        revenue: revenue_days([(date(6, 14), 40.0)]),
        sheet: MemorySheet::with_column(&[]),
    };
    let mut bad = app();
    bad.date_range_days = Some(100_000_000);

    let summary = run_batch(&[bad, app()], &fakes, date(6, 15));
    assert_eq!(summary.processed.len() + summary.skipped.len(), 2);
    assert_eq!(summary.processed.len(), 2);
    assert_eq!(summary.processed[0].spend_days, 0);
    assert_eq!(summary.processed[1].spend_days, 1);
}
