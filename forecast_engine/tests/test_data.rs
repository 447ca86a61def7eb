use chrono::NaiveDate;
use forecast_engine::data::{DataLoader, Observation, TimeSeries};
use forecast_engine::error::ForecastError;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::Builder;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[test]
fn test_rejects_duplicate_dates() {
    let err = TimeSeries::from_pairs("s", vec![(day(1), 1.0), (day(1), 2.0)]).unwrap_err();
    match err {
        ForecastError::InvalidData(msg) => assert!(msg.contains("duplicate")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_rejects_unordered_dates() {
    let err = TimeSeries::from_pairs("s", vec![(day(2), 1.0), (day(1), 2.0)]).unwrap_err();
    match err {
        ForecastError::InvalidData(msg) => assert!(msg.contains("non-monotonic")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_rejects_non_finite_values() {
    for bad in [f64::NAN, f64::INFINITY] {
        assert!(matches!(
            TimeSeries::from_pairs("s", vec![(day(1), 1.0), (day(2), bad)]),
            Err(ForecastError::InvalidData(_))
        ));
    }
}

#[test]
fn test_windows() {
    let series = TimeSeries::daily("s", day(1), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

    assert_eq!(series.slice(1, 3).unwrap().values(), vec![2.0, 3.0]);
    assert!(series.slice(3, 6).is_err());
    assert_eq!(series.tail(2).values(), vec![4.0, 5.0]);
    assert_eq!(series.tail(10).len(), 5);
    assert_eq!(series.until(day(3)).values(), vec![1.0, 2.0, 3.0]);
    assert!(series.until(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()).is_empty());
    assert_eq!(series.value_on(day(4)), Some(4.0));
    assert_eq!(series.value_on(day(9)), None);
}

#[test]
fn test_at_or_before_skips_gaps() {
    let series = TimeSeries::from_pairs("s", vec![(day(1), 1.0), (day(5), 5.0)]).unwrap();
    assert_eq!(
        series.at_or_before(day(4)),
        Some(Observation {
            date: day(1),
            value: 1.0
        })
    );
    assert_eq!(series.at_or_before(day(5)).map(|o| o.value), Some(5.0));
    assert_eq!(
        series.at_or_before(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()),
        None
    );
}

#[test]
fn test_clone_is_a_stable_snapshot() {
    let series = TimeSeries::daily("s", day(1), vec![1.0, 2.0, 3.0]).unwrap();
    let snapshot = series.clone();
    let shorter = series.tail(1);
    assert_eq!(snapshot.values(), vec![1.0, 2.0, 3.0]);
    assert_eq!(shorter.values(), vec![3.0]);
}

#[test]
fn test_csv_reader() {
    let csv = "Date,Open,Close\n2024-01-01,1.0,10.5\n2024-01-02,1.0,11.0\n2024-01-03 00:00:00,1.0,10.75\n";
    let series = DataLoader::from_reader("usd_cop", csv.as_bytes()).unwrap();
    assert_eq!(series.name(), "usd_cop");
    assert_eq!(series.values(), vec![10.5, 11.0, 10.75]);
    assert_eq!(series.dates(), vec![day(1), day(2), day(3)]);
}

#[test]
fn test_csv_rejects_bad_rows() {
    let bad_value = "date,value\n2024-01-01,abc\n";
    assert!(matches!(
        DataLoader::from_reader("s", bad_value.as_bytes()),
        Err(ForecastError::InvalidData(_))
    ));

    let bad_date = "date,value\n01/01/2024,1.0\n";
    assert!(matches!(
        DataLoader::from_reader("s", bad_date.as_bytes()),
        Err(ForecastError::InvalidData(_))
    ));

    let no_value = "date,volume\n2024-01-01,1.0\n";
    assert!(DataLoader::from_reader("s", no_value.as_bytes()).is_err());

    let duplicated = "date,value\n2024-01-01,1.0\n2024-01-01,2.0\n";
    assert!(DataLoader::from_reader("s", duplicated.as_bytes()).is_err());
}

#[test]
fn test_csv_file_named_after_stem() {
    let mut file = Builder::new().prefix("brent").suffix(".csv").tempfile().unwrap();
    writeln!(file, "timestamp,price").unwrap();
    writeln!(file, "2024-01-01,80.1").unwrap();
    writeln!(file, "2024-01-02,80.4").unwrap();
    file.flush().unwrap();

    let series = DataLoader::from_csv(file.path()).unwrap();
    assert!(series.name().starts_with("brent"));
    assert_eq!(series.len(), 2);
    assert_eq!(series.last().map(|o| o.value), Some(80.4));
}
