use super::{ChartData, ChartRange};
use crate::api::cdn::CdnClient;
use crate::charts::symbols::company_name;
use crate::logi;
use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

const PRICE_KEY: &str = "adjusted_close";
const DAY_STEP: usize = 5;

/// Dates and adjusted closes for `range`, skipping rows missing either.
pub fn extract_series(chart_json: &Value, range: ChartRange) -> Result<(Vec<String>, Vec<f64>)> {
    let key = range.cdn_key();
    let series = chart_json
        .get(key)
        .ok_or_else(|| anyhow!("expected key '{}' not found in chart.json", key))?
        .as_array()
        .filter(|rows| !rows.is_empty())
        .ok_or_else(|| anyhow!("chart series '{}' is empty or invalid", key))?;

    let mut dates = Vec::with_capacity(series.len());
    let mut values = Vec::with_capacity(series.len());
    for row in series {
        let date = row.get("date").and_then(Value::as_str).filter(|d| !d.is_empty());
        let price = row.get(PRICE_KEY).and_then(Value::as_f64);
        if let (Some(date), Some(price)) = (date, price) {
            dates.push(date.to_string());
            values.push(price);
        }
    }
    if dates.is_empty() {
        bail!("no usable datapoints in '{}'", key);
    }
    Ok((dates, values))
}

fn every_nth_day(dates: &[NaiveDate], out: &mut [String]) {
    for (i, d) in dates.iter().enumerate().step_by(DAY_STEP) {
        out[i] = d.format("%d.%m.%y").to_string();
    }
}

fn mark_changes<B: PartialEq>(dates: &[NaiveDate], out: &mut [String], bucket: impl Fn(&NaiveDate) -> B, label: impl Fn(&NaiveDate) -> String) {
    let mut last = None;
    for (i, d) in dates.iter().enumerate() {
        let b = bucket(d);
        if last.as_ref() != Some(&b) {
            out[i] = label(d);
            last = Some(b);
        }
    }
}

fn quarter(d: &NaiveDate) -> u32 {
    (d.month() - 1) / 3 + 1
}

/// Tick labels for ISO dates: same length as the input, mostly empty.
pub fn format_x_axis_labels(dates: &[String], range: ChartRange) -> Result<Vec<String>> {
    let parsed = dates
        .iter()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").with_context(|| format!("bad chart date '{}'", d)))
        .collect::<Result<Vec<_>>>()?;
    let mut out = vec![String::new(); parsed.len()];

    match range {
        ChartRange::M1 => every_nth_day(&parsed, &mut out),
        ChartRange::M6 | ChartRange::Ytd | ChartRange::Y1 => {
            let first = parsed.first().map(|d| (d.year(), d.month()));
            if parsed.iter().all(|d| Some((d.year(), d.month())) == first) {
                every_nth_day(&parsed, &mut out);
            } else {
                mark_changes(
                    &parsed,
                    &mut out,
                    |d| (d.year(), d.month()),
                    |d| {
                        if d.month() == 1 {
                            d.format("%b\n%Y").to_string()
                        } else {
                            d.format("%b").to_string()
                        }
                    },
                );
            }
        }
        ChartRange::Y3 => mark_changes(
            &parsed,
            &mut out,
            |d| (d.year(), quarter(d)),
            |d| format!("Q{}\n{}", quarter(d), d.year()),
        ),
        ChartRange::Y5 | ChartRange::Y10 => mark_changes(&parsed, &mut out, |d| d.year(), |d| d.year().to_string()),
    }
    Ok(out)
}

pub fn chart_id(symbol: &str, range: ChartRange, stamp: &str) -> String {
    format!("{}_{}_{}", symbol.to_lowercase().replace('.', "_"), range.name(), stamp)
}

/// Stock-price line chart for `symbol`, written to `out_dir/<chart_id>.json`.
pub async fn build_chart_data(cdn: &CdnClient, symbol: &str, range: ChartRange, out_dir: &Path) -> Result<(ChartData, PathBuf)> {
    let raw = cdn
        .fetch_chart_json(symbol)
        .await?
        .ok_or_else(|| anyhow!("no chart data for {}", symbol))?;

    let company = match cdn.fetch_company_overview(symbol).await {
        Ok(Some(overview)) => overview
            .get("company_name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
    .unwrap_or_else(|| company_name(symbol));

    let (dates, values) = extract_series(&raw, range)?;
    let labels = format_x_axis_labels(&dates, range)?;

    let id = chart_id(symbol, range, &Local::now().format("%Y%m%d_%H%M%S").to_string());
    let mut data = ChartData::line(format!("{} Stock Price - {}", company, range.title()), labels, values);
    data.chart_id = Some(id.clone());
    data.x_axis_label = Some("Date".to_string());
    data.y_axis_label = Some("Price (USD)".to_string());

    fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create dir {}", out_dir.display()))?;
    let path = out_dir.join(format!("{}.json", id));
    let text = serde_json::to_string_pretty(&data)?;
    fs::write(&path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    logi(format!("Chart data for {} ({}) -> {}", symbol, range.title(), path.display()));
    Ok((data, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dates(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn series_skips_incomplete_rows() {
        let raw = json!({"chart_1j": [
            {"date": "2025-01-02", "adjusted_close": 10.5},
            {"date": "2025-01-03"},
            {"date": "2025-01-06", "adjusted_close": 11}
        ]});
        let (d, v) = extract_series(&raw, ChartRange::Y1).unwrap();
        assert_eq!(d, dates(&["2025-01-02", "2025-01-06"]));
        assert_eq!(v, vec![10.5, 11.0]);
    }

    #[test]
    fn missing_or_empty_series_fails() {
        assert!(extract_series(&json!({}), ChartRange::M1).is_err());
        assert!(extract_series(&json!({"chart_1m": []}), ChartRange::M1).is_err());
    }

    #[test]
    fn month_labels_mark_january_with_year() {
        let d = dates(&["2024-12-30", "2024-12-31", "2025-01-02", "2025-01-03", "2025-02-03"]);
        let labels = format_x_axis_labels(&d, ChartRange::Y1).unwrap();
        assert_eq!(labels, vec!["Dec", "", "Jan\n2025", "", "Feb"]);
    }

    #[test]
    fn single_month_falls_back_to_day_labels() {
        let d = dates(&["2025-03-03", "2025-03-04", "2025-03-05", "2025-03-06", "2025-03-07", "2025-03-10"]);
        let labels = format_x_axis_labels(&d, ChartRange::Ytd).unwrap();
        assert_eq!(labels[0], "03.03.25");
        assert_eq!(labels[5], "10.03.25");
        assert!(labels[1..5].iter().all(String::is_empty));
    }

    #[test]
    fn quarter_and_year_ticks() {
        let d = dates(&["2023-03-31", "2023-04-03", "2023-06-30", "2024-01-02"]);
        assert_eq!(
            format_x_axis_labels(&d, ChartRange::Y3).unwrap(),
            vec!["Q1\n2023", "Q2\n2023", "", "Q1\n2024"]
        );
        assert_eq!(format_x_axis_labels(&d, ChartRange::Y10).unwrap(), vec!["2023", "", "", "2024"]);
    }

    #[test]
    fn ids_are_filename_safe() {
        assert_eq!(chart_id("AAPL.US", ChartRange::Y1, "20250101_120000"), "aapl_us_Y1_20250101_120000");
    }

    #[tokio::test]
    async fn builds_chart_file_from_cdn() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/NVDA.US/chart.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chart_1m": [
                {"date": "2025-05-01", "adjusted_close": 110.0},
                {"date": "2025-05-02", "adjusted_close": 112.5}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/symbols/NVDA.US/short_overview.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"company_name": "NVIDIA Corp"})))
            .mount(&server)
            .await;

        let cdn = CdnClient::new(Client::new(), server.uri(), "k", Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let (data, path) = build_chart_data(&cdn, "NVDA.US", ChartRange::M1, dir.path()).await.unwrap();
        assert_eq!(data.title, "NVIDIA Corp Stock Price - Last Month");
        assert_eq!(data.labels, vec!["01.05.25", ""]);
        assert_eq!(data.y_axis_label.as_deref(), Some("Price (USD)"));
        let written: ChartData = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, data);
    }
}
