//! Stock-price chart clips: CDN series to chart JSON, then an external
//! animation renderer and an optional blurred-footage backdrop.

pub mod render;
pub mod stock;
pub mod symbols;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartRange {
    M1,
    M6,
    Ytd,
    Y1,
    Y3,
    Y5,
    Y10,
}

impl ChartRange {
    /// Series key inside the CDN's `chart.json`.
    pub fn cdn_key(self) -> &'static str {
        match self {
            Self::M1 => "chart_1m",
            Self::M6 => "chart_6m",
            Self::Ytd => "chart_ytd",
            Self::Y1 => "chart_1j",
            Self::Y3 => "chart_3j",
            Self::Y5 => "chart_5j",
            Self::Y10 => "chart_10j",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::M1 => "Last Month",
            Self::M6 => "Last 6 Months",
            Self::Ytd => "Year to Date",
            Self::Y1 => "Last Year",
            Self::Y3 => "Last 3 Years",
            Self::Y5 => "Last 5 Years",
            Self::Y10 => "Last 10 Years",
        }
    }

    /// Short name used in chart ids.
    pub fn name(self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M6 => "M6",
            Self::Ytd => "YTD",
            Self::Y1 => "Y1",
            Self::Y3 => "Y3",
            Self::Y5 => "Y5",
            Self::Y10 => "Y10",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
}

/// Input document for the chart renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<String>,
    pub chart_type: ChartType,
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
}

impl ChartData {
    pub fn line(title: impl Into<String>, labels: Vec<String>, values: Vec<f64>) -> Self {
        Self {
            chart_id: None,
            chart_type: ChartType::Line,
            title: title.into(),
            labels,
            values,
            x_axis_label: None,
            y_axis_label: None,
        }
    }
}
