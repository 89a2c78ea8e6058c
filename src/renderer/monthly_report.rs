//! Monthly financial report renderer

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::notification::{NotificationKind, RenderedPayload};

use super::format::format_inr;
use super::{RenderError, Renderer, TemplateSet};

const DEFAULT_MONTH: &str = "this month";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthlyReportData {
    user_name: String,
    #[serde(default)]
    month: Option<String>,
    stats: MonthlyStats,
    #[serde(default)]
    insights: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthlyStats {
    total_income: f64,
    total_expenses: f64,
    #[serde(default)]
    by_category: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct MonthlyReportContext {
    user_name: String,
    month: String,
    total_income: String,
    total_expenses: String,
    net: String,
    categories: Vec<CategoryLine>,
    insights: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CategoryLine {
    name: String,
    amount: String,
}

/// Renders the `monthly_report` kind
pub struct MonthlyReportRenderer {
    templates: TemplateSet,
}

impl MonthlyReportRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let templates = TemplateSet::new(
            NotificationKind::MONTHLY_REPORT,
            include_str!("../../templates/monthly_report.html.hbs"),
            include_str!("../../templates/monthly_report.txt.hbs"),
        )?;

        Ok(Self { templates })
    }
}

impl Renderer for MonthlyReportRenderer {
    fn kind(&self) -> NotificationKind {
        NotificationKind::monthly_report()
    }

    fn render(&self, data: &serde_json::Value) -> Result<RenderedPayload, RenderError> {
        let data: MonthlyReportData = serde_json::from_value(data.clone())
            .map_err(|e| RenderError::invalid_data(NotificationKind::MONTHLY_REPORT, e))?;

        let month = data
            .month
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MONTH.to_string());
        let net = data.stats.total_income - data.stats.total_expenses;

        // BTreeMap keeps categories in name order
        let categories = data
            .stats
            .by_category
            .into_iter()
            .map(|(name, amount)| CategoryLine {
                name,
                amount: format_inr(amount),
            })
            .collect();

        let context = MonthlyReportContext {
            user_name: data.user_name,
            month: month.clone(),
            total_income: format_inr(data.stats.total_income),
            total_expenses: format_inr(data.stats.total_expenses),
            net: format_inr(net),
            categories,
            insights: data.insights,
        };

        let (html, text) = self.templates.render(&context)?;
        let subject = format!("Your Monthly Financial Report - {}", month);

        Ok(RenderedPayload::new(subject, html, text))
    }
}
