//! Budget threshold alert renderer

use serde::{Deserialize, Serialize};

use crate::notification::{NotificationKind, RenderedPayload};

use super::format::format_inr;
use super::{RenderError, Renderer, TemplateSet};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BudgetAlertData {
    user_name: String,
    percentage_used: f64,
    budget_amount: f64,
    total_expenses: f64,
}

#[derive(Debug, Serialize)]
struct BudgetAlertContext {
    user_name: String,
    percentage_used: String,
    budget_amount: String,
    total_expenses: String,
    remaining: String,
}

/// Renders the `budget_alert` kind
pub struct BudgetAlertRenderer {
    templates: TemplateSet,
}

impl BudgetAlertRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let templates = TemplateSet::new(
            NotificationKind::BUDGET_ALERT,
            include_str!("../../templates/budget_alert.html.hbs"),
            include_str!("../../templates/budget_alert.txt.hbs"),
        )?;

        Ok(Self { templates })
    }
}

impl Renderer for BudgetAlertRenderer {
    fn kind(&self) -> NotificationKind {
        NotificationKind::budget_alert()
    }

    fn render(&self, data: &serde_json::Value) -> Result<RenderedPayload, RenderError> {
        let data: BudgetAlertData = serde_json::from_value(data.clone())
            .map_err(|e| RenderError::invalid_data(NotificationKind::BUDGET_ALERT, e))?;

        let percentage_used = format!("{:.1}", data.percentage_used);
        let remaining = data.budget_amount - data.total_expenses;

        let context = BudgetAlertContext {
            user_name: data.user_name,
            percentage_used: percentage_used.clone(),
            budget_amount: format_inr(data.budget_amount),
            total_expenses: format_inr(data.total_expenses),
            remaining: format_inr(remaining),
        };

        let (html, text) = self.templates.render(&context)?;
        let subject = format!(
            "Budget Alert: {}% of your monthly budget used",
            percentage_used
        );

        Ok(RenderedPayload::new(subject, html, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_alert() {
        let renderer = BudgetAlertRenderer::new().unwrap();
        let payload = renderer
            .render(&json!({
                "userName": "Asha",
                "percentageUsed": 85,
                "budgetAmount": 400000,
                "totalExpenses": 340000
            }))
            .unwrap();

        assert_eq!(
            payload.subject,
            "Budget Alert: 85.0% of your monthly budget used"
        );
        assert!(payload.html.contains("85.0% of your monthly budget"));
        assert!(payload.html.contains("₹4,00,000"));
        assert!(payload.html.contains("₹3,40,000"));
        assert!(payload.text.contains("Remaining:     ₹60,000"));
    }

    #[test]
    fn test_overspent_budget_shows_negative_remaining() {
        let renderer = BudgetAlertRenderer::new().unwrap();
        let payload = renderer
            .render(&json!({
                "userName": "Asha",
                "percentageUsed": 112.345,
                "budgetAmount": 1000,
                "totalExpenses": 1123.45
            }))
            .unwrap();

        assert!(payload.subject.contains("112.3%"));
        assert!(payload.text.contains("-₹123"));
    }

    #[test]
    fn test_missing_field_rejected() {
        let renderer = BudgetAlertRenderer::new().unwrap();
        let err = renderer
            .render(&json!({ "userName": "Asha", "percentageUsed": 85 }))
            .unwrap_err();

        match err {
            RenderError::InvalidData { kind, message } => {
                assert_eq!(kind, "budget_alert");
                assert!(message.contains("budgetAmount"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_data_rejected() {
        let renderer = BudgetAlertRenderer::new().unwrap();
        assert!(renderer.render(&json!([1, 2, 3])).is_err());
    }
}
