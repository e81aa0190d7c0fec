//! Fixed clinical metric tools.
//!
//! These tools run SQL written here rather than by the model, so they skip the
//! admission gate. Any failure is answered with guidance pointing the model
//! at the general-purpose tools instead of an error.

use crate::db::AnalyticsStore;
use crate::error::StoreResult;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;

pub const AVERAGE_RISK_SCORE_SQL: &str = "\
SELECT AVG(payment_risk_score) AS average_cms_hcc_risk_score, \
COUNT(*) AS patient_count \
FROM cms_hcc.patient_risk_scores";

pub const READMISSION_RATE_SQL: &str = "\
SELECT \
(SELECT COUNT(*) FROM readmissions.readmission_summary \
WHERE index_admission_flag = 1 AND unplanned_readmit_30_flag = 1) * 100.0 \
/ \
(SELECT COUNT(*) FROM readmissions.readmission_summary \
WHERE index_admission_flag = 1) AS overall_readmission_rate";

const RISK_SCORE_GUIDANCE: &str = "Could not compute the average CMS-HCC risk score from \
cms_hcc.patient_risk_scores. Call get_database_schema to find the risk score tables, \
get_table_info to inspect their columns, then compute the average with execute_query.";

const READMISSION_GUIDANCE: &str = "Could not compute the overall readmission rate from \
readmissions.readmission_summary. Call get_database_schema to find the readmission tables, \
get_table_info to inspect the index admission and 30-day readmission flags, then compute \
the rate with execute_query.";

/// Handler for the fixed metric tools.
pub struct MetricsToolHandler<S> {
    store: Arc<S>,
}

impl<S: AnalyticsStore> MetricsToolHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn average_cms_hcc_risk_score(&self) -> String {
        match self.first_row(AVERAGE_RISK_SCORE_SQL).await {
            Ok(Some(row)) => match row
                .get("average_cms_hcc_risk_score")
                .and_then(JsonValue::as_f64)
            {
                Some(average) => {
                    let patients = row
                        .get("patient_count")
                        .and_then(JsonValue::as_i64)
                        .unwrap_or_default();
                    format!(
                        "Average CMS-HCC payment risk score: {average:.4} (across {patients} patient records)"
                    )
                }
                None => RISK_SCORE_GUIDANCE.to_string(),
            },
            Ok(None) => RISK_SCORE_GUIDANCE.to_string(),
            Err(e) => {
                warn!(error = %e, "Risk score metric failed");
                format!("{RISK_SCORE_GUIDANCE}\n\nDetails: {e}")
            }
        }
    }

    pub async fn overall_readmission_rate(&self) -> String {
        match self.first_row(READMISSION_RATE_SQL).await {
            Ok(Some(row)) => match row
                .get("overall_readmission_rate")
                .and_then(JsonValue::as_f64)
            {
                Some(rate) => format!("Overall 30-day unplanned readmission rate: {rate:.2}%"),
                None => format!("{READMISSION_GUIDANCE}\n\nDetails: no index admissions found"),
            },
            Ok(None) => READMISSION_GUIDANCE.to_string(),
            Err(e) => {
                warn!(error = %e, "Readmission metric failed");
                format!("{READMISSION_GUIDANCE}\n\nDetails: {e}")
            }
        }
    }

    async fn first_row(
        &self,
        sql: &str,
    ) -> StoreResult<Option<serde_json::Map<String, JsonValue>>> {
        let result = self.store.execute_query(sql, 1).await?;
        Ok(result.rows.into_iter().next())
    }
}
