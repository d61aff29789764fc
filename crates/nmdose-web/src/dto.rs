//! 请求与响应数据结构
//!
//! 展示用的取整只在这里进行，引擎内部保留精确值。

use chrono::{DateTime, Utc};
use nmdose_core::utils::round_to;
use nmdose_core::{ClampReason, DoseWarning, Radiopharmaceutical, WeightEvidence, WeightStatus};
use nmdose_engine::{
    Assessment, DecisionKind, DecisionRecord, DosingMode, ProtocolVariant, RecommendationResult,
    StudyTypeRule,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 推荐请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    pub service_request: Value,
    /// Bundle、Observation 数组或单个 Observation
    #[serde(default)]
    pub weight_observations: Value,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// 体重录入请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEntryRequest {
    /// `Patient/xxx` 或裸ID
    #[serde(alias = "patientReference")]
    pub patient_id: String,
    pub weight_kg: f64,
    #[serde(default)]
    pub effective_date_time: Option<String>,
}

/// 人工调整
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideInput {
    pub activity_mbq: f64,
    #[serde(default)]
    pub reason: String,
}

/// 决策提交请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[serde(flatten)]
    pub inputs: RecommendRequest,
    #[serde(default, rename = "override")]
    pub override_input: Option<OverrideInput>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub supersedes: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    MissingData,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningView {
    pub code: &'static str,
    pub message: String,
}

impl From<&DoseWarning> for WarningView {
    fn from(warning: &DoseWarning) -> Self {
        Self {
            code: warning.code(),
            message: warning.message(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightView {
    pub status: WeightStatus,
    pub weight_kg: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub age_days: Option<i64>,
    pub lookback_days: i64,
    pub source_id: Option<String>,
}

impl From<&WeightEvidence> for WeightView {
    fn from(evidence: &WeightEvidence) -> Self {
        Self {
            status: evidence.status,
            weight_kg: evidence.value_kg,
            observed_at: evidence.observed_at,
            age_days: evidence.age_days,
            lookback_days: evidence.lookback_days,
            source_id: evidence.source_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationView {
    pub id: Uuid,
    #[serde(rename = "recommendedMBq")]
    pub recommended_mbq: f64,
    #[serde(rename = "rawCalculatedMBq")]
    pub raw_calculated_mbq: f64,
    #[serde(rename = "mbqPerKg")]
    pub mbq_per_kg: f64,
    #[serde(rename = "minMBq")]
    pub min_mbq: f64,
    #[serde(rename = "maxMBq")]
    pub max_mbq: f64,
    pub clamp_reason: ClampReason,
}

impl From<&RecommendationResult> for RecommendationView {
    fn from(result: &RecommendationResult) -> Self {
        Self {
            id: result.id,
            recommended_mbq: round_to(result.recommended_mbq, 1),
            raw_calculated_mbq: round_to(result.raw_mbq, 2),
            mbq_per_kg: result.rate_mbq_per_kg,
            min_mbq: result.min_mbq,
            max_mbq: result.max_mbq,
            clamp_reason: result.clamp_reason,
        }
    }
}

/// 推荐响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    pub status: ResponseStatus,
    pub rule_set_version: String,
    pub order_id: String,
    pub study_key: String,
    pub radiopharmaceutical: Radiopharmaceutical,
    pub variant: Option<String>,
    pub recommendation: Option<RecommendationView>,
    pub weight: WeightView,
    pub warnings: Vec<WarningView>,
    pub missing: Vec<&'static str>,
    pub message: String,
    pub considerations: Vec<String>,
    pub references: Vec<String>,
}

impl RecommendResponse {
    pub fn from_assessment(
        assessment: &Assessment,
        rule: &StudyTypeRule,
        requested_variant: Option<&str>,
        rule_set_version: &str,
        order_id: &str,
    ) -> Self {
        let base = Self {
            status: ResponseStatus::Ok,
            rule_set_version: rule_set_version.to_string(),
            order_id: order_id.to_string(),
            study_key: rule.code.clone(),
            radiopharmaceutical: rule.radiopharmaceutical.clone(),
            variant: None,
            recommendation: None,
            weight: WeightView::from(&WeightEvidence::absent(0, 0)),
            warnings: Vec::new(),
            missing: Vec::new(),
            message: String::new(),
            considerations: rule.considerations.clone(),
            references: rule.references.clone(),
        };

        match assessment {
            Assessment::Recommended(result) => Self {
                variant: result.variant.clone(),
                recommendation: Some(RecommendationView::from(result)),
                weight: WeightView::from(&result.weight),
                warnings: result.warnings.iter().map(WarningView::from).collect(),
                message: format!(
                    "Recommended {} MBq of {}.",
                    round_to(result.recommended_mbq, 1),
                    result.radiopharmaceutical.display
                ),
                ..base
            },
            Assessment::InsufficientData {
                weight, warnings, ..
            } => Self {
                status: ResponseStatus::MissingData,
                variant: requested_variant
                    .map(str::to_string)
                    .or_else(|| rule.default_variant.clone()),
                weight: WeightView::from(weight),
                warnings: warnings.iter().map(WarningView::from).collect(),
                missing: vec!["weightKg"],
                message: "No usable body weight; record a current weight to compute a dose."
                    .to_string(),
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionView {
    pub id: Uuid,
    pub order_id: String,
    pub kind: &'static str,
    #[serde(rename = "finalActivityMBq")]
    pub final_activity_mbq: f64,
    pub recommendation: RecommendationView,
    pub warnings: Vec<WarningView>,
    pub override_reason: Option<String>,
    pub note: Option<String>,
    pub supersedes: Option<Uuid>,
    pub decided_at: DateTime<Utc>,
}

impl From<&DecisionRecord> for DecisionView {
    fn from(record: &DecisionRecord) -> Self {
        Self {
            id: record.id,
            order_id: record.order.order_id.clone(),
            kind: match record.kind {
                DecisionKind::Accepted => "accepted",
                DecisionKind::Overridden { .. } => "overridden",
            },
            final_activity_mbq: round_to(record.final_activity_mbq(), 1),
            recommendation: RecommendationView::from(&record.recommendation),
            warnings: record
                .recommendation
                .warnings
                .iter()
                .map(WarningView::from)
                .collect(),
            override_reason: record.override_reason().map(str::to_string),
            note: record.note.clone(),
            supersedes: record.supersedes,
            decided_at: record.decided_at,
        }
    }
}

/// 决策提交响应
#[derive(Debug, Clone, Serialize)]
pub struct DecisionResponse {
    pub ok: bool,
    pub id: String,
    pub decision: DecisionView,
    pub resource: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantView {
    pub name: String,
    pub display: Option<String>,
    pub mbq_per_kg: f64,
    pub min_mbq: Option<f64>,
    pub max_mbq: Option<f64>,
}

impl From<&ProtocolVariant> for VariantView {
    fn from(variant: &ProtocolVariant) -> Self {
        Self {
            name: variant.name.clone(),
            display: variant.display.clone(),
            mbq_per_kg: variant.mbq_per_kg,
            min_mbq: variant.min_mbq,
            max_mbq: variant.max_mbq,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyView {
    pub code: String,
    pub display: Option<String>,
    pub radiopharmaceutical: Radiopharmaceutical,
    pub mbq_per_kg: Option<f64>,
    pub min_mbq: f64,
    pub max_mbq: f64,
    pub default_variant: Option<String>,
    pub variants: Vec<VariantView>,
    pub considerations: Vec<String>,
    pub references: Vec<String>,
}

impl From<&StudyTypeRule> for StudyView {
    fn from(rule: &StudyTypeRule) -> Self {
        Self {
            code: rule.code.clone(),
            display: rule.display.clone(),
            radiopharmaceutical: rule.radiopharmaceutical.clone(),
            mbq_per_kg: match rule.dosing {
                DosingMode::PerKilogram { mbq_per_kg } => Some(mbq_per_kg),
                DosingMode::VariantTable => None,
            },
            min_mbq: rule.min_mbq,
            max_mbq: rule.max_mbq,
            default_variant: rule.default_variant.clone(),
            variants: rule.variants.iter().map(VariantView::from).collect(),
            considerations: rule.considerations.clone(),
            references: rule.references.clone(),
        }
    }
}
