//! 上下限截断与警告评估
//!
//! 截断与体重过期互不排斥，所有适用的警告都会被收集。

use chrono::{DateTime, Utc};
use nmdose_core::utils::generate_record_id;
use nmdose_core::{ClampReason, DoseWarning, Radiopharmaceutical, Result, WeightEvidence, WeightStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::calculator::effective_rate;
use crate::catalog::StudyTypeRule;

/// 推荐来源信息，由引擎在返回前附加
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub order_id: String,
    pub ruleset_version: String,
    pub evaluated_at: DateTime<Utc>,
}

/// 剂量推荐结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub id: Uuid,
    pub study_type: String,
    pub radiopharmaceutical: Radiopharmaceutical,
    pub variant: Option<String>,
    pub rate_mbq_per_kg: f64,
    pub raw_mbq: f64,
    pub recommended_mbq: f64,
    pub min_mbq: f64,
    pub max_mbq: f64,
    pub clamp_reason: ClampReason,
    pub warnings: Vec<DoseWarning>,
    pub weight: WeightEvidence,
    pub provenance: Option<Provenance>,
}

impl RecommendationResult {
    /// 附加来源信息（构造阶段使用）
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code() == code)
    }

    pub fn was_clamped(&self) -> bool {
        self.clamp_reason != ClampReason::None
    }

    pub fn order_id(&self) -> Option<&str> {
        self.provenance.as_ref().map(|p| p.order_id.as_str())
    }
}

/// 应用上下限并收集警告
pub fn evaluate(
    raw_mbq: f64,
    rule: &StudyTypeRule,
    variant_selection: Option<&str>,
    evidence: &WeightEvidence,
) -> Result<RecommendationResult> {
    let rate = effective_rate(rule, variant_selection)?;
    let (min_mbq, max_mbq) = rule.bounds_for(rate.variant);

    let mut warnings = Vec::new();

    let (recommended_mbq, clamp_reason) = if raw_mbq < min_mbq {
        warnings.push(DoseWarning::ClampedLow {
            delta_mbq: min_mbq - raw_mbq,
        });
        (min_mbq, ClampReason::Min)
    } else if raw_mbq > max_mbq {
        warnings.push(DoseWarning::ClampedHigh {
            delta_mbq: raw_mbq - max_mbq,
        });
        (max_mbq, ClampReason::Max)
    } else {
        (raw_mbq, ClampReason::None)
    };

    if clamp_reason != ClampReason::None {
        warn!(
            "Clamped {} activity from {} to {} MBq (bounds [{}, {}])",
            rule.code, raw_mbq, recommended_mbq, min_mbq, max_mbq
        );
    }

    warnings.extend(weight_warnings(evidence));

    debug!(
        "Evaluated {}: recommended {} MBq with {} warning(s)",
        rule.code,
        recommended_mbq,
        warnings.len()
    );

    Ok(RecommendationResult {
        id: generate_record_id(),
        study_type: rule.code.clone(),
        radiopharmaceutical: rule.radiopharmaceutical.clone(),
        variant: rate.variant.map(|v| v.name.clone()),
        rate_mbq_per_kg: rate.mbq_per_kg,
        raw_mbq,
        recommended_mbq,
        min_mbq,
        max_mbq,
        clamp_reason,
        warnings,
        weight: evidence.clone(),
        provenance: None,
    })
}

/// 与体重证据相关的警告
///
/// 计算被阻断时调用方也用它来说明原因。
pub fn weight_warnings(evidence: &WeightEvidence) -> Vec<DoseWarning> {
    let mut warnings = Vec::new();

    if evidence.status == WeightStatus::Stale {
        warnings.push(DoseWarning::StaleWeight {
            age_days: evidence.age_days.unwrap_or_default(),
            lookback_days: evidence.lookback_days,
        });
    }
    if !evidence.usable_for_computation {
        warnings.push(DoseWarning::MissingWeight);
    }
    if evidence.rejected_count > 0 {
        warnings.push(DoseWarning::RejectedWeight {
            count: evidence.rejected_count,
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::compute;
    use crate::catalog::tests::test_catalog;
    use crate::weight::resolve;
    use chrono::{Duration, TimeZone};
    use nmdose_core::WeightObservation;

    fn evidence(weight_kg: f64, days_ago: i64, stale_as_missing: bool) -> WeightEvidence {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let observation = WeightObservation {
            value_kg: weight_kg,
            observed_at: now - Duration::days(days_ago),
            source_id: None,
            recorded_at: None,
        };
        resolve(&[observation], now, 90, stale_as_missing)
    }

    #[test]
    fn test_within_bounds_is_unchanged() {
        let catalog = test_catalog();
        let rule = catalog.lookup("BONE_SCAN").unwrap();
        for raw in [50.0, 123.4, 399.99, 400.0] {
            let result = evaluate(raw, rule, None, &evidence(20.0, 1, false)).unwrap();
            assert_eq!(result.recommended_mbq, raw);
            assert_eq!(result.clamp_reason, ClampReason::None);
            assert!(result.warnings.is_empty());
        }
    }

    #[test]
    fn test_below_minimum_clamps_low() {
        let catalog = test_catalog();
        let rule = catalog.lookup("BONE_SCAN").unwrap();
        let result = evaluate(32.5, rule, None, &evidence(3.25, 1, false)).unwrap();
        assert_eq!(result.recommended_mbq, 50.0);
        assert_eq!(result.raw_mbq, 32.5);
        assert_eq!(result.clamp_reason, ClampReason::Min);
        assert_eq!(result.warnings, vec![DoseWarning::ClampedLow { delta_mbq: 17.5 }]);
    }

    #[test]
    fn test_above_maximum_clamps_high() {
        let catalog = test_catalog();
        let rule = catalog.lookup("BONE_SCAN").unwrap();
        let result = evaluate(650.0, rule, None, &evidence(65.0, 1, false)).unwrap();
        assert_eq!(result.recommended_mbq, 400.0);
        assert!(result.has_warning("CLAMPED_HIGH"));
        assert!(!result.has_warning("CLAMPED_LOW"));
    }

    #[test]
    fn test_variant_bounds_override_base() {
        let catalog = test_catalog();
        let rule = catalog.lookup("MAG3").unwrap();
        let result = evaluate(170.0, rule, Some("flow"), &evidence(30.0, 1, false)).unwrap();
        assert_eq!(result.max_mbq, 185.0);
        assert_eq!(result.recommended_mbq, 170.0);
        assert_eq!(result.variant.as_deref(), Some("flow"));

        let base = evaluate(170.0, rule, None, &evidence(30.0, 1, false)).unwrap();
        assert_eq!(base.recommended_mbq, 148.0);
    }

    #[test]
    fn test_clamp_and_stale_are_collected_together() {
        let catalog = test_catalog();
        let rule = catalog.lookup("BONE_SCAN").unwrap();
        let stale = evidence(2.0, 120, false);
        let raw = compute(rule, None, &stale).unwrap();
        let result = evaluate(raw, rule, None, &stale).unwrap();
        assert!(result.has_warning("CLAMPED_LOW"));
        assert!(result.warnings.contains(&DoseWarning::StaleWeight {
            age_days: 120,
            lookback_days: 90
        }));
    }

    #[test]
    fn test_forced_absent_still_records_stale_warning() {
        let stale = evidence(20.0, 95, true);
        let warnings = weight_warnings(&stale);
        assert_eq!(
            warnings,
            vec![
                DoseWarning::StaleWeight {
                    age_days: 95,
                    lookback_days: 90
                },
                DoseWarning::MissingWeight
            ]
        );
    }
}
