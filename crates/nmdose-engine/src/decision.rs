//! 决策记录构建
//!
//! 系统推荐被接受，或由临床医生附理由人工调整。人工调整值不再截断，
//! 原推荐及其警告随记录保留用于审计。

use chrono::{DateTime, Utc};
use nmdose_core::utils::generate_record_id;
use nmdose_core::{DoseError, OrderContext, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::evaluator::RecommendationResult;

/// 决策类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionKind {
    Accepted,
    Overridden { activity_mbq: f64, reason: String },
}

/// 决策记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub order: OrderContext,
    pub recommendation: RecommendationResult,
    pub kind: DecisionKind,
    pub note: Option<String>,
    pub supersedes: Option<Uuid>,
    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// 最终活度 (MBq)
    pub fn final_activity_mbq(&self) -> f64 {
        match &self.kind {
            DecisionKind::Accepted => self.recommendation.recommended_mbq,
            DecisionKind::Overridden { activity_mbq, .. } => *activity_mbq,
        }
    }

    pub fn override_reason(&self) -> Option<&str> {
        match &self.kind {
            DecisionKind::Accepted => None,
            DecisionKind::Overridden { reason, .. } => Some(reason),
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(self.kind, DecisionKind::Overridden { .. })
    }
}

/// 决策记录构建器
#[derive(Debug, Clone)]
pub struct DecisionBuilder {
    recommendation: RecommendationResult,
    order: OrderContext,
    note: Option<String>,
    supersedes: Option<Uuid>,
    decided_at: Option<DateTime<Utc>>,
}

impl DecisionBuilder {
    pub fn new(recommendation: RecommendationResult, order: OrderContext) -> Self {
        Self {
            recommendation,
            order,
            note: None,
            supersedes: None,
            decided_at: None,
        }
    }

    /// 附加备注，空白备注被忽略
    pub fn note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        if !note.trim().is_empty() {
            self.note = Some(note.trim().to_string());
        }
        self
    }

    /// 取代先前的决策记录（重新计算后）
    pub fn superseding(mut self, previous: Uuid) -> Self {
        self.supersedes = Some(previous);
        self
    }

    pub fn decided_at(mut self, at: DateTime<Utc>) -> Self {
        self.decided_at = Some(at);
        self
    }

    /// 接受系统推荐
    pub fn accept(self) -> Result<DecisionRecord> {
        self.check_order()?;
        let record = self.build(DecisionKind::Accepted);
        info!(
            "Recommendation {} accepted for order {} at {} MBq",
            record.recommendation.id,
            record.order.order_id,
            record.final_activity_mbq()
        );
        Ok(record)
    }

    /// 人工调整，理由必填且活度必须为正
    pub fn override_with(self, activity_mbq: f64, reason: &str) -> Result<DecisionRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DoseError::MissingReason);
        }
        if !(activity_mbq.is_finite() && activity_mbq > 0.0) {
            return Err(DoseError::InvalidActivity { activity_mbq });
        }
        self.check_order()?;

        let (min_mbq, max_mbq) = (self.recommendation.min_mbq, self.recommendation.max_mbq);
        if activity_mbq < min_mbq || activity_mbq > max_mbq {
            warn!(
                "Override for order {} at {} MBq is outside [{}, {}]",
                self.order.order_id, activity_mbq, min_mbq, max_mbq
            );
        }

        let record = self.build(DecisionKind::Overridden {
            activity_mbq,
            reason: reason.to_string(),
        });
        info!(
            "Recommendation {} overridden for order {}: {} -> {} MBq",
            record.recommendation.id,
            record.order.order_id,
            record.recommendation.recommended_mbq,
            activity_mbq
        );
        Ok(record)
    }

    fn check_order(&self) -> Result<()> {
        match self.recommendation.order_id() {
            Some(expected) if expected != self.order.order_id => Err(DoseError::OrderMismatch {
                expected: expected.to_string(),
                actual: self.order.order_id.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn build(self, kind: DecisionKind) -> DecisionRecord {
        DecisionRecord {
            id: generate_record_id(),
            order: self.order,
            recommendation: self.recommendation,
            kind,
            note: self.note,
            supersedes: self.supersedes,
            decided_at: self.decided_at.unwrap_or_else(Utc::now),
        }
    }
}

/// 接受系统推荐
pub fn accept(recommendation: RecommendationResult, order: OrderContext) -> Result<DecisionRecord> {
    DecisionBuilder::new(recommendation, order).accept()
}

/// 人工调整推荐
pub fn override_dose(
    recommendation: RecommendationResult,
    order: OrderContext,
    activity_mbq: f64,
    reason: &str,
) -> Result<DecisionRecord> {
    DecisionBuilder::new(recommendation, order).override_with(activity_mbq, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::test_catalog;
    use crate::evaluator::{evaluate, Provenance};
    use crate::weight::resolve;
    use nmdose_core::{ProcedureCoding, WeightObservation};

    fn order(id: &str) -> OrderContext {
        OrderContext::new(
            id,
            "Patient/p1",
            ProcedureCoding::new("http://example.org/nuclear-medicine", "BONE_SCAN"),
        )
    }

    fn recommendation(raw_mbq: f64) -> RecommendationResult {
        let catalog = test_catalog();
        let rule = catalog.lookup("BONE_SCAN").unwrap();
        let now = Utc::now();
        let weight = WeightObservation::new(raw_mbq / 10.0, now).unwrap();
        let evidence = resolve(&[weight], now, 90, false);
        evaluate(raw_mbq, rule, None, &evidence)
            .unwrap()
            .with_provenance(Provenance {
                order_id: "sr-1".to_string(),
                ruleset_version: "test-1".to_string(),
                evaluated_at: now,
            })
    }

    #[test]
    fn test_accept_uses_recommended_activity() {
        let record = accept(recommendation(200.0), order("sr-1")).unwrap();
        assert_eq!(record.kind, DecisionKind::Accepted);
        assert_eq!(record.final_activity_mbq(), 200.0);
        assert_eq!(record.order.order_id, "sr-1");
        assert!(record.override_reason().is_none());
    }

    #[test]
    fn test_override_requires_reason() {
        for reason in ["", "   ", "\t\n"] {
            for activity in [-1.0, 0.0, 120.0, 10_000.0] {
                assert!(matches!(
                    override_dose(recommendation(200.0), order("sr-1"), activity, reason),
                    Err(DoseError::MissingReason)
                ));
            }
        }
    }

    #[test]
    fn test_override_rejects_non_positive_activity() {
        for activity in [0.0, -5.0, f64::NAN] {
            assert!(matches!(
                override_dose(recommendation(200.0), order("sr-1"), activity, "protocol change"),
                Err(DoseError::InvalidActivity { .. })
            ));
        }
    }

    #[test]
    fn test_override_bypasses_clamp_and_keeps_audit_trail() {
        let rec = recommendation(30.0);
        assert!(rec.has_warning("CLAMPED_LOW"));

        let record = override_dose(rec, order("sr-1"), 35.0, "  SPECT only, low count acceptable ").unwrap();
        assert_eq!(record.final_activity_mbq(), 35.0);
        assert_eq!(record.override_reason(), Some("SPECT only, low count acceptable"));
        assert_eq!(record.recommendation.recommended_mbq, 50.0);
        assert!(record.recommendation.has_warning("CLAMPED_LOW"));
    }

    #[test]
    fn test_order_mismatch_is_rejected() {
        assert!(matches!(
            accept(recommendation(200.0), order("sr-2")),
            Err(DoseError::OrderMismatch { .. })
        ));
    }

    #[test]
    fn test_builder_note_and_supersedes() {
        let previous = accept(recommendation(200.0), order("sr-1")).unwrap();
        let record = DecisionBuilder::new(recommendation(210.0), order("sr-1"))
            .note("weight re-measured")
            .superseding(previous.id)
            .accept()
            .unwrap();
        assert_eq!(record.supersedes, Some(previous.id));
        assert_eq!(record.note.as_deref(), Some("weight re-measured"));
        assert_ne!(record.id, previous.id);
    }
}
