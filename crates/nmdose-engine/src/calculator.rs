//! 剂量计算
//!
//! 纯函数：体重 × 速率，不做取整。

use nmdose_core::{DoseError, Result, WeightEvidence};
use tracing::debug;

use crate::catalog::{ProtocolVariant, StudyTypeRule};

/// 生效速率及其来源变体
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveRate<'a> {
    pub mbq_per_kg: f64,
    pub variant: Option<&'a ProtocolVariant>,
}

/// 选择生效速率：变体速率优先于基础速率
pub fn effective_rate<'a>(
    rule: &'a StudyTypeRule,
    variant_selection: Option<&str>,
) -> Result<EffectiveRate<'a>> {
    let variant = rule.resolve_variant(variant_selection)?;

    let mbq_per_kg = match (variant, rule.base_rate()) {
        (Some(variant), _) => variant.mbq_per_kg,
        (None, Some(base)) => base,
        (None, None) => {
            return Err(DoseError::VariantRequired {
                study_type: rule.code.clone(),
            })
        }
    };

    Ok(EffectiveRate { mbq_per_kg, variant })
}

/// 计算原始活度 (MBq)
pub fn compute(
    rule: &StudyTypeRule,
    variant_selection: Option<&str>,
    evidence: &WeightEvidence,
) -> Result<f64> {
    let weight_kg = evidence
        .computation_weight()
        .ok_or_else(|| DoseError::InsufficientData {
            study_type: rule.code.clone(),
            weight_status: evidence.status,
            age_days: evidence.age_days,
        })?;

    let rate = effective_rate(rule, variant_selection)?;
    let raw_mbq = weight_kg * rate.mbq_per_kg;

    debug!(
        "Computed {} MBq for {} ({} kg x {} MBq/kg, variant {:?})",
        raw_mbq,
        rule.code,
        weight_kg,
        rate.mbq_per_kg,
        rate.variant.map(|v| v.name.as_str())
    );

    Ok(raw_mbq)
}
