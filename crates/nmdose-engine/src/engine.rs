//! 剂量推荐引擎
//!
//! 串联 检查分类 → 体重解析 → 剂量计算 → 截断与警告评估。
//! 目录只读共享，每次调用互相独立，不做任何 I/O。

use chrono::{DateTime, Utc};
use nmdose_core::{
    DoseError, DoseWarning, OrderContext, Radiopharmaceutical, Result, WeightEvidence,
    WeightObservation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::calculator::compute;
use crate::catalog::{Catalog, StudyTypeRule};
use crate::evaluator::{evaluate, weight_warnings, Provenance, RecommendationResult};
use crate::weight::{WeightPolicy, WeightResolver};

/// 单次推荐请求
#[derive(Debug, Clone, Copy)]
pub struct DoseRequest<'a> {
    pub order: &'a OrderContext,
    pub observations: &'a [WeightObservation],
    pub variant: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// 评估结果：得到推荐，或因体重数据不足而阻断
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Assessment {
    Recommended(RecommendationResult),
    InsufficientData {
        study_type: String,
        radiopharmaceutical: Radiopharmaceutical,
        weight: WeightEvidence,
        warnings: Vec<DoseWarning>,
    },
}

/// 剂量推荐引擎
#[derive(Debug, Clone)]
pub struct DoseEngine {
    catalog: Arc<Catalog>,
    resolver: WeightResolver,
}

impl DoseEngine {
    pub fn new(catalog: Arc<Catalog>, policy: WeightPolicy) -> Self {
        Self {
            catalog,
            resolver: WeightResolver::new(policy),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn policy(&self) -> WeightPolicy {
        self.resolver.policy()
    }

    /// 查找检查申请对应的规则
    pub fn rule_for(&self, order: &OrderContext) -> Result<&StudyTypeRule> {
        let study_type = self.catalog.classifier().classify(&order.coding)?;
        self.catalog.lookup(study_type)
    }

    /// 计算推荐；体重不足以 `InsufficientData` 错误返回
    pub fn recommend(&self, request: DoseRequest<'_>) -> Result<RecommendationResult> {
        let rule = self.rule_for(request.order)?;
        let evidence = self.resolver.resolve(request.observations, request.now);

        let raw_mbq = compute(rule, request.variant, &evidence)?;
        let result = evaluate(raw_mbq, rule, request.variant, &evidence)?.with_provenance(Provenance {
            order_id: request.order.order_id.clone(),
            ruleset_version: self.catalog.version().to_string(),
            evaluated_at: request.now,
        });

        info!(
            "Recommended {} MBq of {} for order {} ({}; warnings: [{}])",
            result.recommended_mbq,
            result.radiopharmaceutical.code,
            request.order.order_id,
            result.study_type,
            result
                .warnings
                .iter()
                .map(|w| w.code())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(result)
    }

    /// 与 `recommend` 相同，但把数据不足作为可展示的结果返回
    pub fn assess(&self, request: DoseRequest<'_>) -> Result<Assessment> {
        match self.recommend(request) {
            Ok(result) => Ok(Assessment::Recommended(result)),
            Err(DoseError::InsufficientData { study_type, .. }) => {
                let rule = self.catalog.lookup(&study_type)?;
                let weight = self.resolver.resolve(request.observations, request.now);
                let warnings = weight_warnings(&weight);
                warn!(
                    "Blocked recommendation for order {} ({}): weight {:?}",
                    request.order.order_id, study_type, weight.status
                );
                Ok(Assessment::InsufficientData {
                    study_type,
                    radiopharmaceutical: rule.radiopharmaceutical.clone(),
                    weight,
                    warnings,
                })
            }
            Err(e) => Err(e),
        }
    }
}
