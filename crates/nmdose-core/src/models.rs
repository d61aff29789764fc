//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DoseError, Result};

/// 检查申请的编码（编码系统 + 编码）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProcedureCoding {
    pub system: String,
    pub code: String,
    pub display: Option<String>,
}

impl ProcedureCoding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            display: None,
        }
    }
}

/// 原始影像检查申请
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderContext {
    pub order_id: String,          // 检查申请ID (ServiceRequest.id)
    pub patient_reference: String, // 患者引用 (Patient/xxx)
    pub coding: ProcedureCoding,
}

impl OrderContext {
    pub fn new(
        order_id: impl Into<String>,
        patient_reference: impl Into<String>,
        coding: ProcedureCoding,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            patient_reference: patient_reference.into(),
            coding,
        }
    }
}

/// 放射性药物标识
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Radiopharmaceutical {
    pub code: String,
    pub display: String,
}

/// 单次体重测量
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightObservation {
    pub value_kg: f64,
    pub observed_at: DateTime<Utc>,
    pub source_id: Option<String>, // 来源 Observation ID
    /// 录入时间 (meta.lastUpdated)，同一测量时间的更正记录以此区分
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl WeightObservation {
    /// 创建体重测量，拒绝非正数或非有限值
    pub fn new(value_kg: f64, observed_at: DateTime<Utc>) -> Result<Self> {
        let observation = Self {
            value_kg,
            observed_at,
            source_id: None,
            recorded_at: None,
        };
        if !observation.is_valid() {
            return Err(DoseError::InvalidWeight { value_kg });
        }
        Ok(observation)
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.value_kg.is_finite() && self.value_kg > 0.0
    }
}

/// 体重证据分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightStatus {
    Fresh,  // 在回溯窗口内
    Stale,  // 超出回溯窗口
    Absent, // 无可用测量
}

/// 体重解析结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightEvidence {
    pub status: WeightStatus,
    pub value_kg: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub age_days: Option<i64>,
    pub lookback_days: i64,
    /// 过期且策略要求视为缺失时为 false
    pub usable_for_computation: bool,
    /// 因数值无效而被跳过的测量数
    pub rejected_count: usize,
    pub source_id: Option<String>,
}

impl WeightEvidence {
    pub fn absent(lookback_days: i64, rejected_count: usize) -> Self {
        Self {
            status: WeightStatus::Absent,
            value_kg: None,
            observed_at: None,
            age_days: None,
            lookback_days,
            usable_for_computation: false,
            rejected_count,
            source_id: None,
        }
    }

    /// 可用于剂量计算的体重
    pub fn computation_weight(&self) -> Option<f64> {
        if self.usable_for_computation {
            self.value_kg
        } else {
            None
        }
    }

    pub fn is_stale(&self) -> bool {
        self.status == WeightStatus::Stale
    }
}

/// 推荐结果附带的警告
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoseWarning {
    ClampedLow { delta_mbq: f64 },
    ClampedHigh { delta_mbq: f64 },
    StaleWeight { age_days: i64, lookback_days: i64 },
    MissingWeight,
    RejectedWeight { count: usize },
}

impl DoseWarning {
    pub fn code(&self) -> &'static str {
        match self {
            DoseWarning::ClampedLow { .. } => "CLAMPED_LOW",
            DoseWarning::ClampedHigh { .. } => "CLAMPED_HIGH",
            DoseWarning::StaleWeight { .. } => "STALE_WEIGHT",
            DoseWarning::MissingWeight => "MISSING_WEIGHT",
            DoseWarning::RejectedWeight { .. } => "REJECTED_WEIGHT",
        }
    }

    /// 面向临床人员的说明
    pub fn message(&self) -> String {
        match self {
            DoseWarning::ClampedLow { delta_mbq } => format!(
                "Calculated activity raised to the minimum ({:.2} MBq below the bound).",
                delta_mbq
            ),
            DoseWarning::ClampedHigh { delta_mbq } => format!(
                "Calculated activity capped at the maximum ({:.2} MBq above the bound).",
                delta_mbq
            ),
            DoseWarning::StaleWeight {
                age_days,
                lookback_days,
            } => format!(
                "Body weight is {} days old (older than {} days); consider updating weight.",
                age_days, lookback_days
            ),
            DoseWarning::MissingWeight => "No usable body weight observation.".to_string(),
            DoseWarning::RejectedWeight { count } => format!(
                "{} weight observation(s) with a non-positive value were ignored.",
                count
            ),
        }
    }
}

/// 上下限截断原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClampReason {
    None,
    Min,
    Max,
}
