//! 错误定义模块

use crate::models::WeightStatus;
use thiserror::Error;

/// 剂量推荐系统统一错误类型
#[derive(Error, Debug)]
pub enum DoseError {
    #[error("规则定义错误: {0}")]
    RuleDefinition(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无法识别的检查申请编码: {system}|{code}")]
    UnrecognizedOrder { system: String, code: String },

    #[error("无效体重: {value_kg} kg")]
    InvalidWeight { value_kg: f64 },

    #[error("数据不足: 检查类型 {study_type} 缺少可用体重 (状态: {weight_status:?})")]
    InsufficientData {
        study_type: String,
        weight_status: WeightStatus,
        age_days: Option<i64>,
    },

    #[error("未知方案变体: 检查类型 {study_type} 未声明变体 '{variant}'")]
    UnknownVariant { study_type: String, variant: String },

    #[error("缺少方案变体: 检查类型 {study_type} 必须指定变体")]
    VariantRequired { study_type: String },

    #[error("人工调整必须填写理由")]
    MissingReason,

    #[error("无效活度: {activity_mbq} MBq")]
    InvalidActivity { activity_mbq: f64 },

    #[error("检查申请不匹配: 推荐基于 {expected}, 实际为 {actual}")]
    OrderMismatch { expected: String, actual: String },

    #[error("检查申请缺少编码: {0}")]
    MissingOrderCoding(String),

    #[error("FHIR资源错误: {0}")]
    Fhir(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl DoseError {
    /// 稳定的机器可读错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            DoseError::RuleDefinition(_) => "RULE_DEFINITION",
            DoseError::NotFound(_) => "NOT_FOUND",
            DoseError::UnrecognizedOrder { .. } => "UNRECOGNIZED_ORDER",
            DoseError::InvalidWeight { .. } => "INVALID_WEIGHT",
            DoseError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            DoseError::UnknownVariant { .. } => "UNKNOWN_VARIANT",
            DoseError::VariantRequired { .. } => "VARIANT_REQUIRED",
            DoseError::MissingReason => "MISSING_REASON",
            DoseError::InvalidActivity { .. } => "INVALID_ACTIVITY",
            DoseError::OrderMismatch { .. } => "ORDER_MISMATCH",
            DoseError::MissingOrderCoding(_) => "MISSING_ORDER_CODING",
            DoseError::Fhir(_) => "FHIR",
            DoseError::Config(_) => "CONFIG",
            DoseError::Storage(_) => "STORAGE",
            DoseError::Serialization(_) => "SERIALIZATION",
            DoseError::Io(_) => "IO",
        }
    }

    /// 是否为调用方输入/临床数据问题（而非系统故障）
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            DoseError::RuleDefinition(_)
                | DoseError::Config(_)
                | DoseError::Storage(_)
                | DoseError::Io(_)
        )
    }
}

/// 剂量推荐系统统一结果类型
pub type Result<T> = std::result::Result<T, DoseError>;
