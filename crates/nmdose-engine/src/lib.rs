//! # 儿科核医学剂量推荐引擎
//!
//! 根据患者体重和检查类型，按已发布的体重剂量指南推荐放射性药物活度 (MBq)：
//! - 规则目录：启动时加载一次的不可变剂量规则
//! - 检查分类：检查申请编码到检查类型的精确映射
//! - 体重解析：选择最新体重并判定时效
//! - 剂量计算与截断：体重 × 速率，再按上下限截断并记录警告
//! - 决策记录：接受推荐或附理由人工调整

pub mod calculator;
pub mod catalog;
pub mod classifier;
pub mod decision;
pub mod engine;
pub mod evaluator;
pub mod weight;

// 重新导出主要类型
pub use calculator::{compute, effective_rate, EffectiveRate};
pub use catalog::{Catalog, DosingMode, GuidelineInfo, ProtocolVariant, StudyTypeRule};
pub use classifier::{MappingEntry, OrderClassifier};
pub use decision::{accept, override_dose, DecisionBuilder, DecisionKind, DecisionRecord};
pub use engine::{Assessment, DoseEngine, DoseRequest};
pub use evaluator::{evaluate, weight_warnings, Provenance, RecommendationResult};
pub use weight::{resolve, WeightPolicy, WeightResolver};
