//! # FHIR 边界映射
//!
//! 与临床数据存储之间的数据契约：
//! - ServiceRequest → 检查申请上下文
//! - 体重 Observation (LOINC 29463-7) ↔ 候选体重测量
//! - 决策记录 → MedicationRequest
//! - 处方持久化接口

pub mod mapping;
pub mod prescription;
pub mod store;

pub use mapping::{
    order_from_service_request, weight_from_observation, weight_observation, weights_for_patient,
};
pub use prescription::medication_request;
pub use store::{InMemoryPrescriptionStore, PrescriptionStore, StoredPrescription};
