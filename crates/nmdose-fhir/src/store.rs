//! 处方持久化接口
//!
//! 决策记录渲染为 MedicationRequest 后提交到临床数据存储。
//! 内存实现用于单机部署和测试。

use async_trait::async_trait;
use nmdose_core::Result;
use nmdose_engine::DecisionRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::prescription::medication_request;

/// 已存储的处方
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredPrescription {
    pub id: String,
    pub resource: Value,
}

impl StoredPrescription {
    /// 处方所基于的检查申请引用 (basedOn)
    pub fn based_on(&self) -> Option<&str> {
        self.resource
            .pointer("/basedOn/0/reference")
            .and_then(Value::as_str)
    }
}

/// 处方存储接口
#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    /// 提交决策记录，同一记录重复提交返回已有处方
    async fn submit(&self, record: &DecisionRecord) -> Result<StoredPrescription>;

    /// 按ID获取处方
    async fn get(&self, id: &str) -> Result<Option<StoredPrescription>>;
}

/// 内存处方存储
#[derive(Debug, Clone, Default)]
pub struct InMemoryPrescriptionStore {
    prescriptions: Arc<RwLock<HashMap<String, StoredPrescription>>>,
}

impl InMemoryPrescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.prescriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.prescriptions.read().await.is_empty()
    }
}

#[async_trait]
impl PrescriptionStore for InMemoryPrescriptionStore {
    async fn submit(&self, record: &DecisionRecord) -> Result<StoredPrescription> {
        let id = record.id.to_string();
        let mut prescriptions = self.prescriptions.write().await;

        if let Some(existing) = prescriptions.get(&id) {
            debug!("Decision {} already submitted", id);
            return Ok(existing.clone());
        }

        let stored = StoredPrescription {
            id: id.clone(),
            resource: medication_request(record),
        };
        prescriptions.insert(id.clone(), stored.clone());

        info!(
            "Stored MedicationRequest {} for order {} ({} MBq)",
            id,
            record.order.order_id,
            record.final_activity_mbq()
        );
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<StoredPrescription>> {
        Ok(self.prescriptions.read().await.get(id).cloned())
    }
}
