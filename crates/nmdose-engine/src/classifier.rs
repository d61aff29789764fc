//! 检查申请分类
//!
//! 将检查申请的 (编码系统, 编码) 精确映射到目录中的检查类型。

use nmdose_core::{DoseError, ProcedureCoding, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 规则文件中的映射条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingEntry {
    pub system: String,
    pub code: String,
    pub study: String,
}

/// 静态映射表，区分大小写
#[derive(Debug, Default)]
pub struct OrderClassifier {
    table: HashMap<(String, String), String>,
}

impl OrderClassifier {
    /// 构建映射表，所有目标检查类型必须在目录中声明
    pub fn from_entries(entries: Vec<MappingEntry>, known_studies: &HashSet<&str>) -> Result<Self> {
        let mut table = HashMap::with_capacity(entries.len());

        for entry in entries {
            if !known_studies.contains(entry.study.as_str()) {
                return Err(DoseError::RuleDefinition(format!(
                    "映射 {}|{} 指向未声明的检查类型 {}",
                    entry.system, entry.code, entry.study
                )));
            }

            let key = (entry.system, entry.code);
            if table.contains_key(&key) {
                return Err(DoseError::RuleDefinition(format!(
                    "映射重复: {}|{}",
                    key.0, key.1
                )));
            }
            table.insert(key, entry.study);
        }

        Ok(Self { table })
    }

    /// 返回检查类型编码
    pub fn classify(&self, coding: &ProcedureCoding) -> Result<&str> {
        match self.table.get(&(coding.system.clone(), coding.code.clone())) {
            Some(study) => {
                debug!("Classified {}|{} as {}", coding.system, coding.code, study);
                Ok(study)
            }
            None => Err(DoseError::UnrecognizedOrder {
                system: coding.system.clone(),
                code: coding.code.clone(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
