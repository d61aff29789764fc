//! 剂量规则目录
//!
//! 进程启动时从声明式规则定义加载一次，之后只读。

use nmdose_core::{DoseError, Radiopharmaceutical, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::classifier::{MappingEntry, OrderClassifier};

const BUNDLED_RULES: &str = include_str!("../rules/na_consensus_2024.json");

/// 规则文件顶层结构
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDefinition {
    version: String,
    #[serde(default)]
    guideline: Option<GuidelineInfo>,
    studies: Vec<StudyDefinition>,
    #[serde(default)]
    mapping: Vec<MappingEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StudyDefinition {
    code: String,
    #[serde(default)]
    display: Option<String>,
    radiopharmaceutical: Radiopharmaceutical,
    #[serde(default)]
    mbq_per_kg: Option<f64>,
    min_mbq: f64,
    max_mbq: f64,
    #[serde(default)]
    default_variant: Option<String>,
    #[serde(default)]
    variants: Vec<VariantDefinition>,
    #[serde(default)]
    considerations: Vec<String>,
    #[serde(default)]
    references: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariantDefinition {
    name: String,
    #[serde(default)]
    display: Option<String>,
    mbq_per_kg: f64,
    #[serde(default)]
    min_mbq: Option<f64>,
    #[serde(default)]
    max_mbq: Option<f64>,
}

/// 指南信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuidelineInfo {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// 剂量计算方式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DosingMode {
    PerKilogram { mbq_per_kg: f64 }, // 按体重固定速率
    VariantTable,                    // 必须由变体给出速率
}

/// 方案变体：在基础规则之上的稀疏覆盖
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolVariant {
    pub name: String,
    pub display: Option<String>,
    pub mbq_per_kg: f64,
    pub min_mbq: Option<f64>,
    pub max_mbq: Option<f64>,
}

/// 检查类型剂量规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyTypeRule {
    pub code: String,
    pub display: Option<String>,
    pub radiopharmaceutical: Radiopharmaceutical,
    pub dosing: DosingMode,
    pub min_mbq: f64,
    pub max_mbq: f64,
    pub default_variant: Option<String>,
    pub variants: Vec<ProtocolVariant>,
    pub considerations: Vec<String>,
    pub references: Vec<String>,
}

impl StudyTypeRule {
    /// 按名称查找已声明的变体
    pub fn variant(&self, name: &str) -> Option<&ProtocolVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// 解析生效的变体：请求的变体优先，其次是默认变体
    pub fn resolve_variant(&self, requested: Option<&str>) -> Result<Option<&ProtocolVariant>> {
        let name = match requested.or(self.default_variant.as_deref()) {
            Some(name) => name,
            None => return Ok(None),
        };

        self.variant(name)
            .map(Some)
            .ok_or_else(|| DoseError::UnknownVariant {
                study_type: self.code.clone(),
                variant: name.to_string(),
            })
    }

    /// 基础速率 (MBq/kg)
    pub fn base_rate(&self) -> Option<f64> {
        match self.dosing {
            DosingMode::PerKilogram { mbq_per_kg } => Some(mbq_per_kg),
            DosingMode::VariantTable => None,
        }
    }

    /// 生效的上下限：变体覆盖优先于基础规则
    pub fn bounds_for(&self, variant: Option<&ProtocolVariant>) -> (f64, f64) {
        let min = variant.and_then(|v| v.min_mbq).unwrap_or(self.min_mbq);
        let max = variant.and_then(|v| v.max_mbq).unwrap_or(self.max_mbq);
        (min, max)
    }
}

/// 不可变规则目录
#[derive(Debug)]
pub struct Catalog {
    version: String,
    guideline: Option<GuidelineInfo>,
    rules: HashMap<String, StudyTypeRule>,
    classifier: OrderClassifier,
}

impl Catalog {
    /// 解析并校验 JSON 规则定义
    pub fn load(definition: &str) -> Result<Self> {
        let definition: RuleDefinition = serde_json::from_str(definition)
            .map_err(|e| DoseError::RuleDefinition(format!("规则文件格式错误: {}", e)))?;

        if definition.version.trim().is_empty() {
            return Err(DoseError::RuleDefinition("规则版本不能为空".to_string()));
        }

        let mut rules = HashMap::with_capacity(definition.studies.len());
        for study in definition.studies {
            let rule = build_rule(study)?;
            if rules.contains_key(&rule.code) {
                return Err(DoseError::RuleDefinition(format!(
                    "检查类型重复: {}",
                    rule.code
                )));
            }
            debug!("Loaded dosing rule {} ({:?})", rule.code, rule.dosing);
            rules.insert(rule.code.clone(), rule);
        }

        let known: HashSet<&str> = rules.keys().map(String::as_str).collect();
        let classifier = OrderClassifier::from_entries(definition.mapping, &known)?;

        info!(
            "Loaded rule catalog version {} with {} study types and {} order mappings",
            definition.version,
            rules.len(),
            classifier.len()
        );

        Ok(Self {
            version: definition.version,
            guideline: definition.guideline,
            rules,
            classifier,
        })
    }

    /// 从文件加载规则定义
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DoseError::RuleDefinition(format!("无法读取规则文件 {}: {}", path.display(), e))
        })?;
        info!("Loading rule catalog from {}", path.display());
        Self::load(&content)
    }

    /// 内置的默认规则定义
    pub fn bundled() -> Result<Self> {
        Self::load(BUNDLED_RULES)
    }

    pub fn lookup(&self, study_type: &str) -> Result<&StudyTypeRule> {
        self.rules
            .get(study_type)
            .ok_or_else(|| DoseError::NotFound(format!("检查类型 {}", study_type)))
    }

    pub fn classifier(&self) -> &OrderClassifier {
        &self.classifier
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn guideline(&self) -> Option<&GuidelineInfo> {
        self.guideline.as_ref()
    }

    /// 按编码排序的全部规则
    pub fn rules(&self) -> Vec<&StudyTypeRule> {
        let mut rules: Vec<_> = self.rules.values().collect();
        rules.sort_by(|a, b| a.code.cmp(&b.code));
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn build_rule(study: StudyDefinition) -> Result<StudyTypeRule> {
    let code = study.code.trim().to_string();
    if code.is_empty() {
        return Err(DoseError::RuleDefinition("检查类型编码不能为空".to_string()));
    }

    check_positive(&code, "min_mbq", study.min_mbq)?;
    check_positive(&code, "max_mbq", study.max_mbq)?;
    check_bounds(&code, study.min_mbq, study.max_mbq)?;

    let dosing = match study.mbq_per_kg {
        Some(rate) => {
            check_positive(&code, "mbq_per_kg", rate)?;
            DosingMode::PerKilogram { mbq_per_kg: rate }
        }
        None if !study.variants.is_empty() => DosingMode::VariantTable,
        None => {
            return Err(DoseError::RuleDefinition(format!(
                "{}: 必须声明 mbq_per_kg 或至少一个变体",
                code
            )))
        }
    };

    let mut seen = HashSet::new();
    let mut variants = Vec::with_capacity(study.variants.len());
    for variant in study.variants {
        let name = variant.name.trim().to_string();
        let label = format!("{}/{}", code, name);
        if name.is_empty() {
            return Err(DoseError::RuleDefinition(format!("{}: 变体名称不能为空", code)));
        }
        if !seen.insert(name.clone()) {
            return Err(DoseError::RuleDefinition(format!("变体名称冲突: {}", label)));
        }

        check_positive(&label, "mbq_per_kg", variant.mbq_per_kg)?;
        if let Some(min) = variant.min_mbq {
            check_positive(&label, "min_mbq", min)?;
        }
        if let Some(max) = variant.max_mbq {
            check_positive(&label, "max_mbq", max)?;
        }
        check_bounds(
            &label,
            variant.min_mbq.unwrap_or(study.min_mbq),
            variant.max_mbq.unwrap_or(study.max_mbq),
        )?;

        variants.push(ProtocolVariant {
            name,
            display: variant.display,
            mbq_per_kg: variant.mbq_per_kg,
            min_mbq: variant.min_mbq,
            max_mbq: variant.max_mbq,
        });
    }

    if let Some(default) = &study.default_variant {
        if !seen.contains(default) {
            return Err(DoseError::RuleDefinition(format!(
                "{}: 默认变体 '{}' 未声明",
                code, default
            )));
        }
    }

    Ok(StudyTypeRule {
        code,
        display: study.display,
        radiopharmaceutical: study.radiopharmaceutical,
        dosing,
        min_mbq: study.min_mbq,
        max_mbq: study.max_mbq,
        default_variant: study.default_variant,
        variants,
        considerations: study.considerations,
        references: study.references,
    })
}

fn check_positive(label: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DoseError::RuleDefinition(format!(
            "{}: {} 必须为正数, 实际为 {}",
            label, field, value
        )))
    }
}

fn check_bounds(label: &str, min: f64, max: f64) -> Result<()> {
    if min > max {
        return Err(DoseError::RuleDefinition(format!(
            "{}: min_mbq ({}) 大于 max_mbq ({})",
            label, min, max
        )));
    }
    Ok(())
}
