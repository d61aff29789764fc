//! 剂量推荐引擎演示程序
//!
//! 使用内置规则为几个示例检查申请计算推荐活度，并演示人工调整

use chrono::{Duration, Utc};
use nmdose_core::{OrderContext, ProcedureCoding, WeightObservation};
use nmdose_engine::{Assessment, Catalog, DecisionBuilder, DoseEngine, DoseRequest, WeightPolicy};
use std::sync::Arc;

const NM: &str = "http://example.org/nuclear-medicine";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let catalog = Arc::new(Catalog::bundled()?);
    let engine = DoseEngine::new(catalog.clone(), WeightPolicy::default());
    let now = Utc::now();

    println!("🚀 儿科核医学剂量推荐演示 (规则版本 {})\n", catalog.version());

    let cases = [
        ("sr-1", "BONE_SCAN", None, 18.4, 12),
        ("sr-2", "MAG3", Some("flow"), 9.1, 30),
        ("sr-3", "FDG_PET", Some("brain-standard"), 2.8, 5),
        ("sr-4", "DMSA", None, 35.0, 140),
    ];

    for (order_id, code, variant, weight_kg, days_ago) in cases {
        let order = OrderContext::new(order_id, "Patient/demo", ProcedureCoding::new(NM, code));
        let weights = [WeightObservation::new(weight_kg, now - Duration::days(days_ago))?];
        let request = DoseRequest {
            order: &order,
            observations: &weights,
            variant,
            now,
        };

        match engine.assess(request)? {
            Assessment::Recommended(result) => {
                println!(
                    "📋 {} {:<10} {:>5.1} kg -> 原始 {:>7.2} MBq, 推荐 {:>7.2} MBq",
                    order_id, code, weight_kg, result.raw_mbq, result.recommended_mbq
                );
                for warning in &result.warnings {
                    println!("   ⚠️  {}: {}", warning.code(), warning.message());
                }

                if result.was_clamped() {
                    let decision = DecisionBuilder::new(result, order.clone())
                        .note("演示")
                        .override_with(weight_kg * 3.0, "physician judgement")?;
                    println!(
                        "   ✍️  人工调整为 {:.1} MBq ({:?})",
                        decision.final_activity_mbq(),
                        decision.override_reason()
                    );
                }
            }
            Assessment::InsufficientData { study_type, warnings, .. } => {
                println!("⛔ {} {} 缺少可用体重", order_id, study_type);
                for warning in &warnings {
                    println!("   ⚠️  {}", warning.message());
                }
            }
        }
    }

    Ok(())
}
