//! 体重解析
//!
//! 从候选体重测量中选出最新的一条，并按回溯窗口判定新鲜/过期/缺失。

use chrono::{DateTime, Utc};
use nmdose_core::utils::whole_days_between;
use nmdose_core::{WeightEvidence, WeightObservation, WeightStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 体重时效策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeightPolicy {
    /// 回溯窗口（天），年龄等于窗口仍视为新鲜
    pub lookback_days: i64,
    /// 过期体重是否按缺失处理
    pub stale_as_missing: bool,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            stale_as_missing: false,
        }
    }
}

/// 体重解析器
#[derive(Debug, Clone, Default)]
pub struct WeightResolver {
    policy: WeightPolicy,
}

impl WeightResolver {
    pub fn new(policy: WeightPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WeightPolicy {
        self.policy
    }

    /// 解析体重证据
    ///
    /// 数值无效的测量被跳过并计数，回退到次新的有效测量。
    /// 测量时间相同时取录入时间较新的一条（更正记录），仍相同则按输入顺序取第一条。
    pub fn resolve(&self, observations: &[WeightObservation], now: DateTime<Utc>) -> WeightEvidence {
        let lookback_days = self.policy.lookback_days;
        let mut rejected_count = 0;
        let mut latest: Option<&WeightObservation> = None;

        for observation in observations {
            if !observation.is_valid() {
                warn!(
                    "Rejected weight observation {:?} with value {} kg",
                    observation.source_id, observation.value_kg
                );
                rejected_count += 1;
                continue;
            }
            match latest {
                Some(current) if !is_newer(observation, current) => {}
                _ => latest = Some(observation),
            }
        }

        let selected = match latest {
            Some(observation) => observation,
            None => {
                debug!("No usable weight observation among {} candidates", observations.len());
                return WeightEvidence::absent(lookback_days, rejected_count);
            }
        };

        let age_days = whole_days_between(selected.observed_at, now).max(0);
        let status = if age_days > lookback_days {
            WeightStatus::Stale
        } else {
            WeightStatus::Fresh
        };
        let usable_for_computation = !(status == WeightStatus::Stale && self.policy.stale_as_missing);

        if status == WeightStatus::Stale {
            warn!(
                "Selected weight {} kg is {} days old (lookback {} days, stale_as_missing={})",
                selected.value_kg, age_days, lookback_days, self.policy.stale_as_missing
            );
        } else {
            debug!("Selected weight {} kg, {} days old", selected.value_kg, age_days);
        }

        WeightEvidence {
            status,
            value_kg: Some(selected.value_kg),
            observed_at: Some(selected.observed_at),
            age_days: Some(age_days),
            lookback_days,
            usable_for_computation,
            rejected_count,
            source_id: selected.source_id.clone(),
        }
    }
}

fn is_newer(candidate: &WeightObservation, current: &WeightObservation) -> bool {
    (candidate.observed_at, candidate.recorded_at) > (current.observed_at, current.recorded_at)
}

/// 按给定参数解析体重证据
pub fn resolve(
    observations: &[WeightObservation],
    now: DateTime<Utc>,
    lookback_days: i64,
    stale_as_missing: bool,
) -> WeightEvidence {
    WeightResolver::new(WeightPolicy {
        lookback_days,
        stale_as_missing,
    })
    .resolve(observations, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn obs(value_kg: f64, days_ago: i64, id: &str) -> WeightObservation {
        WeightObservation {
            value_kg,
            observed_at: now() - Duration::days(days_ago),
            source_id: Some(id.to_string()),
            recorded_at: None,
        }
    }

    #[test]
    fn test_selects_latest_observation() {
        let observations = vec![obs(18.0, 40, "old"), obs(20.0, 3, "new"), obs(19.0, 10, "mid")];
        let evidence = resolve(&observations, now(), 90, false);
        assert_eq!(evidence.status, WeightStatus::Fresh);
        assert_eq!(evidence.value_kg, Some(20.0));
        assert_eq!(evidence.age_days, Some(3));
        assert_eq!(evidence.source_id.as_deref(), Some("new"));
        assert_eq!(evidence.computation_weight(), Some(20.0));
    }

    #[test]
    fn test_no_observations_is_absent() {
        let evidence = resolve(&[], now(), 90, false);
        assert_eq!(evidence.status, WeightStatus::Absent);
        assert_eq!(evidence.value_kg, None);
        assert_eq!(evidence.computation_weight(), None);
    }

    #[test]
    fn test_lookback_boundary_is_inclusive() {
        let at_limit = resolve(&[obs(20.0, 90, "a")], now(), 90, false);
        assert_eq!(at_limit.status, WeightStatus::Fresh);

        let past_limit = resolve(&[obs(20.0, 91, "a")], now(), 90, false);
        assert_eq!(past_limit.status, WeightStatus::Stale);
        assert_eq!(past_limit.age_days, Some(91));
        assert_eq!(past_limit.computation_weight(), Some(20.0));
    }

    #[test]
    fn test_stale_as_missing_blocks_computation_but_keeps_evidence() {
        let evidence = resolve(&[obs(20.0, 120, "a")], now(), 90, true);
        assert_eq!(evidence.status, WeightStatus::Stale);
        assert_eq!(evidence.value_kg, Some(20.0));
        assert!(!evidence.usable_for_computation);
        assert_eq!(evidence.computation_weight(), None);
    }

    #[test]
    fn test_invalid_latest_falls_back_to_next_latest() {
        let observations = vec![obs(17.5, 20, "valid"), obs(0.0, 1, "zero"), obs(-4.0, 2, "negative")];
        let evidence = resolve(&observations, now(), 90, false);
        assert_eq!(evidence.value_kg, Some(17.5));
        assert_eq!(evidence.rejected_count, 2);
    }

    #[test]
    fn test_all_invalid_is_absent() {
        let evidence = resolve(&[obs(0.0, 1, "zero")], now(), 90, false);
        assert_eq!(evidence.status, WeightStatus::Absent);
        assert_eq!(evidence.rejected_count, 1);
    }

    #[test]
    fn test_identical_timestamps_keep_first_seen() {
        let observations = vec![obs(21.0, 5, "first"), obs(22.0, 5, "second")];
        let evidence = resolve(&observations, now(), 90, false);
        assert_eq!(evidence.source_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_identical_timestamps_prefer_later_recorded_entry() {
        let observations = vec![
            obs(18.0, 2, "original").with_recorded_at(now() - Duration::days(2)),
            obs(20.0, 2, "corrected").with_recorded_at(now() - Duration::days(1)),
            obs(19.0, 2, "unrecorded"),
        ];
        let evidence = resolve(&observations, now(), 90, false);
        assert_eq!(evidence.source_id.as_deref(), Some("corrected"));
        assert_eq!(evidence.value_kg, Some(20.0));

        let reversed: Vec<_> = observations.into_iter().rev().collect();
        let evidence = resolve(&reversed, now(), 90, false);
        assert_eq!(evidence.source_id.as_deref(), Some("corrected"));
    }

    #[test]
    fn test_later_measurement_wins_over_later_entry() {
        let observations = vec![
            obs(20.0, 1, "measured-later"),
            obs(18.0, 5, "entered-later").with_recorded_at(now()),
        ];
        let evidence = resolve(&observations, now(), 90, false);
        assert_eq!(evidence.source_id.as_deref(), Some("measured-later"));
    }

    #[test]
    fn test_future_dated_observation_has_zero_age() {
        let evidence = resolve(&[obs(20.0, -2, "future")], now(), 90, false);
        assert_eq!(evidence.age_days, Some(0));
        assert_eq!(evidence.status, WeightStatus::Fresh);
    }
}
