//! Maps `(createdAt, slaDeadline, now)` to an urgency category and priority
//! boost. Pure and testable from its inputs alone (§4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyCategory {
    Critical,
    Urgent,
    Normal,
    Flexible,
}

impl UrgencyCategory {
    pub fn priority_boost(self) -> i32 {
        match self {
            UrgencyCategory::Critical => 10,
            UrgencyCategory::Urgent => 8,
            UrgencyCategory::Normal => 5,
            UrgencyCategory::Flexible => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Urgency {
    pub category: UrgencyCategory,
    pub remaining_min: f64,
    pub priority_boost: i32,
    pub overdue: bool,
}

/// Classifies urgency from the SLA deadline and current time. `createdAt` is
/// accepted to mirror the source signature even though only `remainingMin`
/// drives the classification.
pub fn classify(_created_at: DateTime<Utc>, sla_deadline: DateTime<Utc>, now: DateTime<Utc>) -> Urgency {
    let remaining_min = (sla_deadline - now).num_milliseconds() as f64 / 60_000.0;

    let (category, overdue) = if remaining_min < 0.0 {
        (UrgencyCategory::Critical, true)
    } else if remaining_min < 30.0 {
        (UrgencyCategory::Critical, false)
    } else if remaining_min < 60.0 {
        (UrgencyCategory::Urgent, false)
    } else if remaining_min <= 180.0 {
        (UrgencyCategory::Normal, false)
    } else {
        (UrgencyCategory::Flexible, false)
    };

    Urgency { category, remaining_min, priority_boost: category.priority_boost(), overdue }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn boundary_30_minutes_is_urgent_not_critical() {
        let now = now();
        let created = now - Duration::hours(2);
        let deadline = now + Duration::minutes(30);
        let u = classify(created, deadline, now);
        assert_eq!(u.category, UrgencyCategory::Urgent);
    }

    #[test]
    fn just_under_30_minutes_is_critical() {
        let now = now();
        let created = now - Duration::hours(2);
        let deadline = now + Duration::seconds(1799);
        let u = classify(created, deadline, now);
        assert_eq!(u.category, UrgencyCategory::Critical);
    }

    #[test]
    fn negative_remaining_is_critical_and_overdue() {
        let now = now();
        let created = now - Duration::hours(3);
        let deadline = now - Duration::minutes(5);
        let u = classify(created, deadline, now);
        assert_eq!(u.category, UrgencyCategory::Critical);
        assert!(u.overdue);
    }

    #[test]
    fn ninety_minutes_is_normal_with_boost_five() {
        let now = now();
        let created = now - Duration::hours(1);
        let deadline = now + Duration::minutes(90);
        let u = classify(created, deadline, now);
        assert_eq!(u.category, UrgencyCategory::Normal);
        assert_eq!(u.priority_boost, 5);
    }

    #[test]
    fn over_three_hours_is_flexible() {
        let now = now();
        let created = now;
        let deadline = now + Duration::minutes(181);
        let u = classify(created, deadline, now);
        assert_eq!(u.category, UrgencyCategory::Flexible);
        assert_eq!(u.priority_boost, 3);
    }
}
