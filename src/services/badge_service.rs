//! Badge Evaluation - pure rule evaluator over an account's current
//! stats. Re-entrant and race-tolerant: uniqueness of the grant lives in
//! the store, so two evaluators racing on the same account both converge
//! on a single account_badges row.

use sea_orm::*;

use crate::models::account::{self, Entity as Account};
use crate::models::badge::{self, Entity as Badge};
use crate::models::quest_submission::{self, Entity as QuestSubmission};

use super::ServiceError;
use super::ledger_service::{self, BadgeGrant};

/// The stats badge predicates are evaluated against. `experience` is
/// lifetime earned points, so every field only ever grows.
#[derive(Debug, Clone, Copy)]
pub struct AccountStats {
    pub level: i32,
    pub experience: i64,
    pub approved_quests: i64,
}

/// All thresholds present on a badge must hold; absent thresholds are
/// ignored. A badge with no thresholds at all never auto-qualifies.
pub fn qualifies(badge: &badge::Model, stats: &AccountStats) -> bool {
    if badge.required_level.is_none()
        && badge.required_quests.is_none()
        && badge.required_points.is_none()
    {
        return false;
    }
    if let Some(level) = badge.required_level {
        if stats.level < level {
            return false;
        }
    }
    if let Some(quests) = badge.required_quests {
        if stats.approved_quests < i64::from(quests) {
            return false;
        }
    }
    if let Some(points) = badge.required_points {
        if stats.experience < points {
            return false;
        }
    }
    true
}

pub async fn stats_for(
    db: &DatabaseConnection,
    school_id: i32,
    account_id: i32,
) -> Result<AccountStats, ServiceError> {
    let account = Account::find_by_id(account_id)
        .filter(account::Column::SchoolId.eq(school_id))
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let approved_quests = QuestSubmission::find()
        .filter(quest_submission::Column::AccountId.eq(account_id))
        .filter(quest_submission::Column::Status.eq("approved"))
        .count(db)
        .await?;

    Ok(AccountStats {
        level: account.level,
        experience: account.experience,
        approved_quests: approved_quests as i64,
    })
}

/// Evaluate every active badge of the school against the account's stats
/// and request a one-time grant for each badge that qualifies. Returns
/// the badges that were freshly granted by this run.
pub async fn evaluate(
    db: &DatabaseConnection,
    school_id: i32,
    account_id: i32,
    actor: i32,
) -> Result<Vec<badge::Model>, ServiceError> {
    let stats = stats_for(db, school_id, account_id).await?;

    let badges = Badge::find()
        .filter(badge::Column::SchoolId.eq(school_id))
        .filter(badge::Column::IsActive.eq(true))
        .all(db)
        .await?;

    let mut earned = Vec::new();
    for badge in badges {
        if !qualifies(&badge, &stats) {
            continue;
        }
        match ledger_service::grant_badge_once(db, school_id, account_id, badge.id, actor).await? {
            BadgeGrant::Granted => {
                tracing::info!(
                    "account {} earned badge '{}' ({})",
                    account_id,
                    badge.name,
                    badge.id
                );
                earned.push(badge);
            }
            BadgeGrant::AlreadyGranted => {}
        }
    }

    Ok(earned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge(
        level: Option<i32>,
        quests: Option<i32>,
        points: Option<i64>,
    ) -> crate::models::badge::Model {
        crate::models::badge::Model {
            id: 1,
            school_id: 1,
            name: "test".to_string(),
            description: None,
            icon: None,
            required_level: level,
            required_quests: quests,
            required_points: points,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn all_present_thresholds_must_hold() {
        let stats = AccountStats {
            level: 3,
            experience: 120,
            approved_quests: 2,
        };
        assert!(qualifies(&badge(Some(3), None, None), &stats));
        assert!(qualifies(&badge(Some(2), Some(2), Some(100)), &stats));
        assert!(!qualifies(&badge(Some(4), None, None), &stats));
        assert!(!qualifies(&badge(Some(3), Some(5), None), &stats));
        assert!(!qualifies(&badge(None, None, Some(121)), &stats));
    }

    #[test]
    fn thresholdless_badge_never_auto_qualifies() {
        let stats = AccountStats {
            level: 99,
            experience: 1_000_000,
            approved_quests: 500,
        };
        assert!(!qualifies(&badge(None, None, None), &stats));
    }
}
