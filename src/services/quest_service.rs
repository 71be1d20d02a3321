//! Quest Validation Workflow - drives a submission from pending to
//! approved or rejected. The status flip and the point credit commit as
//! one unit; if crediting fails the submission stays pending.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::collections::HashMap;

use crate::models::account::{self, Entity as Account};
use crate::models::badge;
use crate::models::quest::{self, Entity as Quest, QuestDto};
use crate::models::quest_submission::{self, Entity as QuestSubmission};

use super::ledger_service::{self, CreditKind, RetryPolicy, with_retry};
use super::{Scope, ServiceError, badge_service};

/// Whether a student may submit again after a rejection. Deliberately a
/// policy knob rather than a hardcoded answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestPolicy {
    pub allow_resubmit_rejected: bool,
}

/// The full transition table for submissions. Everything not listed here
/// is an `InvalidTransition`; approved and rejected are terminal.
const SUBMISSION_TRANSITIONS: &[(&str, &str)] =
    &[("pending", "approved"), ("pending", "rejected")];

pub fn transition_allowed(from: &str, to: &str) -> bool {
    SUBMISSION_TRANSITIONS.contains(&(from, to))
}

/// Enriched submission with related data
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmissionWithDetails {
    pub id: i32,
    pub quest_id: i32,
    pub account_id: i32,
    pub status: String,
    pub comment: Option<String>,
    pub feedback: Option<String>,
    pub points_awarded: Option<i64>,
    pub submitted_at: String,
    pub decided_at: Option<String>,
    pub quest_title: String,
    pub account_username: String,
}

/// Filter parameters for listing submissions
#[derive(Debug, Default, Clone)]
pub struct SubmissionFilter {
    pub status: Option<String>,
    pub quest_id: Option<i32>,
    pub account_id: Option<i32>,
}

pub async fn create_quest(
    db: &DatabaseConnection,
    school_id: i32,
    dto: QuestDto,
) -> Result<quest::Model, ServiceError> {
    if dto.points_award <= 0 {
        return Err(ServiceError::Validation(
            "points_award must be positive".to_string(),
        ));
    }
    let validation_type = dto.validation_type.unwrap_or_else(|| "manual".to_string());
    if validation_type != "manual" && validation_type != "auto" {
        return Err(ServiceError::Validation(format!(
            "unknown validation_type '{}'",
            validation_type
        )));
    }

    let now = Utc::now().to_rfc3339();
    let new_quest = quest::ActiveModel {
        school_id: Set(school_id),
        title: Set(dto.title),
        description: Set(dto.description),
        points_award: Set(dto.points_award),
        validation_type: Set(validation_type),
        deadline: Set(dto.deadline),
        is_active: Set(dto.is_active.unwrap_or(true)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    Ok(new_quest.insert(db).await?)
}

pub async fn list_quests(
    db: &DatabaseConnection,
    school_id: i32,
    active_only: bool,
) -> Result<Vec<quest::Model>, ServiceError> {
    let mut query = Quest::find().filter(quest::Column::SchoolId.eq(school_id));
    if active_only {
        query = query.filter(quest::Column::IsActive.eq(true));
    }
    Ok(query.order_by_desc(quest::Column::CreatedAt).all(db).await?)
}

pub async fn get_quest(
    db: &DatabaseConnection,
    school_id: i32,
    quest_id: i32,
) -> Result<quest::Model, ServiceError> {
    Quest::find_by_id(quest_id)
        .filter(quest::Column::SchoolId.eq(school_id))
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// Submit a quest for the calling account. Quests with 'auto' validation
/// approve in the same call; the transition semantics are identical, only
/// the trigger differs.
pub async fn submit(
    db: &DatabaseConnection,
    scope: &Scope,
    quest_id: i32,
    comment: Option<String>,
    policy: &QuestPolicy,
    retry: &RetryPolicy,
) -> Result<quest_submission::Model, ServiceError> {
    let quest = get_quest(db, scope.school_id, quest_id).await?;

    if !quest.is_active {
        return Err(ServiceError::Validation("quest is not active".to_string()));
    }
    if let Some(deadline) = &quest.deadline {
        let parsed = chrono::DateTime::parse_from_rfc3339(deadline)
            .map_err(|e| ServiceError::Validation(format!("malformed quest deadline: {}", e)))?;
        if Utc::now() > parsed.with_timezone(&Utc) {
            return Err(ServiceError::Validation(
                "quest deadline has passed".to_string(),
            ));
        }
    }

    let previous = QuestSubmission::find()
        .filter(quest_submission::Column::QuestId.eq(quest_id))
        .filter(quest_submission::Column::AccountId.eq(scope.account_id))
        .all(db)
        .await?;

    let has_live = previous.iter().any(|s| s.status != "rejected");
    let has_rejected = previous.iter().any(|s| s.status == "rejected");
    if has_live || (has_rejected && !policy.allow_resubmit_rejected) {
        return Err(ServiceError::DuplicateSubmission);
    }

    let now = Utc::now().to_rfc3339();
    let new_submission = quest_submission::ActiveModel {
        school_id: Set(scope.school_id),
        quest_id: Set(quest_id),
        account_id: Set(scope.account_id),
        status: Set("pending".to_owned()),
        comment: Set(comment),
        submitted_at: Set(now.clone()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    // The partial unique index backs up the check above: a concurrent
    // duplicate lands here as a constraint violation.
    let saved = match new_submission.insert(db).await {
        Ok(model) => model,
        Err(e) if e.to_string().contains("UNIQUE") => {
            return Err(ServiceError::DuplicateSubmission);
        }
        Err(e) => return Err(e.into()),
    };

    if quest.validation_type == "auto" {
        let (approved, _badges) = approve(db, scope, saved.id, retry).await?;
        return Ok(approved);
    }

    Ok(saved)
}

/// Approve a pending submission: flip the status, snapshot the quest's
/// award onto the submission and credit the account, all in one
/// transaction. Badge evaluation runs after the commit; it is idempotent,
/// so a failure there is picked up by the next trigger instead of
/// unwinding an approval that already happened.
pub async fn approve(
    db: &DatabaseConnection,
    scope: &Scope,
    submission_id: i32,
    retry: &RetryPolicy,
) -> Result<(quest_submission::Model, Vec<badge::Model>), ServiceError> {
    let approved = with_retry(retry, || approve_once(db, scope, submission_id)).await?;

    let new_badges =
        match badge_service::evaluate(db, scope.school_id, approved.account_id, scope.account_id)
            .await
        {
            Ok(badges) => badges,
            Err(e) => {
                tracing::warn!(
                    "badge evaluation after approving submission {} failed: {:?}",
                    submission_id,
                    e
                );
                Vec::new()
            }
        };

    Ok((approved, new_badges))
}

async fn approve_once(
    db: &DatabaseConnection,
    scope: &Scope,
    submission_id: i32,
) -> Result<quest_submission::Model, ServiceError> {
    let txn = db.begin().await?;

    let submission = QuestSubmission::find_by_id(submission_id)
        .filter(quest_submission::Column::SchoolId.eq(scope.school_id))
        .one(&txn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if !transition_allowed(&submission.status, "approved") {
        return Err(ServiceError::InvalidTransition(format!(
            "submission is already {}",
            submission.status
        )));
    }

    let quest = Quest::find_by_id(submission.quest_id)
        .one(&txn)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let now = Utc::now().to_rfc3339();

    // pending -> approved, one way. The status filter makes a second
    // approval (or an approval racing a rejection) a no-op here.
    let res = QuestSubmission::update_many()
        .col_expr(quest_submission::Column::Status, Expr::value("approved"))
        .col_expr(
            quest_submission::Column::PointsAwarded,
            Expr::value(Some(quest.points_award)),
        )
        .col_expr(
            quest_submission::Column::DecidedAt,
            Expr::value(Some(now.clone())),
        )
        .col_expr(
            quest_submission::Column::DecidedBy,
            Expr::value(Some(scope.account_id)),
        )
        .col_expr(quest_submission::Column::UpdatedAt, Expr::value(now))
        .filter(quest_submission::Column::Id.eq(submission_id))
        .filter(quest_submission::Column::Status.eq("pending"))
        .exec(&txn)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::InvalidTransition(format!(
            "submission is already {}",
            submission.status
        )));
    }

    ledger_service::credit(
        &txn,
        scope.school_id,
        submission.account_id,
        quest.points_award,
        CreditKind::Earn,
        scope.account_id,
        &format!("quest '{}' approved", quest.title),
    )
    .await?;

    txn.commit().await?;

    QuestSubmission::find_by_id(submission_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// Reject a pending submission. No ledger effect.
pub async fn reject(
    db: &DatabaseConnection,
    scope: &Scope,
    submission_id: i32,
    feedback: Option<String>,
) -> Result<quest_submission::Model, ServiceError> {
    let submission = QuestSubmission::find_by_id(submission_id)
        .filter(quest_submission::Column::SchoolId.eq(scope.school_id))
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if !transition_allowed(&submission.status, "rejected") {
        return Err(ServiceError::InvalidTransition(format!(
            "submission is already {}",
            submission.status
        )));
    }

    let now = Utc::now().to_rfc3339();

    let res = QuestSubmission::update_many()
        .col_expr(quest_submission::Column::Status, Expr::value("rejected"))
        .col_expr(quest_submission::Column::Feedback, Expr::value(feedback))
        .col_expr(
            quest_submission::Column::DecidedAt,
            Expr::value(Some(now.clone())),
        )
        .col_expr(
            quest_submission::Column::DecidedBy,
            Expr::value(Some(scope.account_id)),
        )
        .col_expr(quest_submission::Column::UpdatedAt, Expr::value(now))
        .filter(quest_submission::Column::Id.eq(submission_id))
        .filter(quest_submission::Column::Status.eq("pending"))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(ServiceError::InvalidTransition(format!(
            "submission is already {}",
            submission.status
        )));
    }

    QuestSubmission::find_by_id(submission_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound)
}

/// List submissions with quest titles and account usernames joined in.
pub async fn list_submissions(
    db: &DatabaseConnection,
    school_id: i32,
    filter: SubmissionFilter,
) -> Result<Vec<SubmissionWithDetails>, ServiceError> {
    let mut condition =
        Condition::all().add(quest_submission::Column::SchoolId.eq(school_id));

    if let Some(status) = filter.status {
        condition = condition.add(quest_submission::Column::Status.eq(status));
    }
    if let Some(quest_id) = filter.quest_id {
        condition = condition.add(quest_submission::Column::QuestId.eq(quest_id));
    }
    if let Some(account_id) = filter.account_id {
        condition = condition.add(quest_submission::Column::AccountId.eq(account_id));
    }

    let submissions_with_quests = QuestSubmission::find()
        .filter(condition)
        .order_by_desc(quest_submission::Column::SubmittedAt)
        .find_also_related(Quest)
        .all(db)
        .await?;

    // Collect account IDs to fetch usernames
    let account_ids: Vec<i32> = submissions_with_quests
        .iter()
        .map(|(s, _)| s.account_id)
        .collect();

    let mut username_map: HashMap<i32, String> = HashMap::new();

    if !account_ids.is_empty() {
        let accounts = Account::find()
            .filter(account::Column::Id.is_in(account_ids))
            .all(db)
            .await?;
        for acc in accounts {
            username_map.insert(acc.id, acc.username);
        }
    }

    let result: Vec<SubmissionWithDetails> = submissions_with_quests
        .into_iter()
        .map(|(submission, quest)| {
            let quest_title = quest
                .map(|q| q.title)
                .unwrap_or_else(|| "Unknown".to_string());
            let account_username = username_map
                .get(&submission.account_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());

            SubmissionWithDetails {
                id: submission.id,
                quest_id: submission.quest_id,
                account_id: submission.account_id,
                status: submission.status,
                comment: submission.comment,
                feedback: submission.feedback,
                points_awarded: submission.points_awarded,
                submitted_at: submission.submitted_at,
                decided_at: submission.decided_at,
                quest_title,
                account_username,
            }
        })
        .collect();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::transition_allowed;

    #[test]
    fn pending_is_the_only_decidable_state() {
        assert!(transition_allowed("pending", "approved"));
        assert!(transition_allowed("pending", "rejected"));
    }

    #[test]
    fn decided_states_are_terminal() {
        for from in ["approved", "rejected"] {
            for to in ["pending", "approved", "rejected"] {
                assert!(!transition_allowed(from, to), "{} -> {}", from, to);
            }
        }
    }
}
