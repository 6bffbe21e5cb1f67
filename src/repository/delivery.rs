//! Delivery ledger backed by Diesel.
//!
//! Issue sends are tracked in `deliveries`, campaign sends in
//! `transactional_emails`. Status writes are batched upserts keyed by the
//! natural unique key of each table so a whole batch lands in one statement.
//! A row that reached a sent state is never rewritten by a later upsert.

use std::collections::HashSet;

use chrono::{NaiveDateTime, TimeDelta, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::domain::{DeliveryKey, DeliveryOutcome, DeliveryStatus, UserId};
use crate::models::{DeliveryRow, TransactionalEmailRow};
use crate::repository::{DeliveryLedger, DieselRepository, RepositoryResult};

const SENT_STATES: [&str; 2] = [
    DeliveryStatus::Sent.as_str(),
    DeliveryStatus::Delivered.as_str(),
];

/// How long a `pending` claim keeps other runs away from a user. Older
/// claims are left behind by interrupted runs and become eligible again.
pub const CLAIM_LEASE_MINUTES: i64 = 30;

fn claim_cutoff() -> NaiveDateTime {
    Utc::now().naive_utc() - TimeDelta::minutes(CLAIM_LEASE_MINUTES)
}

fn raw_ids(user_ids: &[UserId]) -> Vec<i32> {
    user_ids.iter().map(|id| id.get()).collect()
}

impl DeliveryLedger for DieselRepository {
    fn filter_unsent(
        &self,
        key: &DeliveryKey,
        user_ids: &[UserId],
    ) -> RepositoryResult<Vec<UserId>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let ids = raw_ids(user_ids);
        let cutoff = claim_cutoff();
        let pending = DeliveryStatus::Pending.as_str();

        let taken: Vec<i32> = match key {
            DeliveryKey::Issue(issue_id) => {
                use crate::schema::deliveries;
                deliveries::table
                    .filter(deliveries::issue_id.eq(issue_id.get()))
                    .filter(deliveries::user_id.eq_any(&ids))
                    .filter(
                        deliveries::status.eq_any(SENT_STATES).or(
                            deliveries::status
                                .eq(pending)
                                .and(deliveries::updated_at.gt(cutoff)),
                        ),
                    )
                    .select(deliveries::user_id)
                    .load(&mut conn)?
            }
            DeliveryKey::Campaign { email_type, .. } => {
                use crate::schema::transactional_emails;
                transactional_emails::table
                    .filter(transactional_emails::email_type.eq(email_type.as_str()))
                    .filter(transactional_emails::user_id.eq_any(&ids))
                    .filter(
                        transactional_emails::status.eq_any(SENT_STATES).or(
                            transactional_emails::status
                                .eq(pending)
                                .and(transactional_emails::updated_at.gt(cutoff)),
                        ),
                    )
                    .select(transactional_emails::user_id)
                    .load(&mut conn)?
            }
        };

        let taken: HashSet<i32> = taken.into_iter().collect();
        Ok(user_ids
            .iter()
            .copied()
            .filter(|id| !taken.contains(&id.get()))
            .collect())
    }

    fn mark_pending(&self, key: &DeliveryKey, user_ids: &[UserId]) -> RepositoryResult<()> {
        let outcomes: Vec<DeliveryOutcome> = user_ids
            .iter()
            .map(|&user_id| DeliveryOutcome {
                user_id,
                status: DeliveryStatus::Pending,
                provider_message_id: None,
                error: None,
            })
            .collect();
        self.record_outcomes(key, &outcomes)
    }

    fn record_outcomes(
        &self,
        key: &DeliveryKey,
        outcomes: &[DeliveryOutcome],
    ) -> RepositoryResult<()> {
        // `filter` on an upsert adds the `DO UPDATE .. WHERE` guard.
        use diesel::query_dsl::methods::FilterDsl;

        if outcomes.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let sent_at = |status: DeliveryStatus| (status == DeliveryStatus::Sent).then_some(now);

        match key {
            DeliveryKey::Issue(issue_id) => {
                use crate::schema::deliveries;
                let rows: Vec<DeliveryRow<'_>> = outcomes
                    .iter()
                    .map(|outcome| DeliveryRow {
                        issue_id: issue_id.get(),
                        user_id: outcome.user_id.get(),
                        status: outcome.status.as_str(),
                        provider_message_id: outcome.provider_message_id.as_deref(),
                        error: outcome.error.as_deref(),
                        created_at: now,
                        updated_at: now,
                        sent_at: sent_at(outcome.status),
                    })
                    .collect();

                diesel::insert_into(deliveries::table)
                    .values(&rows)
                    .on_conflict((deliveries::issue_id, deliveries::user_id))
                    .do_update()
                    .set((
                        deliveries::status.eq(excluded(deliveries::status)),
                        deliveries::provider_message_id
                            .eq(excluded(deliveries::provider_message_id)),
                        deliveries::error.eq(excluded(deliveries::error)),
                        deliveries::updated_at.eq(excluded(deliveries::updated_at)),
                        deliveries::sent_at.eq(excluded(deliveries::sent_at)),
                    ))
                    .filter(deliveries::status.ne_all(SENT_STATES))
                    .execute(&mut conn)?;
            }
            DeliveryKey::Campaign {
                campaign_id,
                email_type,
            } => {
                use crate::schema::transactional_emails;
                let rows: Vec<TransactionalEmailRow<'_>> = outcomes
                    .iter()
                    .map(|outcome| TransactionalEmailRow {
                        user_id: outcome.user_id.get(),
                        email_type: email_type.as_str(),
                        campaign_id: Some(campaign_id.get()),
                        status: outcome.status.as_str(),
                        provider_message_id: outcome.provider_message_id.as_deref(),
                        error: outcome.error.as_deref(),
                        created_at: now,
                        updated_at: now,
                        sent_at: sent_at(outcome.status),
                    })
                    .collect();

                diesel::insert_into(transactional_emails::table)
                    .values(&rows)
                    .on_conflict((
                        transactional_emails::user_id,
                        transactional_emails::email_type,
                    ))
                    .do_update()
                    .set((
                        transactional_emails::campaign_id
                            .eq(excluded(transactional_emails::campaign_id)),
                        transactional_emails::status.eq(excluded(transactional_emails::status)),
                        transactional_emails::provider_message_id
                            .eq(excluded(transactional_emails::provider_message_id)),
                        transactional_emails::error.eq(excluded(transactional_emails::error)),
                        transactional_emails::updated_at
                            .eq(excluded(transactional_emails::updated_at)),
                        transactional_emails::sent_at.eq(excluded(transactional_emails::sent_at)),
                    ))
                    .filter(transactional_emails::status.ne_all(SENT_STATES))
                    .execute(&mut conn)?;
            }
        }

        Ok(())
    }
}
