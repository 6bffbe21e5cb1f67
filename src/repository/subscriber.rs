//! Subscriber repository implementation backed by Diesel.
//!
//! Supplies [`SubscriberReader`] and [`SubscriptionWriter`] for
//! [`DieselRepository`].

use chrono::Utc;
use diesel::prelude::*;

use crate::domain::{Audience, SubjectId, Subscriber, UserId};
use crate::models::{NewSubscription, NewUser};
use crate::repository::{
    DieselRepository, RepositoryError, RepositoryResult, SubscriberReader, SubscriptionWriter,
};

impl SubscriberReader for DieselRepository {
    fn list_active_subscribers(
        &self,
        audience: Audience,
        page: i64,
        page_size: i64,
    ) -> RepositoryResult<Vec<Subscriber>> {
        use crate::schema::{subscriptions, users};
        let mut conn = self.conn()?;
        let offset = page.saturating_mul(page_size);

        match audience {
            Audience::Subject(subject_id) => {
                let rows = subscriptions::table
                    .inner_join(users::table)
                    .filter(subscriptions::subject_id.eq(subject_id.get()))
                    .filter(subscriptions::active.eq(true))
                    .order(subscriptions::id.asc())
                    .limit(page_size)
                    .offset(offset)
                    .select((users::id, users::email, users::name))
                    .load::<(i32, String, Option<String>)>(&mut conn)?;

                Ok(rows
                    .into_iter()
                    .map(|(id, email, name)| Subscriber {
                        user_id: UserId::new(id),
                        subject_id: Some(subject_id),
                        email,
                        name,
                    })
                    .collect())
            }
            Audience::AllActive => {
                let active_users = subscriptions::table
                    .filter(subscriptions::active.eq(true))
                    .select(subscriptions::user_id);

                let rows = users::table
                    .filter(users::id.eq_any(active_users))
                    .order(users::id.asc())
                    .limit(page_size)
                    .offset(offset)
                    .select((users::id, users::email, users::name))
                    .load::<(i32, String, Option<String>)>(&mut conn)?;

                Ok(rows
                    .into_iter()
                    .map(|(id, email, name)| Subscriber {
                        user_id: UserId::new(id),
                        subject_id: None,
                        email,
                        name,
                    })
                    .collect())
            }
        }
    }
}

impl SubscriptionWriter for DieselRepository {
    fn subscribe(
        &self,
        email: &str,
        name: Option<&str>,
        subject_id: SubjectId,
    ) -> RepositoryResult<UserId> {
        use crate::schema::{subjects, subscriptions, users};
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        conn.transaction::<_, RepositoryError, _>(|conn| {
            let subject_exists = subjects::table
                .filter(subjects::id.eq(subject_id.get()))
                .select(subjects::id)
                .first::<i32>(conn)
                .optional()?
                .is_some();
            if !subject_exists {
                return Err(RepositoryError::NotFound(format!("subject#{subject_id}")));
            }

            let existing = users::table
                .filter(users::email.eq(email))
                .select(users::id)
                .first::<i32>(conn)
                .optional()?;

            let user_id = match existing {
                Some(id) => id,
                None => diesel::insert_into(users::table)
                    .values(NewUser {
                        email,
                        name,
                        created_at: now,
                    })
                    .returning(users::id)
                    .get_result::<i32>(conn)?,
            };

            diesel::insert_into(subscriptions::table)
                .values(NewSubscription {
                    user_id,
                    subject_id: subject_id.get(),
                    active: true,
                    created_at: now,
                    updated_at: now,
                })
                .on_conflict((subscriptions::user_id, subscriptions::subject_id))
                .do_update()
                .set((
                    subscriptions::active.eq(true),
                    subscriptions::updated_at.eq(now),
                ))
                .execute(conn)?;

            Ok(UserId::new(user_id))
        })
    }

    fn deactivate_subscriptions(
        &self,
        user_id: UserId,
        subject_id: Option<SubjectId>,
    ) -> RepositoryResult<usize> {
        use crate::schema::subscriptions;
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        let updated = match subject_id {
            Some(subject_id) => diesel::update(
                subscriptions::table
                    .filter(subscriptions::user_id.eq(user_id.get()))
                    .filter(subscriptions::subject_id.eq(subject_id.get()))
                    .filter(subscriptions::active.eq(true)),
            )
            .set((
                subscriptions::active.eq(false),
                subscriptions::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
            None => diesel::update(
                subscriptions::table
                    .filter(subscriptions::user_id.eq(user_id.get()))
                    .filter(subscriptions::active.eq(true)),
            )
            .set((
                subscriptions::active.eq(false),
                subscriptions::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
        };

        Ok(updated)
    }
}
