use crate::schema::*;
use chrono::NaiveDateTime;
use crossbuild_common::api::{BuildEvent, Status};
use crossbuild_common::errors::*;
use diesel::prelude::*;

#[derive(Identifiable, Queryable, Selectable, AsChangeset, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: i32,
    pub git_ref: String,
    pub status: String,
    pub diagnostic: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Event {
    pub fn get_id(my_id: i32, connection: &mut SqliteConnection) -> Result<Option<Event>> {
        let event = events::table
            .filter(events::id.eq(my_id))
            .select(Event::as_select())
            .first::<Event>(connection)
            .optional()?;
        Ok(event)
    }

    /// Newest first.
    pub fn list(limit: Option<i64>, connection: &mut SqliteConnection) -> Result<Vec<Event>> {
        let mut query = events::table
            .select(Event::as_select())
            .order_by(events::id.desc())
            .into_boxed();
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let events = query.load::<Event>(connection)?;
        Ok(events)
    }

    pub fn update_status(
        my_id: i32,
        status: Status,
        diagnostic: Option<&str>,
        updated_at: NaiveDateTime,
        connection: &mut SqliteConnection,
    ) -> Result<()> {
        let n = diesel::update(events::table.filter(events::id.eq(my_id)))
            .set((
                events::status.eq(status.as_ref()),
                events::diagnostic.eq(diagnostic),
                events::updated_at.eq(updated_at),
            ))
            .execute(connection)?;
        if n == 0 {
            bail!("Build event #{} does not exist", my_id);
        }
        Ok(())
    }

    pub fn into_api_item(self) -> Result<BuildEvent> {
        let status = self
            .status
            .parse::<Status>()
            .with_context(|| anyhow!("Unknown status in database: {:?}", self.status))?;
        Ok(BuildEvent {
            id: self.id,
            git_ref: self.git_ref,
            status,
            diagnostic: self.diagnostic,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub git_ref: String,
    pub status: String,
    pub diagnostic: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewEvent {
    pub fn pending(git_ref: &str, now: NaiveDateTime) -> NewEvent {
        NewEvent {
            git_ref: git_ref.to_string(),
            status: Status::Pending.to_string(),
            diagnostic: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<Event> {
        let event = diesel::insert_into(events::table)
            .values(self)
            .returning(Event::as_returning())
            .get_result::<Event>(connection)
            .context("Failed to insert build event to db")?;
        Ok(event)
    }
}
