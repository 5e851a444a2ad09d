use crate::db::Pool;
use crate::models::{Event, NewEvent};
use chrono::{NaiveDateTime, Utc};
use crossbuild_common::api::{BuildEvent, Status};
use crossbuild_common::errors::*;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Number of status writes `MemoryLedger` remembers.
pub const WRITE_JOURNAL_SIZE: usize = 1024;

/// Storage for the lifecycle of build events. Writes are point updates and
/// nothing about status transitions is enforced here, `BuildEvent` owns that.
pub trait EventLedger: Send + Sync {
    fn insert(&self, git_ref: &str) -> Result<BuildEvent>;

    fn update_status(
        &self,
        id: i32,
        status: Status,
        diagnostic: Option<&str>,
        updated_at: NaiveDateTime,
    ) -> Result<()>;

    fn get(&self, id: i32) -> Result<Option<BuildEvent>>;

    /// Newest first.
    fn list(&self, limit: Option<i64>) -> Result<Vec<BuildEvent>>;
}

/// Persist the current state of an in-memory event. Failures are logged and
/// swallowed, the build outcome stays what it is.
pub fn record(ledger: &dyn EventLedger, event: &BuildEvent) {
    let res = ledger.update_status(
        event.id,
        event.status,
        event.diagnostic.as_deref(),
        event.updated_at,
    );
    if let Err(err) = res {
        let err = BuildError::Persistence(format!("{:#}", err));
        error!("Failed to record {} for build event #{}: {}", event.status, event.id, err);
    }
}

pub struct SqliteLedger {
    pool: Pool,
}

impl SqliteLedger {
    pub fn new(pool: Pool) -> SqliteLedger {
        SqliteLedger { pool }
    }
}

impl EventLedger for SqliteLedger {
    fn insert(&self, git_ref: &str) -> Result<BuildEvent> {
        let mut connection = self.pool.get()?;
        let event = NewEvent::pending(git_ref, Utc::now().naive_utc()).insert(&mut connection)?;
        event.into_api_item()
    }

    fn update_status(
        &self,
        id: i32,
        status: Status,
        diagnostic: Option<&str>,
        updated_at: NaiveDateTime,
    ) -> Result<()> {
        let mut connection = self.pool.get()?;
        Event::update_status(id, status, diagnostic, updated_at, &mut connection)
    }

    fn get(&self, id: i32) -> Result<Option<BuildEvent>> {
        let mut connection = self.pool.get()?;
        Event::get_id(id, &mut connection)?
            .map(Event::into_api_item)
            .transpose()
    }

    fn list(&self, limit: Option<i64>) -> Result<Vec<BuildEvent>> {
        let mut connection = self.pool.get()?;
        Event::list(limit, &mut connection)?
            .into_iter()
            .map(Event::into_api_item)
            .collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    events: Vec<BuildEvent>,
    writes: VecDeque<(i32, Status)>,
    fail_writes: bool,
}

/// Keeps events in process memory, nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> MemoryLedger {
        MemoryLedger::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Ledger lock is poisoned"))
    }

    /// The most recent status updates in the order they were written.
    pub fn writes(&self) -> Vec<(i32, Status)> {
        self.lock()
            .map(|s| s.writes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Make writes fail, like a database that went away.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_writes = fail;
        }
    }
}

impl EventLedger for MemoryLedger {
    fn insert(&self, git_ref: &str) -> Result<BuildEvent> {
        let mut state = self.lock()?;
        if state.fail_writes {
            bail!("database is locked");
        }
        let id = state.events.len() as i32 + 1;
        let event = BuildEvent::new(id, git_ref.to_string());
        state.events.push(event.clone());
        Ok(event)
    }

    fn update_status(
        &self,
        id: i32,
        status: Status,
        diagnostic: Option<&str>,
        updated_at: NaiveDateTime,
    ) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_writes {
            bail!("database is locked");
        }
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| format_err!("Build event #{} does not exist", id))?;
        event.status = status;
        event.diagnostic = diagnostic.map(String::from);
        event.updated_at = updated_at;
        if state.writes.len() == WRITE_JOURNAL_SIZE {
            state.writes.pop_front();
        }
        state.writes.push_back((id, status));
        Ok(())
    }

    fn get(&self, id: i32) -> Result<Option<BuildEvent>> {
        let state = self.lock()?;
        Ok(state.events.iter().find(|e| e.id == id).cloned())
    }

    fn list(&self, limit: Option<i64>) -> Result<Vec<BuildEvent>> {
        let state = self.lock()?;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state.events.iter().rev().take(limit).cloned().collect())
    }
}
