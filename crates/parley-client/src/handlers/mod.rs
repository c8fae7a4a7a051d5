//! Session handlers: one per open session, each owning one session record.
//!
//! Handlers write only their own session record. Everything else they want
//! done (stat changes, UI updates, closing the request) comes back as
//! [`Effect`]s for the client to carry out, so a handler never reaches
//! into player state directly.

pub mod chat;
pub mod combat;
pub mod trade;

use parley_logic::error::{InteractionError, InvalidAction, StoreError};
use parley_logic::session::{Lifecycle, RequestStatus};
use parley_logic::ship::StatDelta;

use crate::feed::StoredRecord;
use crate::store::{fetch, replace, SessionStore};
use crate::ui::UiEvent;

pub use chat::ChatHandler;
pub use combat::CombatHandler;
pub use trade::TradeHandler;

/// Follow-up work a handler hands back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Render(UiEvent),
    /// Apply to the local player's own stats, exactly once.
    ApplyDelta { delta: StatDelta, reason: String },
    /// The session is over; close its request with this status and tear down.
    Close(RequestStatus),
}

/// Write `edit(latest)`, rebasing the edit onto the newest record on a
/// version conflict, at most `max_rebases` times.
///
/// Only version conflicts are rebased. Any other store failure is returned
/// as-is and nothing is retried.
pub(crate) fn write_rebased<T, F>(
    store: &dyn SessionStore,
    current: &T,
    max_rebases: u32,
    mut edit: F,
) -> Result<T, InteractionError>
where
    T: StoredRecord + Lifecycle,
    F: FnMut(&T) -> Result<T, InvalidAction>,
{
    write_rebased_if(store, current, max_rebases, |latest| edit(latest).map(Some))
}

/// Like [`write_rebased`], but the edit may find nothing left to change on
/// the newest record. Then no write happens and that record is returned.
pub(crate) fn write_rebased_if<T, F>(
    store: &dyn SessionStore,
    current: &T,
    max_rebases: u32,
    mut edit: F,
) -> Result<T, InteractionError>
where
    T: StoredRecord + Lifecycle,
    F: FnMut(&T) -> Result<Option<T>, InvalidAction>,
{
    let mut latest = current.clone();
    let mut rebases = 0;
    loop {
        let next = match edit(&latest)? {
            Some(next) => next,
            None => return Ok(latest),
        };
        match replace(store, next, latest.version()) {
            Ok(written) => return Ok(written),
            Err(StoreError::VersionConflict { expected, found }) => {
                if rebases >= max_rebases {
                    log::warn!(
                        "{:?} {} still conflicting after {} rebases",
                        T::TABLE,
                        latest.record_id(),
                        rebases
                    );
                    return Err(StoreError::VersionConflict { expected, found }.into());
                }
                rebases += 1;
                log::debug!(
                    "{:?} {} moved to v{} underneath, rebasing",
                    T::TABLE,
                    latest.record_id(),
                    found
                );
                latest = fetch(store, latest.record_id())?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
