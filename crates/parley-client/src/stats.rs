//! The local player's own stat write path.
//!
//! Handlers and ambient events only produce [`StatDelta`]s. This is the one
//! place a delta becomes a write, and it only ever writes the local ship.

use parley_logic::error::StoreError;
use parley_logic::ship::{Ship, StatDelta, StatPatch};

use crate::store::SessionStore;

/// Apply `delta` to `ship` and persist the changed fields.
///
/// Local state is updated only after the store accepts the patch.
pub fn apply_delta(store: &dyn SessionStore, ship: &mut Ship, delta: &StatDelta) -> Result<bool, StoreError> {
    let after = ship.stats.apply(delta);
    let patch = StatPatch::between(&ship.stats, &after);
    if patch.is_empty() {
        return Ok(false);
    }
    let stored = store.update_stats(ship.id, &patch)?;
    log::debug!("ship {} stats now v{}: {:?}", ship.id, stored.version, patch);
    ship.stats = stored.stats;
    ship.version = stored.version;
    Ok(true)
}
