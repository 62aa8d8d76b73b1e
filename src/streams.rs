//! Read-then-subscribe streams over profile data
//!
//! Each call returns an independent, lazy stream. Nothing happens until it is
//! first polled; then it subscribes to the store, emits the current value and
//! follows the store's change batches from there.
//!
//! A store error is yielded once and ends the stream. A consumer that falls
//! behind the change channel is resynced by re-reading the current value, so it
//! may skip intermediate values but never ends up stale.

use crate::error::Result;
use crate::events::{classify, next_batch, ActiveProfileWatch, ProfileEvent};
use crate::profiles::manager::decode_id_list;
use crate::profiles::{Profile, ProfileId, ProfileManager, PROFILE_ID_LIST_KEY};
use crate::store::KeyValueStore;

use async_stream::stream;
use futures::stream::BoxStream;
use log::{debug, warn};
use tokio::sync::broadcast::error::RecvError;

/// Boxed stream of profile values
pub type ProfileStream<T> = BoxStream<'static, Result<T>>;

impl<S: KeyValueStore> ProfileManager<S> {
    /// Stream the profile list: the current list, then every new list
    pub fn profile_id_list_stream(&self) -> ProfileStream<Vec<ProfileId>> {
        let manager = self.clone();

        Box::pin(stream! {
            let mut receiver = manager.store().subscribe();

            match manager.get_profile_id_list().await {
                Ok(list) => yield Ok(list),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            loop {
                let list = match receiver.recv().await {
                    Ok(changes) => match changes.get(PROFILE_ID_LIST_KEY) {
                        Some(change) => decode_id_list(change.new_value.as_ref()),
                        None => continue,
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!("Profile list stream lagged by {n} batches, resyncing");
                        manager.get_profile_id_list().await
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change channel closed, ending profile list stream");
                        return;
                    }
                };

                match list {
                    Ok(list) => yield Ok(list),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }

    /// Stream the active profile: the current one, then the profile in effect
    /// after every switch or edit of the active record
    ///
    /// Switching and editing are not distinguished; each emits the new profile,
    /// once per underlying change.
    pub fn active_profile_stream(&self) -> ProfileStream<Profile> {
        let manager = self.clone();

        Box::pin(stream! {
            let mut receiver = manager.store().subscribe();

            let mut watch = match ActiveProfileWatch::start(manager).await {
                Ok((watch, profile)) => {
                    yield Ok(profile);
                    watch
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            loop {
                let profile = match receiver.recv().await {
                    Ok(changes) => match watch.apply(&changes).await {
                        Ok(Some(change)) => Ok(change.new_profile),
                        Ok(None) => continue,
                        Err(e) => Err(e),
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!("Active profile stream lagged by {n} batches, resyncing");
                        watch.resync().await
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change channel closed, ending active profile stream");
                        return;
                    }
                };

                match profile {
                    Ok(profile) => yield Ok(profile),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }

    /// Stream profile-level events classified from every change batch
    ///
    /// There is no initial value. Batches missed by a lagging consumer are
    /// skipped with a warning.
    pub fn profile_events(&self) -> BoxStream<'static, ProfileEvent> {
        let mut receiver = self.store().subscribe();

        Box::pin(stream! {
            while let Some(changes) = next_batch(&mut receiver, "profile event").await {
                for event in classify(&changes) {
                    yield event;
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
