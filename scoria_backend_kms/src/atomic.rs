// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-use atomic request builder.
//!
//! An [`AtomicRequest`] accumulates property writes addressed by name and
//! commits them as one kernel atomic operation. Name resolution goes
//! through the session's cached tables; a name the object does not carry
//! fails the write immediately instead of being dropped.

use crate::device::{CommitFlags, KmsDevice, ObjectKind, PlaneId, PropertyUpdate};
use crate::error::KmsError;
use crate::resources::DisplaySession;

/// A set of property writes applied in one atomic commit.
///
/// Consumed by [`commit`](Self::commit); a rejected commit leaves no
/// partial state in the kernel, and the builder is gone either way.
#[derive(Debug)]
pub struct AtomicRequest<'a, D: KmsDevice> {
    session: &'a DisplaySession<D>,
    updates: Vec<PropertyUpdate>,
    flags: CommitFlags,
    includes_modeset: bool,
}

impl<'a, D: KmsDevice> AtomicRequest<'a, D> {
    /// Starts an empty request against `session`.
    #[must_use]
    pub fn new(session: &'a DisplaySession<D>) -> Self {
        Self {
            session,
            updates: Vec::new(),
            flags: CommitFlags::empty(),
            includes_modeset: false,
        }
    }

    fn put(
        &mut self,
        object: u32,
        kind: ObjectKind,
        name: &str,
        value: u64,
    ) -> Result<(), KmsError> {
        let property = self.session.property(object, name)?;
        self.updates.push(PropertyUpdate {
            object,
            kind,
            property,
            value,
        });
        Ok(())
    }

    /// Queues a write to a property of the configured connector.
    pub fn put_connector_property(&mut self, name: &str, value: u64) -> Result<(), KmsError> {
        let config = self.config()?;
        self.put(config.0, ObjectKind::Connector, name, value)
    }

    /// Queues a write to a property of the configured CRTC.
    pub fn put_crtc_property(&mut self, name: &str, value: u64) -> Result<(), KmsError> {
        let config = self.config()?;
        self.put(config.1, ObjectKind::Crtc, name, value)
    }

    /// Queues a write to a property of `plane`.
    pub fn put_plane_property(
        &mut self,
        plane: PlaneId,
        name: &str,
        value: u64,
    ) -> Result<(), KmsError> {
        self.put(plane.0, ObjectKind::Plane, name, value)
    }

    /// Queues the full mode-set writes (connector → CRTC link, mode blob,
    /// CRTC activation) when the session still owes the kernel one, and
    /// arms [`CommitFlags::ALLOW_MODESET`] for this commit.
    ///
    /// A no-op when no mode-set is pending, so the presentation path can
    /// call it unconditionally before every flip.
    pub fn put_modeset_properties(&mut self) -> Result<(), KmsError> {
        if !self.session.modeset_needed() {
            return Ok(());
        }
        let config = self
            .session
            .config()
            .ok_or_else(|| KmsError::Configuration("commit without configuration".to_owned()))?;
        let crtc = config.crtc;
        let blob = config.mode_blob;
        self.put_connector_property("CRTC_ID", u64::from(crtc.0))?;
        self.put_crtc_property("MODE_ID", blob.0)?;
        self.put_crtc_property("ACTIVE", 1)?;
        self.flags |= CommitFlags::ALLOW_MODESET;
        self.includes_modeset = true;
        Ok(())
    }

    fn config(&self) -> Result<(u32, u32), KmsError> {
        self.session
            .config()
            .map(|c| (c.connector.0, c.crtc.0))
            .ok_or_else(|| KmsError::Configuration("commit without configuration".to_owned()))
    }

    /// Number of writes queued so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// No writes queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Commits every queued write in one atomic operation.
    ///
    /// `flags` is merged with anything armed while building (a pending
    /// mode-set arms [`CommitFlags::ALLOW_MODESET`] itself). On success a
    /// mode-set carried by this request marks the session's owed
    /// mode-set as delivered.
    pub fn commit(self, flags: CommitFlags) -> Result<(), KmsError> {
        let merged = self.flags | flags;
        let guard = self
            .session
            .commit_lock()
            .lock()
            .map_err(|_| KmsError::Configuration("commit lock poisoned".to_owned()))?;
        let result = self.session.device().atomic_commit(merged, &self.updates);
        drop(guard);
        if result.is_ok() && self.includes_modeset {
            self.session.clear_modeset_needed();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDevice;

    fn configured_session() -> DisplaySession<FakeDevice> {
        let mut session = DisplaySession::open(FakeDevice::new()).unwrap();
        session.configure_preferred().unwrap();
        session
    }

    #[test]
    fn first_commit_carries_the_modeset_then_plane_only() {
        let session = configured_session();

        let mut request = AtomicRequest::new(&session);
        request.put_modeset_properties().unwrap();
        assert_eq!(request.len(), 3);
        request.commit(CommitFlags::empty()).unwrap();

        assert!(!session.modeset_needed());
        let commits = session.device().commits();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].flags.contains(CommitFlags::ALLOW_MODESET));

        // The owed mode-set was delivered; the next request adds nothing.
        let mut request = AtomicRequest::new(&session);
        request.put_modeset_properties().unwrap();
        assert!(request.is_empty());
        request.commit(CommitFlags::empty()).unwrap();
        let commits = session.device().commits();
        assert!(!commits[1].flags.contains(CommitFlags::ALLOW_MODESET));
    }

    #[test]
    fn rejected_commit_keeps_the_modeset_owed() {
        let session = configured_session();
        session.device().reject_next_commit();

        let mut request = AtomicRequest::new(&session);
        request.put_modeset_properties().unwrap();
        let err = request.commit(CommitFlags::empty()).unwrap_err();
        assert!(matches!(err, KmsError::CommitRejected(_)));
        assert!(session.modeset_needed());
    }

    #[test]
    fn writes_resolve_names_against_the_cached_tables() {
        let session = configured_session();
        let config = session.config().unwrap().clone();

        let mut request = AtomicRequest::new(&session);
        request
            .put_plane_property(config.primary_plane, "FB_ID", 77)
            .unwrap();
        request.commit(CommitFlags::NONBLOCK).unwrap();

        let commits = session.device().commits();
        let update = commits[0].updates[0];
        assert_eq!(update.object, config.primary_plane.0);
        assert_eq!(update.value, 77);
        assert_eq!(
            update.property,
            session.property(config.primary_plane.0, "FB_ID").unwrap()
        );
    }

    #[test]
    fn unknown_name_fails_the_write_before_commit() {
        let session = configured_session();
        let plane = session.config().unwrap().primary_plane;

        let mut request = AtomicRequest::new(&session);
        let err = request
            .put_plane_property(plane, "ROTATION_XYZ", 0)
            .unwrap_err();
        assert!(matches!(err, KmsError::UnknownProperty { .. }));
        assert!(request.is_empty());
    }
}
