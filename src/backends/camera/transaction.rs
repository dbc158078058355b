// SPDX-License-Identifier: MPL-2.0

//! Scoped configuration transaction

use super::CaptureSession;
use std::ops::{Deref, DerefMut};
use tracing::trace;

/// Holds a session between `begin_configuration` and `commit_configuration`
///
/// The commit runs when the guard drops, on every exit path including early
/// returns and `?`.
pub struct ConfigurationTransaction<'a> {
    session: &'a mut dyn CaptureSession,
}

impl<'a> ConfigurationTransaction<'a> {
    pub fn begin(session: &'a mut dyn CaptureSession) -> Self {
        trace!("Begin session configuration");
        session.begin_configuration();
        Self { session }
    }
}

impl<'a> Deref for ConfigurationTransaction<'a> {
    type Target = dyn CaptureSession + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl<'a> DerefMut for ConfigurationTransaction<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for ConfigurationTransaction<'_> {
    fn drop(&mut self) {
        self.session.commit_configuration();
        trace!("Committed session configuration");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::SessionPreset;
    use crate::backends::virtual_camera::VirtualCaptureSession;

    #[test]
    fn test_commit_on_drop() {
        let (mut session, _handle) = VirtualCaptureSession::with_default_devices();
        {
            let mut tx = ConfigurationTransaction::begin(&mut session);
            assert!(tx.is_configuring());
            tx.set_preset(SessionPreset::Video).unwrap();
        }
        assert!(!session.is_configuring());
        assert_eq!(session.preset(), SessionPreset::Video);
    }

    #[test]
    fn test_commit_on_early_return() {
        fn failing(session: &mut dyn CaptureSession) -> Result<(), &'static str> {
            let _tx = ConfigurationTransaction::begin(session);
            Err("bail")
        }

        let (mut session, _handle) = VirtualCaptureSession::with_default_devices();
        assert!(failing(&mut session).is_err());
        assert!(!session.is_configuring());
    }
}
