// SPDX-License-Identifier: MPL-2.0

//! Camera access authorization
//!
//! Sandboxed builds go through the XDG desktop Camera portal over D-Bus.
//! Unsandboxed builds check whether the V4L2 device nodes are accessible.

use futures::StreamExt;
use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedValue, Value};

const PORTAL_DEST: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const CAMERA_INTERFACE: &str = "org.freedesktop.portal.Camera";
const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";

/// Platform authorization state for the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Authorized,
    Denied,
}

/// Source of camera authorization
pub trait PermissionProvider: Send + Sync {
    /// Current status, without prompting
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Prompt the user if needed; blocks until answered
    fn request_access(&self) -> bool;
}

/// Portal-backed provider with a device-node fallback
#[derive(Debug, Default)]
pub struct PortalPermissionProvider {
    granted: Mutex<Option<bool>>,
}

impl PortalPermissionProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionProvider for PortalPermissionProvider {
    fn authorization_status(&self) -> AuthorizationStatus {
        if let Ok(guard) = self.granted.lock()
            && let Some(granted) = *guard
        {
            return if granted {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
        }

        if is_sandboxed() {
            return AuthorizationStatus::NotDetermined;
        }
        device_node_status()
    }

    fn request_access(&self) -> bool {
        let granted = if is_sandboxed() {
            match pollster::block_on(access_camera_via_portal()) {
                Ok(granted) => granted,
                Err(e) => {
                    warn!(error = %e, "Camera portal request failed, checking device nodes");
                    device_node_status() == AuthorizationStatus::Authorized
                }
            }
        } else {
            device_node_status() == AuthorizationStatus::Authorized
        };

        info!(granted, "Camera access request finished");
        if let Ok(mut guard) = self.granted.lock() {
            *guard = Some(granted);
        }
        granted
    }
}

/// Provider with a fixed answer, for virtual sessions and tests
#[derive(Debug)]
pub struct StaticPermissionProvider {
    status: Mutex<AuthorizationStatus>,
    grant: bool,
}

impl StaticPermissionProvider {
    pub fn new(status: AuthorizationStatus, grant: bool) -> Self {
        Self {
            status: Mutex::new(status),
            grant,
        }
    }

    pub fn authorized() -> Self {
        Self::new(AuthorizationStatus::Authorized, true)
    }
}

impl PermissionProvider for StaticPermissionProvider {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(AuthorizationStatus::NotDetermined)
    }

    fn request_access(&self) -> bool {
        if let Ok(mut status) = self.status.lock() {
            *status = if self.grant {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
        }
        self.grant
    }
}

fn is_sandboxed() -> bool {
    Path::new("/.flatpak-info").exists()
}

/// Authorized if any /dev/video* node can be opened read-write
fn device_node_status() -> AuthorizationStatus {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return AuthorizationStatus::NotDetermined;
    };

    let mut found_any = false;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with("video") {
            continue;
        }
        found_any = true;
        let Ok(path) = CString::new(entry.path().to_string_lossy().as_bytes()) else {
            continue;
        };
        let accessible = unsafe { libc::access(path.as_ptr(), libc::R_OK | libc::W_OK) } == 0;
        debug!(node = ?entry.path(), accessible, "Checked video device node");
        if accessible {
            return AuthorizationStatus::Authorized;
        }
    }

    if found_any {
        AuthorizationStatus::Denied
    } else {
        AuthorizationStatus::NotDetermined
    }
}

/// Ask the Camera portal for access and wait for the user's answer
async fn access_camera_via_portal() -> Result<bool, String> {
    let connection = zbus::Connection::session()
        .await
        .map_err(|e| format!("Failed to connect to session D-Bus: {}", e))?;

    let camera = zbus::Proxy::new(&connection, PORTAL_DEST, PORTAL_PATH, CAMERA_INTERFACE)
        .await
        .map_err(|e| format!("Failed to create camera portal proxy: {}", e))?;

    let present: bool = camera
        .get_property("IsCameraPresent")
        .await
        .map_err(|e| format!("Failed to query IsCameraPresent: {}", e))?;
    if !present {
        info!("Camera portal reports no camera present");
        return Ok(false);
    }

    // Subscribe to the response before issuing the call
    let token = format!("quadcam{}", uuid::Uuid::new_v4().simple());
    let sender = connection
        .unique_name()
        .map(|n| n.as_str().trim_start_matches(':').replace('.', "_"))
        .ok_or_else(|| "No unique bus name".to_string())?;
    let request_path = format!("{}/request/{}/{}", PORTAL_PATH, sender, token);

    let request = zbus::Proxy::new(&connection, PORTAL_DEST, request_path.as_str(), REQUEST_INTERFACE)
        .await
        .map_err(|e| format!("Failed to create request proxy: {}", e))?;
    let mut responses = request
        .receive_signal("Response")
        .await
        .map_err(|e| format!("Failed to subscribe to portal response: {}", e))?;

    let mut options: HashMap<&str, Value> = HashMap::new();
    options.insert("handle_token", Value::new(token.as_str()));
    let handle: zbus::zvariant::OwnedObjectPath = camera
        .call("AccessCamera", &(options,))
        .await
        .map_err(|e| format!("AccessCamera failed: {}", e))?;
    debug!(handle = %handle, "Camera portal request issued");

    let message = responses
        .next()
        .await
        .ok_or_else(|| "Portal closed without a response".to_string())?;
    let (response, _results): (u32, HashMap<String, OwnedValue>) = message
        .body()
        .deserialize()
        .map_err(|e| format!("Malformed portal response: {}", e))?;

    // 0 = success, 1 = cancelled by user, 2 = other
    Ok(response == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_grant() {
        let provider = StaticPermissionProvider::new(AuthorizationStatus::NotDetermined, true);
        assert_eq!(provider.authorization_status(), AuthorizationStatus::NotDetermined);
        assert!(provider.request_access());
        assert_eq!(provider.authorization_status(), AuthorizationStatus::Authorized);
    }

    #[test]
    fn test_static_provider_deny() {
        let provider = StaticPermissionProvider::new(AuthorizationStatus::NotDetermined, false);
        assert!(!provider.request_access());
        assert_eq!(provider.authorization_status(), AuthorizationStatus::Denied);
    }
}
