// SPDX-License-Identifier: MPL-2.0

//! Photo capture service
//!
//! ```text
//! capture() → backend → WillCapture → Processed → [LivePhotoMovieFinished] → Finished
//!                              │                                               │
//!                      PhotoCaptured (preview)                   import on worker → PhotoSaved
//! ```
//!
//! Backend callbacks are routed back through the session queue into
//! [`PhotoCaptureService::handle_capture_event`].

pub mod encoding;

pub use encoding::{decode_preview, encode_jpeg};

use crate::backends::camera::{
    CaptureSession, FlashMode, OutputKind, PhotoCaptureEvent, PhotoCodec, PhotoOutputOptions,
    PhotoSettings,
};
use crate::constants::files;
use crate::errors::PhotoError;
use crate::session::events::{CameraEvent, EventSink};
use crate::storage::{MediaLibrary, remove_temp_file};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Bookkeeping for one request between `capture` and `Finished`
#[derive(Debug)]
struct PendingCapture {
    settings: PhotoSettings,
    data: Option<Vec<u8>>,
    movie: Option<PathBuf>,
}

pub struct PhotoCaptureService {
    library: Arc<dyn MediaLibrary>,
    temp_dir: PathBuf,
    next_id: u64,
    in_flight: HashMap<u64, PendingCapture>,
    events: EventSink,
}

impl PhotoCaptureService {
    pub fn new(library: Arc<dyn MediaLibrary>, temp_dir: PathBuf, events: EventSink) -> Self {
        Self {
            library,
            temp_dir,
            next_id: 1,
            in_flight: HashMap::new(),
            events,
        }
    }

    /// Attach the photo output when the session accepts it
    pub fn add_output(&mut self, session: &mut dyn CaptureSession) {
        if !session.has_output(OutputKind::Photo) {
            if !session.can_add_output(OutputKind::Photo) {
                debug!("Photo output can't be added, skipping");
                return;
            }
            if let Err(e) = session.add_output(OutputKind::Photo) {
                warn!(error = %e, "Failed to add photo output");
                return;
            }
        }
        self.configure_output(session);
    }

    /// Enable depth delivery and live photos wherever supported
    pub fn configure_output(&mut self, session: &mut dyn CaptureSession) {
        let caps = session.photo_capabilities();
        let options = PhotoOutputOptions {
            depth_delivery_enabled: caps.depth_delivery_supported,
            live_photo_enabled: caps.live_photo_supported,
        };
        debug!(?options, "Photo output configured");
        session.set_photo_output_options(options);
    }

    pub fn remove_output(&mut self, session: &mut dyn CaptureSession) {
        session.remove_output(OutputKind::Photo);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Issue a capture request and return its id
    pub fn capture(
        &mut self,
        session: &mut dyn CaptureSession,
        flash_mode: FlashMode,
        live_photo: bool,
        depth: bool,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let caps = session.photo_capabilities();
        let options = session.photo_output_options();
        let codec = if caps.available_codecs.contains(&PhotoCodec::Hevc) {
            PhotoCodec::Hevc
        } else {
            PhotoCodec::Jpeg
        };
        let live_photo_movie_path = (live_photo && options.live_photo_enabled).then(|| {
            self.temp_dir
                .join(format!("{}.{}", uuid::Uuid::new_v4(), files::LIVE_PHOTO_EXTENSION))
        });
        let settings = PhotoSettings {
            unique_id: id,
            codec,
            flash_mode,
            live_photo_movie_path,
            depth_delivery_enabled: depth && options.depth_delivery_enabled,
        };

        if !self.in_flight.is_empty() {
            warn!(
                id,
                in_flight = self.in_flight.len(),
                "Photo requested while another capture is in flight"
            );
        }
        info!(
            id,
            ?codec,
            ?flash_mode,
            live = settings.live_photo_movie_path.is_some(),
            depth = settings.depth_delivery_enabled,
            "Capturing photo"
        );

        self.in_flight.insert(
            id,
            PendingCapture {
                settings: settings.clone(),
                data: None,
                movie: None,
            },
        );
        if let Err(e) = session.capture_photo(&settings) {
            error!(id, error = %e, "Backend rejected photo request");
            if let Some(pending) = self.in_flight.remove(&id) {
                cleanup_movie(&pending.settings);
            }
            self.events.emit(CameraEvent::PhotoCaptured {
                id,
                error: Some(PhotoError::CaptureFailed(e.to_string())),
                preview: None,
                data: None,
            });
        }
        id
    }

    pub fn handle_capture_event(&mut self, event: PhotoCaptureEvent) {
        let id = event.id();
        let Some(pending) = self.in_flight.get_mut(&id) else {
            warn!(id, "Capture event for unknown request");
            return;
        };

        match event {
            PhotoCaptureEvent::WillCapture { .. } => {
                self.events.emit(CameraEvent::PhotoWillCapture { id });
            }
            PhotoCaptureEvent::Processed { result, .. } => match result {
                Ok(data) => {
                    let preview = match pending.settings.codec {
                        PhotoCodec::Jpeg => match decode_preview(&data) {
                            Ok(img) => Some(Arc::new(img)),
                            Err(e) => {
                                warn!(id, error = %e, "No preview for captured photo");
                                None
                            }
                        },
                        PhotoCodec::Hevc => None,
                    };
                    let shared: Arc<[u8]> = Arc::from(data.as_slice());
                    pending.data = Some(data);
                    debug!(id, size = shared.len(), "Photo processed");
                    self.events.emit(CameraEvent::PhotoCaptured {
                        id,
                        error: None,
                        preview,
                        data: Some(shared),
                    });
                }
                Err(e) => {
                    error!(id, error = %e, "Photo processing failed");
                    self.events.emit(CameraEvent::PhotoCaptured {
                        id,
                        error: Some(PhotoError::CaptureFailed(e.to_string())),
                        preview: None,
                        data: None,
                    });
                }
            },
            PhotoCaptureEvent::LivePhotoMovieFinished { path, .. } => {
                debug!(id, path = %path.display(), "Live photo movie written");
                pending.movie = Some(path);
            }
            PhotoCaptureEvent::Finished { error, .. } => {
                if let Some(pending) = self.in_flight.remove(&id) {
                    self.finish(id, pending, error.map(|e| e.to_string()));
                }
            }
        }
    }

    fn finish(&self, id: u64, pending: PendingCapture, error: Option<String>) {
        let data = match (error, pending.data) {
            (None, Some(data)) => data,
            (error, _) => {
                let error = match error {
                    Some(msg) => PhotoError::CaptureFailed(msg),
                    None => PhotoError::NoFrameAvailable,
                };
                warn!(id, %error, "Photo not saved");
                cleanup_movie(&pending.settings);
                self.events.emit(CameraEvent::PhotoSaved {
                    id,
                    result: Err(error),
                });
                return;
            }
        };

        let library = Arc::clone(&self.library);
        let events = self.events.clone();
        let settings = pending.settings;
        let movie = pending.movie;
        let spawned = std::thread::Builder::new()
            .name("photo-import".to_string())
            .spawn(move || {
                let result =
                    library.import_photo(&data, settings.codec.extension(), movie.as_deref());
                cleanup_movie(&settings);
                match &result {
                    Ok(path) => info!(id, path = %path.display(), "Photo saved"),
                    Err(e) => error!(id, error = %e, "Failed to save photo"),
                }
                events.emit(CameraEvent::PhotoSaved { id, result });
            });
        if let Err(e) = spawned {
            error!(id, error = %e, "Failed to spawn photo import thread");
            self.events.emit(CameraEvent::PhotoSaved {
                id,
                result: Err(PhotoError::SaveFailed(e.to_string())),
            });
        }
    }
}

fn cleanup_movie(settings: &PhotoSettings) {
    if let Some(path) = &settings.live_photo_movie_path {
        remove_temp_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{BackendError, ConfigurationTransaction, PhotoCapabilities};
    use crate::backends::virtual_camera::VirtualCaptureSession;
    use crate::session::events::event_channel;
    use crate::storage::DirectoryMediaLibrary;
    use std::sync::Mutex;

    struct Fixture {
        service: PhotoCaptureService,
        session: VirtualCaptureSession,
        handle: crate::backends::virtual_camera::VirtualCameraHandle,
        captured: Arc<Mutex<Vec<PhotoCaptureEvent>>>,
        events: tokio::sync::mpsc::UnboundedReceiver<CameraEvent>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(DirectoryMediaLibrary::new(
            dir.path().join("photos"),
            dir.path().join("videos"),
        ));
        let (sink, events) = event_channel();
        let service = PhotoCaptureService::new(library, dir.path().to_path_buf(), sink);
        let (mut session, handle) = VirtualCaptureSession::with_default_devices();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&captured);
        session.set_photo_sink(Arc::new(move |event| store.lock().unwrap().push(event)));
        Fixture {
            service,
            session,
            handle,
            captured,
            events,
            dir,
        }
    }

    impl Fixture {
        fn deliver(&mut self) {
            let drained: Vec<_> = self.captured.lock().unwrap().drain(..).collect();
            for event in drained {
                self.service.handle_capture_event(event);
            }
        }

        fn saved(&mut self) -> Result<PathBuf, PhotoError> {
            loop {
                match self.events.blocking_recv() {
                    Some(CameraEvent::PhotoSaved { result, .. }) => return result,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        }
    }

    #[test]
    fn test_configure_output_follows_capabilities() {
        let mut f = fixture();
        f.handle.set_photo_capabilities(PhotoCapabilities {
            depth_delivery_supported: true,
            live_photo_supported: false,
            available_codecs: vec![PhotoCodec::Jpeg],
        });
        f.service.add_output(&mut f.session);
        assert!(f.session.has_output(OutputKind::Photo));
        let options = f.session.photo_output_options();
        assert!(options.depth_delivery_enabled);
        assert!(!options.live_photo_enabled);
    }

    #[test]
    fn test_add_output_skips_silently_when_rejected() {
        let mut f = fixture();
        f.handle.reject_output(OutputKind::Photo, true);
        f.service.add_output(&mut f.session);
        assert!(!f.session.has_output(OutputKind::Photo));
    }

    #[test]
    fn test_capture_prefers_hevc_and_allocates_movie() {
        let mut f = fixture();
        f.handle.set_photo_capabilities(PhotoCapabilities {
            depth_delivery_supported: false,
            live_photo_supported: true,
            available_codecs: vec![PhotoCodec::Jpeg, PhotoCodec::Hevc],
        });
        f.service.add_output(&mut f.session);
        f.service.capture(&mut f.session, FlashMode::Auto, true, true);

        let settings = f.handle.last_photo_settings().unwrap();
        assert_eq!(settings.codec, PhotoCodec::Hevc);
        assert_eq!(settings.flash_mode, FlashMode::Auto);
        assert!(!settings.depth_delivery_enabled);
        let movie = settings.live_photo_movie_path.unwrap();
        assert_eq!(movie.parent(), Some(f.dir.path()));
        assert_eq!(movie.extension().and_then(|e| e.to_str()), Some("mov"));
    }

    #[test]
    fn test_capture_saves_photo_and_paired_movie() {
        let mut f = fixture();
        f.handle.set_photo_capabilities(PhotoCapabilities {
            depth_delivery_supported: true,
            live_photo_supported: true,
            available_codecs: vec![PhotoCodec::Jpeg],
        });
        f.service.add_output(&mut f.session);
        let id = f.service.capture(&mut f.session, FlashMode::Off, true, true);
        let movie = f.handle.last_photo_settings().unwrap().live_photo_movie_path.unwrap();
        f.deliver();

        match f.events.blocking_recv() {
            Some(CameraEvent::PhotoWillCapture { id: got }) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
        match f.events.blocking_recv() {
            Some(CameraEvent::PhotoCaptured { error, preview, data, .. }) => {
                assert!(error.is_none());
                assert!(preview.is_some());
                assert!(data.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let path = f.saved().unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(path.with_extension("mov").exists());
        assert!(!movie.exists());
        assert_eq!(f.service.in_flight(), 0);
    }

    #[test]
    fn test_rejected_request_reports_immediately() {
        let mut f = fixture();
        f.service.add_output(&mut f.session);
        f.handle
            .fail_next_photo(BackendError::NotSupported("flash".into()));
        let id = f.service.capture(&mut f.session, FlashMode::On, false, false);

        match f.events.try_recv() {
            Ok(CameraEvent::PhotoCaptured { id: got, error, .. }) => {
                assert_eq!(got, id);
                assert!(matches!(error, Some(PhotoError::CaptureFailed(_))));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(f.service.in_flight(), 0);
    }

    #[test]
    fn test_capture_rejected_inside_transaction() {
        let mut f = fixture();
        f.service.add_output(&mut f.session);
        let id = {
            let mut tx = ConfigurationTransaction::begin(&mut f.session);
            f.service.capture(&mut *tx, FlashMode::Off, false, false)
        };

        assert!(f.captured.lock().unwrap().is_empty());
        match f.events.try_recv() {
            Ok(CameraEvent::PhotoCaptured { id: got, error, .. }) => {
                assert_eq!(got, id);
                let message = error.unwrap().to_string();
                assert!(message.contains("configuration in progress"), "{}", message);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(f.service.in_flight(), 0);
        assert!(f.handle.last_photo_settings().is_none());
    }

    #[test]
    fn test_finish_without_data_reports_no_frame() {
        let mut f = fixture();
        f.service.add_output(&mut f.session);
        let id = f.service.capture(&mut f.session, FlashMode::Off, false, false);
        f.captured.lock().unwrap().clear();

        f.service
            .handle_capture_event(PhotoCaptureEvent::Finished { id, error: None });
        assert_eq!(f.saved(), Err(PhotoError::NoFrameAvailable));
        assert_eq!(f.service.in_flight(), 0);
    }

    #[test]
    fn test_overlapping_requests_tracked_separately() {
        let mut f = fixture();
        f.service.add_output(&mut f.session);
        let first = f.service.capture(&mut f.session, FlashMode::Off, false, false);
        let second = f.service.capture(&mut f.session, FlashMode::Off, false, false);
        assert_ne!(first, second);
        assert_eq!(f.service.in_flight(), 2);
        f.deliver();
        assert!(f.saved().is_ok());
        assert!(f.saved().is_ok());
        assert_eq!(f.service.in_flight(), 0);
    }
}
