// SPDX-License-Identifier: GPL-3.0-only

//! Serial session queue
//!
//! One named thread owns the [`SessionContext`] and runs every task in
//! submission order. Frame delivery, photo callbacks, subject-area
//! notifications and recording finalization all re-enter through the same
//! queue, so the context never needs a lock.

use super::context::SessionContext;
use crate::backends::camera::{CameraFrame, FrameSink, PhotoSink, SubjectAreaSink};
use crate::constants::timing;
use crate::errors::{CameraError, RecordingError};
use crate::pipelines::video::FinalizeCallback;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};

pub type SessionTask = Box<dyn FnOnce(&mut SessionContext) + Send>;

enum Message {
    Task(SessionTask),
    Shutdown,
}

/// Cloneable handle for submitting work to the session thread
#[derive(Clone)]
pub struct SessionQueue {
    sender: mpsc::Sender<Message>,
}

impl SessionQueue {
    /// Create a queue and the receiver the executor will drain
    pub fn new() -> (Self, QueueReceiver) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, QueueReceiver { receiver })
    }

    /// Enqueue a task; returns false once the executor has shut down
    pub fn dispatch(&self, task: impl FnOnce(&mut SessionContext) + Send + 'static) -> bool {
        let sent = self.sender.send(Message::Task(Box::new(task))).is_ok();
        if !sent {
            trace!("Session queue closed, task dropped");
        }
        sent
    }

    fn shutdown(&self) {
        let _ = self.sender.send(Message::Shutdown);
    }

    /// Frame sink that hops onto the queue
    ///
    /// With `discard_late`, a frame is dropped while the previous one is still
    /// waiting to be processed.
    pub fn frame_sink(&self, discard_late: bool) -> FrameSink {
        let queue = self.clone();
        let pending = Arc::new(AtomicBool::new(false));
        Arc::new(move |frame: CameraFrame| {
            if discard_late && pending.swap(true, Ordering::AcqRel) {
                trace!(pts_ms = frame.pts.as_millis(), "Late frame discarded");
                return;
            }
            let pending = Arc::clone(&pending);
            queue.dispatch(move |ctx| {
                pending.store(false, Ordering::Release);
                ctx.handle_frame(Arc::new(frame));
            });
        })
    }

    pub fn photo_sink(&self) -> PhotoSink {
        let queue = self.clone();
        Arc::new(move |event| {
            queue.dispatch(move |ctx| ctx.handle_photo_event(event));
        })
    }

    pub fn subject_area_sink(&self) -> SubjectAreaSink {
        let queue = self.clone();
        Arc::new(move || {
            queue.dispatch(SessionContext::subject_area_changed);
        })
    }

    pub fn finalize_callback(&self) -> FinalizeCallback {
        let queue = self.clone();
        Arc::new(move |result: Result<PathBuf, RecordingError>| {
            queue.dispatch(move |ctx| ctx.recording_finalized(result));
        })
    }
}

pub struct QueueReceiver {
    receiver: mpsc::Receiver<Message>,
}

/// Owns the session thread
///
/// Dropping it lets already queued tasks run, then stops and joins the thread.
pub struct SessionExecutor {
    queue: SessionQueue,
    thread: Option<JoinHandle<()>>,
}

impl SessionExecutor {
    pub fn spawn(
        context: SessionContext,
        queue: SessionQueue,
        receiver: QueueReceiver,
    ) -> Result<Self, CameraError> {
        let thread = std::thread::Builder::new()
            .name("camera-session".to_string())
            .spawn(move || run(context, receiver))
            .map_err(|e| {
                CameraError::InitializationFailed(format!("Spawn session thread: {}", e))
            })?;
        Ok(Self {
            queue,
            thread: Some(thread),
        })
    }

    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }
}

impl Drop for SessionExecutor {
    fn drop(&mut self) {
        self.queue.shutdown();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Session thread panicked");
        }
    }
}

fn run(mut context: SessionContext, receiver: QueueReceiver) {
    raise_priority();
    info!("Session queue running");
    while let Ok(message) = receiver.receiver.recv() {
        match message {
            Message::Task(task) => task(&mut context),
            Message::Shutdown => break,
        }
    }
    context.shutdown();
    info!("Session queue stopped");
}

/// Best effort; unprivileged users may only lower priority
fn raise_priority() {
    // SAFETY: setpriority takes plain integers; who = 0 targets the calling thread on Linux.
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, timing::SESSION_THREAD_NICE) };
    if ret == 0 {
        debug!(nice = timing::SESSION_THREAD_NICE, "Raised session thread priority");
    } else {
        debug!(
            error = %std::io::Error::last_os_error(),
            "Could not raise session thread priority"
        );
    }
}
