pub mod backend;
pub mod capture;
pub mod playback;
pub mod sim;
pub mod tap;

pub use backend::{
    AudioBackendFactory, AudioBackendKind, CaptureBackend, CaptureConfig, CaptureHandle,
    PlaybackBackend, PlaybackConfig, PlaybackSink,
};
pub use capture::{frame_rms, CpalCaptureBackend};
pub use playback::{CpalPlaybackBackend, InboundAudioBuffer, PlaybackCursor, PlaybackScheduler};
pub use sim::{FailingCaptureBackend, SimCaptureBackend, SimPlaybackBackend, SimPlaybackState};
pub use tap::CaptureTap;
