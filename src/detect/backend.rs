use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Capabilities a detector backend can offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Proposes boxes with class labels and confidences.
    ObjectDetection,
    /// Assigns persistent track identities across calls.
    Tracking,
}

/// Detector/tracker backend trait.
///
/// # Collaborator contract
///
/// The backend is stateful across calls for one video session. Implementations
/// must:
/// - Assign stable track identities to the same physical object across frames
/// - Never reuse an identity for a different physical object
/// - Leave `track_id` empty for boxes they could not associate
///
/// Calls are blocking and ordered: the pipeline never submits the next frame
/// before the previous call returned.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection and tracking on a frame.
    ///
    /// An `Err` (or an invalid detection in the result) is a soft condition for the
    /// pipeline: the frame is treated as having no detections.
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
