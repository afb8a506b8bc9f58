#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod source;

#[cfg(feature = "desktop")]
pub use detector::PoseDetector;
pub use keypoint::{gate_keypoints, Joint, JointPoint, PoseSnapshot, RawKeypoints, ANCHOR_JOINTS};
#[cfg(feature = "desktop")]
pub use preprocess::{load_image, preprocess_for_movenet};
pub use source::{PoseSource, StaticSource};
