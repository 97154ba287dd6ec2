mod backend;
mod backends;
mod completion;
mod error;
mod registry;
mod result;
mod threaded;

pub use backend::{DetectionCapability, Detector, DetectorBackend};
pub use backends::{MotionBackend, ScriptedBackend};
pub use completion::Completion;
pub use error::DetectionError;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{BoundingBox, Detection, DetectionResult, TextBlock};
pub use threaded::ThreadedDetector;
