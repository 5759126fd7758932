pub mod agent;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod observation;
pub mod source;
pub mod upload;

pub use agent::Agent;
pub use classifier::{Classification, MotionClassifier};
pub use collector::{CollectorServer, ImageStore};
pub use config::{AgentConfig, CamwatchConfig, CollectorConfig};
pub use error::{CamwatchError, Result, UploadError};
pub use events::{AgentEvent, EventBus};
pub use frame::Frame;
pub use observation::Observation;
pub use source::{FrameSource, SyntheticFrameSource};
pub use upload::{HttpUploadClient, ImageUploader, ServerConfig, UploadScheduler};
