//! Job application tracking: matching inbound emails to applications and
//! recording how their status evolves.

pub mod ingest;
pub mod model;
pub mod normalize;
pub mod resolver;
pub mod service;
pub mod transition;

pub use ingest::EmailIngested;
pub use model::{
    AppStatus, Application, ApplicationDetail, Email, StatusBoard, StatusEvent, StatusReason,
    UserIdentity,
};
pub use service::{IngestOutcome, MatchedBy, Tracker};
