//! Vehicle telemetry tracing: decode sensor frames, ingest CSV logs, and turn
//! either source into speed-colored map paths for live display or replay.

pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod live;
pub mod path_cache;
pub mod playback;
pub mod projection;
pub mod session;
pub mod stats;
pub mod status;
pub mod trajectory;
pub mod types;

pub use config::TraceConfig;
pub use error::{Result, TraceError};
pub use path_cache::{PathCache, SpeedBuckets};
pub use playback::{PlaybackClock, PlaybackState};
pub use projection::GeoProjector;
pub use session::{SessionEvent, TraceSession};
pub use trajectory::Trajectory;
pub use types::{GeoPoint, ProjectedPoint, Sample};
