//! moOde audio monitor
//!
//! Detects which audio source (Spotify, AirPlay, radio, or an unknown
//! process) currently owns the ALSA device on a moOde player and publishes
//! confirmed changes to MQTT.

pub mod cache;
pub mod config;
pub mod error;
pub mod evidence;
pub mod monitor;
pub mod publisher;
pub mod resolver;
pub mod state;

pub use cache::ReadCache;
pub use config::AppConfig;
pub use evidence::{Evidence, Reading, SystemEvidence};
pub use monitor::{CycleOutcome, Monitor};
pub use publisher::{Publisher, StateMessage, Topics};
pub use resolver::StateResolver;
pub use state::{AudioState, Source};
