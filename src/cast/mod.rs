//! Cast receiver discovery, connection and playback

pub mod castv2;
pub mod connector;
pub mod device;
pub mod discovery;
pub mod dispatcher;
pub mod registry;
pub mod session;
pub mod slug;

pub use castv2::{CastV2Factory, CastV2Session};
pub use connector::Connector;
pub use device::{CastType, DeviceDescriptor, DeviceHandle, DeviceState};
pub use discovery::{CastService, DiscoveryEngine, MdnsBrowser, ServiceBrowser};
pub use dispatcher::PlaybackDispatcher;
pub use registry::{DeviceMap, DeviceRegistry};
pub use session::{CastSession, IdleReason, MediaStatus, PlayerState, SessionFactory};
pub use slug::slugify;
