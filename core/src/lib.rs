// Streetpass Core: passive peer discovery over radio advertisements
//
// A device advertises a compact identity token; nearby devices scan, decode,
// deduplicate and surface what they hear in a human-facing log.

pub mod adapter;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod identity;
pub mod service;

pub use adapter::{
    event_channel, AdapterCallbacks, AdapterError, AdapterEvent, AdapterEventReceiver,
    AdapterPowerState, AdapterRole, AdapterState, AdvertisingRequestId, LoopbackAdapter,
    RadioAdapter, RawDiscoveryEvent, ScanOptions,
};
pub use codec::{
    AdvertisementCodec, AdvertisementPayload, CodecLimits, DecodeError, EncodingError, FieldKind,
    FieldValue, PayloadFormat,
};
pub use config::{ConfigError, StreetpassConfig};
pub use discovery::{
    BroadcastController, BroadcastError, DiscoveredDevice, DiscoveryDeduplicator, DiscoveryLog,
    ScanController, ScanOutcome, ToggleOutcome,
};
pub use identity::IdentityToken;
pub use service::{spawn_service, DiscoveryService, DisplayState, ServiceError, ServiceHandle};
