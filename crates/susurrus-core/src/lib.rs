//! Susurrus Core - Soundscape playback engine
//!
//! This crate provides the playback core for the ambient sound player: asset
//! loading, the audio backend, the channel registry and focus cursor, and the
//! command router with its loop-completion monitors.

pub mod assets;
pub mod backend;
pub mod channel;
pub mod cursor;
pub mod decoder;
pub mod monitor;
pub mod output;
pub mod registry;
pub mod router;

#[cfg( test )]
pub( crate ) mod testing;

pub use assets::{ AssetError, AssetSource, DirAssets };
pub use backend::{ AudioBackend, AudioSink, BackendError, CpalBackend };
pub use channel::PlaybackChannel;
pub use cursor::FocusCursor;
pub use registry::{ ChannelRegistry, RegistryError };
pub use router::{ CommandRouter, ControlEvent, Flow, Snapshot };
