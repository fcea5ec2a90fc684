//! Channel registry
//!
//! The fixed, ordered set of playback channels, built once at startup. Any
//! asset or decode failure during load is fatal: a partially built registry
//! is never used.

use thiserror::Error;

use crate::assets::{ display_label, AssetError, AssetSource };
use crate::backend::{ AudioBackend, BackendError };
use crate::channel::PlaybackChannel;


/// Errors that can occur while building or addressing the registry.
#[derive( Debug, Error )]
pub enum RegistryError {
    #[error( transparent )]
    Asset( #[from] AssetError ),

    #[error( "Failed to open {name}: {source}" )]
    Open {
        name: String,
        source: BackendError,
    },

    /// A focus or completion index escaped [0, count). This is an invariant
    /// violation, not a user condition.
    #[error( "Channel index {index} out of range (0..{count})" )]
    IndexOutOfRange {
        index: usize,
        count: usize,
    },
}


/// Ordered, fixed-size collection of playback channels.
pub struct ChannelRegistry {
    channels: Vec<PlaybackChannel>,
}


impl ChannelRegistry {
    /// Loads every asset the source lists and opens a channel for each.
    /// Asset order is channel id order.
    pub fn load(
        assets: &dyn AssetSource,
        backend: &dyn AudioBackend,
    ) -> Result<Self, RegistryError> {
        let names = assets.list()?;

        let mut channels = Vec::with_capacity( names.len() );
        for ( id, name ) in names.iter().enumerate() {
            let bytes = assets.read( name )?;
            let sink = backend.open( name, bytes ).map_err( |source| RegistryError::Open {
                name: name.clone(),
                source,
            })?;
            channels.push( PlaybackChannel::new( id, display_label( name ), sink ) );
        }

        tracing::info!( "Loaded {} channels", channels.len() );
        Ok( Self { channels } )
    }


    /// Number of channels. Fixed after load, always at least 1.
    pub fn count( &self ) -> usize {
        self.channels.len()
    }


    /// Gets a channel by index.
    pub fn get( &self, index: usize ) -> Result<&PlaybackChannel, RegistryError> {
        let count = self.channels.len();
        self.channels.get( index ).ok_or( RegistryError::IndexOutOfRange { index, count } )
    }


    /// Gets a channel by index for mutation.
    pub fn get_mut( &mut self, index: usize ) -> Result<&mut PlaybackChannel, RegistryError> {
        let count = self.channels.len();
        self.channels.get_mut( index ).ok_or( RegistryError::IndexOutOfRange { index, count } )
    }


    /// Iterates channels in id order.
    pub fn iter( &self ) -> impl Iterator<Item = &PlaybackChannel> {
        self.channels.iter()
    }


    /// Stops every channel immediately. Resource teardown itself happens on
    /// drop; this just silences the output right away.
    pub fn release_all( &mut self ) {
        for channel in self.channels.iter_mut() {
            channel.pause();
        }
    }
}


impl Drop for ChannelRegistry {
    fn drop( &mut self ) {
        // Sinks drop with the channels, joining feed threads and closing
        // streams; pausing first keeps the teardown silent
        self.release_all();
        tracing::debug!( "Registry released" );
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::{ FakeBackend, MemoryAssets };


    fn assets() -> MemoryAssets {
        MemoryAssets::new( &[ "bells.mp3", "rain.mp3" ] )
    }


    #[test]
    fn test_load_assigns_ordinal_ids_and_labels() {
        let backend = FakeBackend::new();
        let registry = ChannelRegistry::load( &assets(), &backend ).unwrap();

        assert_eq!( registry.count(), 2 );
        assert_eq!( registry.get( 0 ).unwrap().id(), 0 );
        assert_eq!( registry.get( 0 ).unwrap().label(), "bells" );
        assert_eq!( registry.get( 1 ).unwrap().label(), "rain" );
    }


    #[test]
    fn test_get_out_of_range() {
        let backend = FakeBackend::new();
        let registry = ChannelRegistry::load( &assets(), &backend ).unwrap();

        assert!( matches!(
            registry.get( 2 ),
            Err( RegistryError::IndexOutOfRange { index: 2, count: 2 } )
        ));
    }


    #[test]
    fn test_load_fails_on_empty_source() {
        let backend = FakeBackend::new();
        let result = ChannelRegistry::load( &MemoryAssets::new( &[] ), &backend );
        assert!( matches!( result, Err( RegistryError::Asset( AssetError::Empty( _ ) ) ) ) );
    }


    #[test]
    fn test_load_fails_on_undecodable_asset() {
        let backend = FakeBackend::failing();
        let result = ChannelRegistry::load( &assets(), &backend );
        assert!( matches!( result, Err( RegistryError::Open { .. } ) ) );
    }
}
