//! Test doubles for the external collaborators
//!
//! A fake sink/backend pair and an in-memory asset source, so channel,
//! registry, monitor, and router semantics are tested without an audio
//! device.

use std::path::PathBuf;
use std::sync::{ Arc, Mutex };
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicUsize, Ordering };
use std::time::Duration;

use crate::assets::{ AssetError, AssetSource };
use crate::backend::{ AudioBackend, AudioSink, BackendError };
use crate::decoder::DecoderError;


/// In-memory audio handle recording the operations applied to it.
pub struct FakeSink {
    playing: AtomicBool,
    volume: AtomicU32,
    plays: AtomicUsize,
    seeks: AtomicUsize,
}


impl FakeSink {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            plays: AtomicUsize::new( 0 ),
            seeks: AtomicUsize::new( 0 ),
        }
    }


    /// Simulates the audio reaching its natural end.
    pub fn finish( &self ) {
        self.playing.store( false, Ordering::Relaxed );
    }


    /// Number of stopped-to-playing transitions.
    pub fn play_count( &self ) -> usize {
        self.plays.load( Ordering::Relaxed )
    }


    /// Number of seek_to_start calls.
    pub fn seek_count( &self ) -> usize {
        self.seeks.load( Ordering::Relaxed )
    }
}


impl AudioSink for FakeSink {
    fn play( &self ) {
        if !self.playing.swap( true, Ordering::Relaxed ) {
            self.plays.fetch_add( 1, Ordering::Relaxed );
        }
    }


    fn pause( &self ) {
        self.playing.store( false, Ordering::Relaxed );
    }


    fn seek_to_start( &self ) {
        self.seeks.fetch_add( 1, Ordering::Relaxed );
    }


    fn is_playing( &self ) -> bool {
        self.playing.load( Ordering::Relaxed )
    }


    fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }


    fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    fn duration( &self ) -> Option<Duration> {
        Some( Duration::from_secs( 30 ) )
    }
}


/// Backend handing out fake sinks, keeping a handle to each for assertions.
pub struct FakeBackend {
    sinks: Mutex<Vec<Arc<FakeSink>>>,
    fail: bool,
}


impl FakeBackend {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new( Vec::new() ),
            fail: false,
        }
    }


    /// A backend whose open() always fails, for load-error tests.
    pub fn failing() -> Self {
        Self {
            sinks: Mutex::new( Vec::new() ),
            fail: true,
        }
    }


    /// Sinks created so far, in creation order.
    pub fn sinks( &self ) -> Vec<Arc<FakeSink>> {
        self.sinks.lock().unwrap().clone()
    }
}


impl AudioBackend for FakeBackend {
    fn open( &self, _name: &str, _bytes: Vec<u8> ) -> Result<Arc<dyn AudioSink>, BackendError> {
        if self.fail {
            return Err( BackendError::Decode( DecoderError::UnsupportedFormat ) );
        }
        let sink = Arc::new( FakeSink::new() );
        self.sinks.lock().unwrap().push( Arc::clone( &sink ) );
        Ok( sink )
    }
}


/// Asset source over fixed entries, preserving insertion order.
pub struct MemoryAssets {
    entries: Vec<( String, Vec<u8> )>,
}


impl MemoryAssets {
    pub fn new( names: &[&str] ) -> Self {
        Self {
            entries: names
                .iter()
                .map( |name| ( name.to_string(), vec![ 0_u8; 4 ] ) )
                .collect(),
        }
    }
}


impl AssetSource for MemoryAssets {
    fn list( &self ) -> Result<Vec<String>, AssetError> {
        if self.entries.is_empty() {
            return Err( AssetError::Empty( PathBuf::from( "<memory>" ) ) );
        }
        Ok( self.entries.iter().map( |( name, _ )| name.clone() ).collect() )
    }


    fn read( &self, name: &str ) -> Result<Vec<u8>, AssetError> {
        self.entries
            .iter()
            .find( |( n, _ )| n == name )
            .map( |( _, bytes )| bytes.clone() )
            .ok_or_else( || AssetError::Read {
                name: name.to_string(),
                source: std::io::Error::new( std::io::ErrorKind::NotFound, "no such asset" ),
            })
    }
}
