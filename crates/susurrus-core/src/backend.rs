//! Audio backend
//!
//! The playback core talks to audio hardware through two small traits:
//! [`AudioBackend`] turns an asset's bytes into a channel handle, and
//! [`AudioSink`] is the per-channel handle itself. The production
//! implementation decodes with Symphonia on a feed thread and streams through
//! cpal; tests substitute an in-memory fake.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use thiserror::Error;

use crate::decoder::{ Decoder, DecoderError };
use crate::output::{ AudioOutput, OutputError, SampleBuffer };


/// Errors that can occur while opening a channel on the backend.
#[derive( Debug, Error )]
pub enum BackendError {
    #[error( "Decode error: {0}" )]
    Decode( #[from] DecoderError ),

    #[error( "Audio output error: {0}" )]
    Output( #[from] OutputError ),

    #[error( "Failed to create resampler: {0}" )]
    Resampler( String ),
}


/// Handle to one channel's audio resource.
///
/// All methods take `&self`: state lives in atomics so the router can drive
/// the handle while a loop monitor reads `is_playing` from another thread.
/// By convention only the router mutates; monitors only observe.
pub trait AudioSink: Send + Sync {
    /// Starts rendering audio. No-op if already playing.
    fn play( &self );

    /// Stops rendering audio. No-op if already stopped.
    fn pause( &self );

    /// Moves the read position back to the beginning of the track.
    fn seek_to_start( &self );

    /// Returns true while audio is actively rendering. Flips to false on its
    /// own when the end of the track is reached.
    fn is_playing( &self ) -> bool;

    /// Gets the output volume.
    fn volume( &self ) -> f32;

    /// Sets the output volume. Range enforcement is the caller's job.
    fn set_volume( &self, volume: f32 );

    /// Track duration, if the container reports one.
    fn duration( &self ) -> Option<Duration>;
}


/// Factory turning asset bytes into channel handles.
pub trait AudioBackend {
    /// Decodes the asset and prepares a ready-to-play (but stopped) handle.
    fn open( &self, name: &str, bytes: Vec<u8> ) -> Result<Arc<dyn AudioSink>, BackendError>;
}


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] -> [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let num_ch = channels.len();
    let mut out = Vec::with_capacity( frames * num_ch );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Sample-rate converter for devices that cannot run at the source rate.
///
/// Wraps rubato's FastFixedOut, buffering planar input until it has enough
/// frames for a full output chunk.
struct RateConverter {
    inner: FastFixedOut<f32>,
    pending: Vec<Vec<f32>>,
    channels: usize,
}


impl RateConverter {
    fn new( source_rate: u32, target_rate: u32, channels: usize ) -> Result<Self, BackendError> {
        let inner = FastFixedOut::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0,  // max relative input/output size ratio
            PolynomialDegree::Cubic,
            1024, // output chunk size
            channels,
        ).map_err( |e| BackendError::Resampler( e.to_string() ) )?;

        Ok( Self {
            inner,
            pending: ( 0..channels ).map( |_| Vec::new() ).collect(),
            channels,
        })
    }


    /// Feeds interleaved samples in, returns whatever full chunks come out.
    fn push( &mut self, interleaved: &[f32] ) -> Vec<f32> {
        for chunk in interleaved.chunks( self.channels ) {
            for ( ch_idx, sample ) in chunk.iter().enumerate() {
                self.pending[ ch_idx ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= self.inner.input_frames_next() {
            let needed = self.inner.input_frames_next();
            let input: Vec<Vec<f32>> = self.pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match self.inner.process( &input, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Drains the remaining partial chunk at end of stream.
    fn flush( &mut self ) -> Vec<f32> {
        if self.pending[ 0 ].is_empty() {
            return Vec::new();
        }

        let out = match self.inner.process_partial( Some( &self.pending ), None ) {
            Ok( resampled ) => interleave( &resampled ),
            Err( e ) => {
                tracing::error!( "Final resample error: {}", e );
                Vec::new()
            }
        };

        for ch in self.pending.iter_mut() {
            ch.clear();
        }
        out
    }


    /// Discards buffered input after a rewind.
    fn reset( &mut self ) {
        self.inner.reset();
        for ch in self.pending.iter_mut() {
            ch.clear();
        }
    }
}


/// Wrapper around AudioOutput that allows it to be stored in a shared handle.
///
/// SAFETY: AudioOutput must only be accessed from the thread where it was
/// created. The sink never touches it after construction; the field exists
/// for its Drop impl, which stops the cpal stream.
struct AudioOutputHandle( #[allow( dead_code )] AudioOutput );

// SAFETY: cpal::Stream's raw pointers are only accessed by the audio callback
// thread, which is managed internally by cpal.
unsafe impl Send for AudioOutputHandle {}
unsafe impl Sync for AudioOutputHandle {}


/// Production channel handle: cpal stream fed by a per-channel decode thread.
struct StreamSink {
    buffer: Arc<SampleBuffer>,
    /// True while audio renders; cleared by the feed thread at end of stream
    playing: Arc<AtomicBool>,
    /// Request flag: feed thread rewinds the decoder and clears the buffer
    rewind: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    duration: Option<Duration>,
    _output: AudioOutputHandle,
}


impl AudioSink for StreamSink {
    fn play( &self ) {
        if !self.playing.swap( true, Ordering::Relaxed ) {
            self.buffer.set_paused( false );
        }
    }


    fn pause( &self ) {
        if self.playing.swap( false, Ordering::Relaxed ) {
            self.buffer.set_paused( true );
        }
    }


    fn seek_to_start( &self ) {
        self.rewind.store( true, Ordering::Relaxed );
    }


    fn is_playing( &self ) -> bool {
        self.playing.load( Ordering::Relaxed )
    }


    fn volume( &self ) -> f32 {
        self.buffer.volume()
    }


    fn set_volume( &self, volume: f32 ) {
        self.buffer.set_volume( volume );
    }


    fn duration( &self ) -> Option<Duration> {
        self.duration
    }
}


impl Drop for StreamSink {
    fn drop( &mut self ) {
        self.stop.store( true, Ordering::Relaxed );
        self.playing.store( false, Ordering::Relaxed );
        self.buffer.set_paused( true );
        self.buffer.clear();

        if let Some( worker ) = self.worker.take() {
            let _ = worker.join();
        }
        // _output is dropped here, which stops the cpal stream
    }
}


/// Backend that streams to the default cpal output device.
pub struct CpalBackend;


impl AudioBackend for CpalBackend {
    fn open( &self, name: &str, bytes: Vec<u8> ) -> Result<Arc<dyn AudioSink>, BackendError> {
        let decoder = Decoder::new( name, bytes )?;

        let source_rate = decoder.sample_rate();
        let channels = decoder.channels() as u16;
        let duration = decoder.duration();

        let ( output, buffer ) = AudioOutput::new( source_rate, channels )?;

        let converter = if output.sample_rate() != source_rate {
            Some( RateConverter::new( source_rate, output.sample_rate(), channels as usize )? )
        } else {
            None
        };

        // The stream runs for the whole session; the paused sample buffer
        // keeps it silent until play()
        output.start()?;

        let playing = Arc::new( AtomicBool::new( false ) );
        let rewind = Arc::new( AtomicBool::new( false ) );
        let stop = Arc::new( AtomicBool::new( false ) );

        let worker = {
            let buffer = Arc::clone( &buffer );
            let playing = Arc::clone( &playing );
            let rewind = Arc::clone( &rewind );
            let stop = Arc::clone( &stop );
            let name = name.to_string();
            thread::spawn( move || {
                feed_loop( decoder, buffer, playing, rewind, stop, converter, name );
            })
        };

        Ok( Arc::new( StreamSink {
            buffer,
            playing,
            rewind,
            stop,
            worker: Some( worker ),
            duration,
            _output: AudioOutputHandle( output ),
        }))
    }
}


/// The per-channel decode loop.
///
/// Stays a few tens of milliseconds ahead of the audio callback, sleeps while
/// the channel is stopped, and clears the playing flag when the track ends
/// naturally so the loop monitor can observe the completion.
fn feed_loop(
    mut decoder: Decoder,
    buffer: Arc<SampleBuffer>,
    playing: Arc<AtomicBool>,
    rewind: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    mut converter: Option<RateConverter>,
    name: String,
) {
    // Keep about 50ms decoded ahead
    let high_water = ( decoder.sample_rate() as usize * decoder.channels() ) / 20;

    loop {
        if stop.load( Ordering::Relaxed ) {
            break;
        }

        if rewind.swap( false, Ordering::Relaxed ) {
            buffer.clear();
            if let Some( converter ) = converter.as_mut() {
                converter.reset();
            }
            if let Err( e ) = decoder.rewind() {
                tracing::warn!( "Rewind failed for {}: {}", name, e );
            }
        }

        if !playing.load( Ordering::Relaxed ) {
            thread::sleep( Duration::from_millis( 10 ) );
            continue;
        }

        if buffer.len() > high_water {
            thread::sleep( Duration::from_millis( 5 ) );
            continue;
        }

        match decoder.decode_next() {
            Ok( Some( samples ) ) => {
                let out = match converter.as_mut() {
                    Some( converter ) => converter.push( &samples ),
                    None => samples,
                };
                push_all( &buffer, &out, &stop, &rewind );
            }
            Ok( None ) => {
                // Natural end: flush the resampler tail, let the buffered
                // audio drain, then flag completion and rewind so the next
                // play() starts from the beginning
                if let Some( converter ) = converter.as_mut() {
                    let tail = converter.flush();
                    push_all( &buffer, &tail, &stop, &rewind );
                }

                while !buffer.is_empty()
                    && playing.load( Ordering::Relaxed )
                    && !stop.load( Ordering::Relaxed )
                    && !rewind.load( Ordering::Relaxed )
                {
                    thread::sleep( Duration::from_millis( 10 ) );
                }

                if let Err( e ) = decoder.rewind() {
                    tracing::warn!( "Rewind failed for {}: {}", name, e );
                }
                buffer.set_paused( true );
                buffer.clear();
                playing.store( false, Ordering::Relaxed );
                tracing::debug!( "{}: reached end of stream", name );
            }
            Err( e ) => {
                // Treated like end of stream; the router decides whether a
                // restart is attempted
                tracing::error!( "Decode error in {}: {}", name, e );
                buffer.set_paused( true );
                buffer.clear();
                playing.store( false, Ordering::Relaxed );
                if let Err( e ) = decoder.rewind() {
                    tracing::warn!( "Rewind failed for {}: {}", name, e );
                }
            }
        }
    }

    tracing::debug!( "Feed thread for {} exiting", name );
}


/// Pushes a block of samples, backing off while the buffer is full. Bails
/// out if the channel is being stopped or rewound.
fn push_all( buffer: &SampleBuffer, samples: &[f32], stop: &AtomicBool, rewind: &AtomicBool ) {
    let mut offset = 0;
    while offset < samples.len()
        && !stop.load( Ordering::Relaxed )
        && !rewind.load( Ordering::Relaxed )
    {
        let pushed = buffer.push( &samples[ offset.. ] );
        offset += pushed;
        if pushed == 0 {
            thread::sleep( Duration::from_millis( 5 ) );
        }
    }
}
