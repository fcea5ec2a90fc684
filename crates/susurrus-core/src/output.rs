//! Audio output via cpal
//!
//! Each soundscape channel owns one output stream. Decoded PCM flows from the
//! channel's feed thread into a shared sample buffer; the device callback
//! drains it, applying pause and volume on the way out.

use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to start stream: {0}" )]
    PlayStream( String ),
}


/// Shared sample buffer between producer (feed thread) and consumer (audio
/// callback). Handles channel-count conversion between source and device.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Volume level stored as f32 bits
    volume: AtomicU32,
    source_channels: u16,
    output_channels: u16,
}


impl SampleBuffer {
    /// Creates a new sample buffer.
    ///
    /// - `capacity`: maximum number of samples to buffer
    /// - `source_channels`: channel count of the decoded audio
    /// - `output_channels`: channel count expected by the device
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( true ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels,
            output_channels,
        }
    }


    /// Pushes samples to the buffer. Returns the number actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.buffer.lock().unwrap();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Pops samples into the output slice, converting channel counts as
    /// needed. Unfilled output is zeroed. Returns the number of output
    /// samples written.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        // Silence while paused; buffered samples stay put
        if self.paused.load( Ordering::Relaxed ) {
            output.fill( 0.0 );
            return 0;
        }

        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let mut buf = self.buffer.lock().unwrap();
        let src_ch = self.source_channels as usize;
        let out_ch = self.output_channels as usize;

        let written = if src_ch == out_ch {
            let to_pop = output.len().min( buf.len() );
            for sample in output[ ..to_pop ].iter_mut() {
                *sample = buf.pop_front().unwrap();
            }
            output[ to_pop.. ].fill( 0.0 );
            to_pop
        } else if src_ch == 1 && out_ch == 2 {
            // Mono to stereo: duplicate each sample
            let frames = ( output.len() / 2 ).min( buf.len() );
            for i in 0..frames {
                let sample = buf.pop_front().unwrap();
                output[ i * 2 ] = sample;
                output[ i * 2 + 1 ] = sample;
            }
            output[ frames * 2.. ].fill( 0.0 );
            frames * 2
        } else if src_ch == 2 && out_ch == 1 {
            // Stereo to mono: mix down
            let frames = output.len().min( buf.len() / 2 );
            for sample in output[ ..frames ].iter_mut() {
                let left = buf.pop_front().unwrap();
                let right = buf.pop_front().unwrap();
                *sample = ( left + right ) * 0.5;
            }
            output[ frames.. ].fill( 0.0 );
            frames
        } else {
            // General case: copy matching channels, duplicate the last source
            // channel into any extra output channels
            let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
            for frame in 0..frames {
                let mut src_samples = [ 0.0_f32; 16 ];
                for ch in 0..src_ch.min( 16 ) {
                    src_samples[ ch ] = buf.pop_front().unwrap();
                }
                for ch in 0..out_ch {
                    output[ frame * out_ch + ch ] = src_samples[ ch.min( src_ch - 1 ).min( 15 ) ];
                }
            }
            output[ frames * out_ch.. ].fill( 0.0 );
            frames * out_ch
        };

        if volume != 1.0 {
            for sample in output[ ..written ].iter_mut() {
                *sample *= volume;
            }
        }

        written
    }


    /// Returns the number of samples currently buffered.
    pub fn len( &self ) -> usize {
        self.buffer.lock().unwrap().len()
    }


    /// Returns true if the buffer is empty.
    pub fn is_empty( &self ) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }


    /// Clears the buffer.
    pub fn clear( &self ) {
        self.buffer.lock().unwrap().clear();
    }


    /// Sets paused state. While paused the callback outputs silence.
    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    /// Gets paused state.
    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the volume level applied at the output.
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    /// Gets the current volume level.
    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// Audio output handler.
/// Note: NOT Send/Sync due to cpal::Stream. Keep it on the thread where it
/// was created.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Creates an output stream for the given source format.
    ///
    /// Returns the AudioOutput together with the shared SampleBuffer the
    /// caller should push decoded samples into. The buffer handles channel
    /// conversion if the device cannot match the source channel count.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        // Priority: exact match, then same rate with channel conversion,
        // then the device default (rate conversion happens upstream)
        let config = if let Some( supported_config ) = supported_configs.iter().find( |c| {
            c.channels() == source_channels
                && c.min_sample_rate().0 <= source_sample_rate
                && c.max_sample_rate().0 >= source_sample_rate
        }) {
            supported_config.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else if let Some( supported_config ) = supported_configs.iter().find( |c| {
            c.min_sample_rate().0 <= source_sample_rate
                && c.max_sample_rate().0 >= source_sample_rate
        }) {
            tracing::info!(
                "Channel conversion: source has {} channels, device using {}",
                source_channels,
                supported_config.channels()
            );
            supported_config.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else {
            let default_config = device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::info!(
                "Device cannot run at {} Hz, resampling to {} Hz",
                source_sample_rate,
                default_config.sample_rate().0
            );
            default_config.config()
        };

        tracing::debug!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // ~500ms of source audio
        let buffer_capacity = ( source_sample_rate as usize ) * ( source_channels as usize ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new(
            buffer_capacity,
            source_channels,
            config.channels,
        ));
        let sample_buffer_clone = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    sample_buffer_clone.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
            },
            sample_buffer,
        ))
    }


    /// Starts the output stream. Pausing is done through the sample buffer,
    /// so this is called once and the stream stays running.
    pub fn start( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Gets the actual device sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buf = SampleBuffer::new( 4, 2, 2 );
        assert_eq!( buf.push( &[ 1.0, 2.0, 3.0 ] ), 3 );
        assert_eq!( buf.push( &[ 4.0, 5.0 ] ), 1 );
        assert_eq!( buf.len(), 4 );
    }


    #[test]
    fn test_pop_outputs_silence_while_paused() {
        let buf = SampleBuffer::new( 8, 2, 2 );
        buf.push( &[ 1.0, 1.0 ] );
        buf.set_paused( true );

        let mut out = [ 9.0_f32; 4 ];
        assert_eq!( buf.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0; 4 ] );
        // Samples stay buffered for resume
        assert_eq!( buf.len(), 2 );
    }


    #[test]
    fn test_pop_applies_volume() {
        let buf = SampleBuffer::new( 8, 2, 2 );
        buf.set_paused( false );
        buf.set_volume( 0.5 );
        buf.push( &[ 1.0, 1.0 ] );

        let mut out = [ 0.0_f32; 2 ];
        assert_eq!( buf.pop( &mut out ), 2 );
        assert_eq!( out, [ 0.5, 0.5 ] );
    }


    #[test]
    fn test_pop_mono_to_stereo() {
        let buf = SampleBuffer::new( 8, 1, 2 );
        buf.set_paused( false );
        buf.push( &[ 0.25, 0.75 ] );

        let mut out = [ 0.0_f32; 4 ];
        assert_eq!( buf.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.25, 0.25, 0.75, 0.75 ] );
    }


    #[test]
    fn test_pop_stereo_to_mono() {
        let buf = SampleBuffer::new( 8, 2, 1 );
        buf.set_paused( false );
        buf.push( &[ 0.2, 0.4, 1.0, 0.0 ] );

        let mut out = [ 0.0_f32; 2 ];
        assert_eq!( buf.pop( &mut out ), 2 );
        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert!( ( out[ 1 ] - 0.5 ).abs() < 1e-6 );
    }
}
