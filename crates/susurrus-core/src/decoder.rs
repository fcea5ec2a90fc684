//! Audio decoding via Symphonia
//!
//! Decodes an in-memory soundscape asset into raw interleaved PCM samples.
//! Soundscapes are small looping files, so the whole asset is held in memory
//! and the decoder rewinds over it rather than reopening anything.

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use thiserror::Error;


/// Errors that can occur while decoding a soundscape.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Unsupported audio format" )]
    UnsupportedFormat,

    #[error( "No audio track found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Rewind error: {0}" )]
    Rewind( String ),
}


/// Decoder over one in-memory audio asset.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    duration: Option<Duration>,
}


impl Decoder {
    /// Probes and opens an asset for decoding.
    ///
    /// The asset name is only used as a format hint (file extension) and in
    /// log output.
    pub fn new( name: &str, bytes: Vec<u8> ) -> Result<Self, DecoderError> {
        let mss = MediaSourceStream::new( Box::new( Cursor::new( bytes ) ), Default::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = name.rsplit( '.' ).next() {
            hint.with_extension( ext );
        }

        let format_opts = FormatOptions::default();
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &format_opts, &metadata_opts )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let format_reader = probed.format;

        // First decodable track wins
        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );

        let duration = codec_params.n_frames.map( |frames| {
            Duration::from_secs_f64( frames as f64 / sample_rate as f64 )
        });

        tracing::info!(
            "Opened {}: {} Hz, {} channels, duration {:?}",
            name,
            sample_rate,
            channels,
            duration
        );

        let decoder_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &decoder_opts )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
            duration,
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the duration, if the container reports it.
    pub fn duration( &self ) -> Option<Duration> {
        self.duration
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when the end of the stream is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None ); // EOF
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => {
                    // Recoverable, skip this packet
                    continue;
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            if self.sample_buf.is_none() || self.sample_buf.as_ref().unwrap().capacity() < num_frames {
                self.sample_buf = Some( SampleBuffer::new( num_frames as u64, spec ) );
            }

            let sample_buf = self.sample_buf.as_mut().unwrap();
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples().to_vec() ) );
        }
    }


    /// Rewinds the stream to the beginning.
    ///
    /// Looping playback only ever seeks to the start, so this is the whole
    /// seek surface.
    pub fn rewind( &mut self ) -> Result<(), DecoderError> {
        let seek_to = SeekTo::Time {
            time: Time::from( 0.0 ),
            track_id: Some( self.track_id ),
        };

        self.format_reader
            .seek( SeekMode::Accurate, seek_to )
            .map_err( |e| DecoderError::Rewind( e.to_string() ) )?;

        // Decoder state carries over packets, reset it after the jump
        self.decoder.reset();

        Ok(())
    }
}
