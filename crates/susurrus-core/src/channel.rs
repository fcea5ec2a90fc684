//! Per-soundscape playback channel
//!
//! A channel pairs one audio handle with the user-visible state the router
//! manipulates: the loop flag and the stepped volume. The `playing` state
//! itself lives on the handle so the loop monitor can observe it without
//! touching the channel.

use std::sync::{ Arc, Weak };
use std::time::Duration;

use crate::backend::AudioSink;


/// Lower volume bound. Matches the step so a channel is never inaudible.
pub const VOLUME_MIN: f32 = 0.1;

/// Upper volume bound.
pub const VOLUME_MAX: f32 = 1.0;

/// Volume change per up/down command.
pub const VOLUME_STEP: f32 = 0.1;


/// Result of a toggle, so the router knows whether to arm a monitor.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Toggled {
    /// Playback started; the channel is now looping.
    Started,

    /// Playback stopped.
    Paused,
}


/// One independently controllable looping audio track.
pub struct PlaybackChannel {
    id: usize,
    label: String,
    /// True if the user deliberately started this track and it should restart
    /// when it finishes naturally. Cleared by pause.
    loop_enabled: bool,
    sink: Arc<dyn AudioSink>,
}


impl PlaybackChannel {
    /// Creates a channel wrapping one audio handle, stopped and at full
    /// volume.
    pub fn new( id: usize, label: impl Into<String>, sink: Arc<dyn AudioSink> ) -> Self {
        sink.set_volume( VOLUME_MAX );
        Self {
            id,
            label: label.into(),
            loop_enabled: false,
            sink,
        }
    }


    /// Stable ordinal assigned at load time.
    pub fn id( &self ) -> usize {
        self.id
    }


    /// Display name.
    pub fn label( &self ) -> &str {
        &self.label
    }


    /// True while audio is actively rendering.
    pub fn is_playing( &self ) -> bool {
        self.sink.is_playing()
    }


    /// True if the channel should restart when it completes naturally.
    pub fn loop_enabled( &self ) -> bool {
        self.loop_enabled
    }


    /// Current volume in [VOLUME_MIN, VOLUME_MAX].
    pub fn volume( &self ) -> f32 {
        self.sink.volume()
    }


    /// Track duration, when known.
    pub fn duration( &self ) -> Option<Duration> {
        self.sink.duration()
    }


    /// Non-owning handle for a loop monitor's watch cycle.
    pub fn probe( &self ) -> Weak<dyn AudioSink> {
        Arc::downgrade( &self.sink )
    }


    /// Starts playback. No-op if already playing.
    pub fn play( &mut self ) {
        self.sink.play();
    }


    /// Stops playback, disables looping, and resets the read position so a
    /// later play() starts from the beginning. No-op if already stopped.
    pub fn pause( &mut self ) {
        if self.sink.is_playing() {
            self.sink.pause();
            self.sink.seek_to_start();
            self.loop_enabled = false;
            tracing::debug!( "{}: paused", self.label );
        }
    }


    /// The primary play/pause command: pauses a playing channel, or starts a
    /// stopped one and marks it to loop.
    pub fn toggle( &mut self ) -> Toggled {
        if self.sink.is_playing() {
            self.pause();
            Toggled::Paused
        } else {
            self.sink.play();
            self.loop_enabled = true;
            tracing::debug!( "{}: started", self.label );
            Toggled::Started
        }
    }


    /// Restarts playback from the beginning, keeping the loop flag. Used
    /// when a loop completion comes in.
    pub fn restart( &mut self ) {
        self.sink.seek_to_start();
        self.sink.play();
        tracing::debug!( "{}: looped", self.label );
    }


    /// Raises the volume one step. Silently holds at the upper bound.
    pub fn volume_up( &mut self ) {
        let volume = ( self.sink.volume() + VOLUME_STEP ).min( VOLUME_MAX );
        self.sink.set_volume( volume );
    }


    /// Lowers the volume one step. Silently holds at the lower bound.
    pub fn volume_down( &mut self ) {
        let volume = ( self.sink.volume() - VOLUME_STEP ).max( VOLUME_MIN );
        self.sink.set_volume( volume );
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::FakeSink;


    fn channel() -> ( PlaybackChannel, Arc<FakeSink> ) {
        let sink = Arc::new( FakeSink::new() );
        let channel = PlaybackChannel::new( 0, "rain", sink.clone() );
        ( channel, sink )
    }


    #[test]
    fn test_play_is_idempotent() {
        let ( mut channel, sink ) = channel();
        channel.play();
        channel.play();
        assert!( channel.is_playing() );
        assert_eq!( sink.play_count(), 1 );
    }


    #[test]
    fn test_pause_when_stopped_is_noop() {
        let ( mut channel, sink ) = channel();
        channel.pause();
        assert!( !channel.is_playing() );
        assert_eq!( sink.seek_count(), 0 );
    }


    #[test]
    fn test_toggle_starts_and_enables_loop() {
        let ( mut channel, _sink ) = channel();
        assert_eq!( channel.toggle(), Toggled::Started );
        assert!( channel.is_playing() );
        assert!( channel.loop_enabled() );
    }


    #[test]
    fn test_toggle_twice_returns_to_stopped_at_start() {
        let ( mut channel, sink ) = channel();
        assert_eq!( channel.toggle(), Toggled::Started );
        assert_eq!( channel.toggle(), Toggled::Paused );
        assert!( !channel.is_playing() );
        assert!( !channel.loop_enabled() );
        // Pause rewound the read position
        assert_eq!( sink.seek_count(), 1 );
    }


    #[test]
    fn test_restart_rewinds_then_plays() {
        let ( mut channel, sink ) = channel();
        channel.toggle();
        sink.finish();
        channel.restart();
        assert!( channel.is_playing() );
        assert!( channel.loop_enabled() );
        assert_eq!( sink.seek_count(), 1 );
    }


    #[test]
    fn test_volume_clamps_at_bounds() {
        let ( mut channel, sink ) = channel();
        sink.set_volume( 0.5 );

        for _ in 0..5 {
            channel.volume_down();
        }
        assert!( ( channel.volume() - VOLUME_MIN ).abs() < 1e-6 );

        for _ in 0..10 {
            channel.volume_up();
        }
        assert!( ( channel.volume() - VOLUME_MAX ).abs() < 1e-6 );
    }
}
