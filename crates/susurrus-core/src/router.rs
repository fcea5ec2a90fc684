//! Command routing
//!
//! The single-threaded dispatcher at the center of the player. Key events and
//! monitor completions arrive on one queue and are applied strictly in
//! arrival order against the focused channel, so no two transitions ever race
//! on the same channel's state.

use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::channel::Toggled;
use crate::cursor::FocusCursor;
use crate::monitor;
use crate::registry::{ ChannelRegistry, RegistryError };


/// Events the router consumes: translated key presses plus monitor
/// completions.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ControlEvent {
    /// End the interaction loop and release every channel.
    Quit,

    /// Move focus to the next channel, wrapping.
    FocusNext,

    /// Move focus to the previous channel, wrapping.
    FocusPrevious,

    /// Play/pause the focused channel.
    Toggle,

    /// Raise the focused channel's volume one step.
    VolumeUp,

    /// Lower the focused channel's volume one step.
    VolumeDown,

    /// A monitor observed the channel's audio reaching its natural end.
    Completion( usize ),
}


/// Whether the interaction loop should keep running after an event.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Flow {
    Continue,
    Quit,
}


/// Read-only state of one channel for rendering.
#[derive( Debug, Clone )]
pub struct ChannelView {
    pub label: String,
    pub playing: bool,
    pub volume: f32,
    pub duration: Option<Duration>,
}


/// Read-only frame input for the renderer.
#[derive( Debug, Clone )]
pub struct Snapshot {
    pub focus: usize,
    pub channels: Vec<ChannelView>,
}


/// Routes control events to the focused channel and manages loop monitors.
pub struct CommandRouter {
    registry: ChannelRegistry,
    cursor: FocusCursor,
    /// Queue handle given to each armed monitor; completions come back to
    /// the caller's receiver and are fed into handle()
    events: Sender<ControlEvent>,
}


impl CommandRouter {
    /// Creates a router over a loaded registry. Monitors post their
    /// completion events into `events`.
    pub fn new( registry: ChannelRegistry, events: Sender<ControlEvent> ) -> Self {
        let cursor = FocusCursor::new( registry.count() );
        Self {
            registry,
            cursor,
            events,
        }
    }


    /// Applies one event. Errors only surface on invariant violations
    /// (an index outside the registry).
    pub fn handle( &mut self, event: ControlEvent ) -> Result<Flow, RegistryError> {
        match event {
            ControlEvent::Quit => {
                self.registry.release_all();
                return Ok( Flow::Quit );
            }
            ControlEvent::FocusNext => {
                self.cursor.next();
            }
            ControlEvent::FocusPrevious => {
                self.cursor.previous();
            }
            ControlEvent::Toggle => {
                let index = self.cursor.current();
                let channel = self.registry.get_mut( index )?;
                if channel.toggle() == Toggled::Started {
                    let probe = channel.probe();
                    monitor::arm( probe, index, self.events.clone() );
                }
            }
            ControlEvent::VolumeUp => {
                self.registry.get_mut( self.cursor.current() )?.volume_up();
            }
            ControlEvent::VolumeDown => {
                self.registry.get_mut( self.cursor.current() )?.volume_down();
            }
            ControlEvent::Completion( id ) => {
                self.handle_completion( id )?;
            }
        }

        Ok( Flow::Continue )
    }


    /// Decides whether a completion restarts its channel.
    ///
    /// A completion is acted on only when the channel is still marked to
    /// loop and has actually stopped rendering. Everything else is a stale
    /// event from a monitor that outlived its usefulness: the user paused
    /// the channel (loop flag is off) or paused and already restarted it
    /// (audio is rendering again under a fresh monitor). Discarding those is
    /// what keeps a paused track from being resurrected, with no cross-task
    /// cancellation needed.
    fn handle_completion( &mut self, id: usize ) -> Result<(), RegistryError> {
        let channel = self.registry.get_mut( id )?;

        if !channel.loop_enabled() || channel.is_playing() {
            tracing::debug!( "Discarding stale completion for channel {}", id );
            return Ok(());
        }

        channel.restart();
        let probe = channel.probe();
        monitor::arm( probe, id, self.events.clone() );
        Ok(())
    }


    /// Current focus index.
    pub fn focus( &self ) -> usize {
        self.cursor.current()
    }


    /// Builds the read-only frame input for the renderer.
    pub fn snapshot( &self ) -> Snapshot {
        Snapshot {
            focus: self.cursor.current(),
            channels: self.registry
                .iter()
                .map( |channel| ChannelView {
                    label: channel.label().to_string(),
                    playing: channel.is_playing(),
                    volume: channel.volume(),
                    duration: channel.duration(),
                })
                .collect(),
        }
    }
}


#[cfg( test )]
mod tests {
    use std::sync::mpsc::{ self, Receiver };
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::backend::AudioSink;
    use crate::registry::ChannelRegistry;
    use crate::testing::{ FakeBackend, FakeSink, MemoryAssets };


    const RECV_TIMEOUT: Duration = Duration::from_secs( 2 );


    fn router() -> ( CommandRouter, Receiver<ControlEvent>, Vec<Arc<FakeSink>> ) {
        let backend = FakeBackend::new();
        let assets = MemoryAssets::new( &[ "rain.mp3", "bells.mp3" ] );
        let registry = ChannelRegistry::load( &assets, &backend ).unwrap();
        let sinks = backend.sinks();
        let ( tx, rx ) = mpsc::channel();
        ( CommandRouter::new( registry, tx ), rx, sinks )
    }


    #[test]
    fn test_focus_navigation_wraps_both_ways() {
        let ( mut router, _rx, _sinks ) = router();
        assert_eq!( router.focus(), 0 );

        router.handle( ControlEvent::FocusNext ).unwrap();
        assert_eq!( router.focus(), 1 );
        router.handle( ControlEvent::FocusNext ).unwrap();
        assert_eq!( router.focus(), 0 );

        router.handle( ControlEvent::FocusPrevious ).unwrap();
        assert_eq!( router.focus(), 1 );
    }


    #[test]
    fn test_volume_commands_affect_only_focused_channel() {
        let ( mut router, _rx, sinks ) = router();
        sinks[ 0 ].set_volume( 0.5 );
        sinks[ 1 ].set_volume( 0.5 );

        for _ in 0..5 {
            router.handle( ControlEvent::VolumeDown ).unwrap();
        }
        assert!( ( sinks[ 0 ].volume() - 0.1 ).abs() < 1e-6 );
        assert!( ( sinks[ 1 ].volume() - 0.5 ).abs() < 1e-6 );

        for _ in 0..10 {
            router.handle( ControlEvent::VolumeUp ).unwrap();
        }
        assert!( ( sinks[ 0 ].volume() - 1.0 ).abs() < 1e-6 );
    }


    #[test]
    fn test_toggle_starts_focused_channel_and_arms_monitor() {
        let ( mut router, rx, sinks ) = router();
        router.handle( ControlEvent::Toggle ).unwrap();
        assert!( sinks[ 0 ].is_playing() );

        // The armed monitor reports when playback ends naturally
        sinks[ 0 ].finish();
        assert_eq!(
            rx.recv_timeout( RECV_TIMEOUT ).unwrap(),
            ControlEvent::Completion( 0 )
        );
    }


    #[test]
    fn test_completion_restarts_looping_channel_and_rearms() {
        let ( mut router, rx, sinks ) = router();
        router.handle( ControlEvent::Toggle ).unwrap();

        sinks[ 0 ].finish();
        let event = rx.recv_timeout( RECV_TIMEOUT ).unwrap();
        router.handle( event ).unwrap();

        assert!( sinks[ 0 ].is_playing() );
        assert_eq!( sinks[ 0 ].seek_count(), 1 );

        // A fresh monitor was armed: the next natural end reports again
        sinks[ 0 ].finish();
        assert_eq!(
            rx.recv_timeout( RECV_TIMEOUT ).unwrap(),
            ControlEvent::Completion( 0 )
        );
    }


    #[test]
    fn test_stale_completion_leaves_paused_channel_stopped() {
        let ( mut router, _rx, sinks ) = router();
        router.handle( ControlEvent::Toggle ).unwrap();
        // User pauses before the monitor observes anything
        router.handle( ControlEvent::Toggle ).unwrap();
        assert!( !sinks[ 0 ].is_playing() );
        let seeks_after_pause = sinks[ 0 ].seek_count();

        // The stale completion from the first monitor arrives late
        router.handle( ControlEvent::Completion( 0 ) ).unwrap();
        assert!( !sinks[ 0 ].is_playing() );
        assert_eq!( sinks[ 0 ].seek_count(), seeks_after_pause );
    }


    #[test]
    fn test_stale_completion_ignores_restarted_channel() {
        let ( mut router, _rx, sinks ) = router();
        router.handle( ControlEvent::Toggle ).unwrap();
        router.handle( ControlEvent::Toggle ).unwrap();
        // User starts the channel again; it is playing under a new monitor
        router.handle( ControlEvent::Toggle ).unwrap();
        let seeks_before = sinks[ 0 ].seek_count();

        router.handle( ControlEvent::Completion( 0 ) ).unwrap();
        // The late event must not rewind the freshly running playback
        assert!( sinks[ 0 ].is_playing() );
        assert_eq!( sinks[ 0 ].seek_count(), seeks_before );
    }


    #[test]
    fn test_completion_for_invalid_index_is_invariant_violation() {
        let ( mut router, _rx, _sinks ) = router();
        assert!( matches!(
            router.handle( ControlEvent::Completion( 9 ) ),
            Err( RegistryError::IndexOutOfRange { index: 9, count: 2 } )
        ));
    }


    #[test]
    fn test_quit_stops_everything() {
        let ( mut router, _rx, sinks ) = router();
        router.handle( ControlEvent::Toggle ).unwrap();

        let flow = router.handle( ControlEvent::Quit ).unwrap();
        assert_eq!( flow, Flow::Quit );
        assert!( !sinks[ 0 ].is_playing() );
        assert!( !sinks[ 1 ].is_playing() );
    }


    #[test]
    fn test_snapshot_reflects_channel_state() {
        let ( mut router, _rx, _sinks ) = router();
        router.handle( ControlEvent::FocusNext ).unwrap();
        router.handle( ControlEvent::Toggle ).unwrap();

        let snapshot = router.snapshot();
        assert_eq!( snapshot.focus, 1 );
        assert_eq!( snapshot.channels.len(), 2 );
        assert_eq!( snapshot.channels[ 0 ].label, "rain" );
        assert!( !snapshot.channels[ 0 ].playing );
        assert!( snapshot.channels[ 1 ].playing );
    }
}
