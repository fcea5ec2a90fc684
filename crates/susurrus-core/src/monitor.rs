//! Loop completion monitor
//!
//! One watcher per playing channel. It polls the channel's handle until the
//! audio stops rendering, posts a single completion event into the router's
//! queue, and exits. Whether the channel restarts is the router's decision;
//! the monitor never mutates anything.

use std::sync::mpsc::Sender;
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use crate::backend::AudioSink;
use crate::router::ControlEvent;


/// Time between is_playing polls. A tuning knob, not a semantic one: it only
/// bounds how late a completion is noticed.
pub const POLL_INTERVAL: Duration = Duration::from_millis( 2 );


/// Arms a single-shot monitor for the channel with the given id.
///
/// The probe is non-owning: if the channel's resource is released while the
/// monitor is still polling, the failed upgrade counts as "not playing" and
/// the monitor completes instead of faulting. A failed send means the router
/// is gone (shutdown) and is ignored.
pub fn arm( probe: Weak<dyn AudioSink>, id: usize, events: Sender<ControlEvent> ) {
    thread::spawn( move || {
        loop {
            match probe.upgrade() {
                Some( sink ) if sink.is_playing() => thread::sleep( POLL_INTERVAL ),
                _ => break,
            }
        }

        tracing::trace!( "Monitor for channel {} observed completion", id );
        let _ = events.send( ControlEvent::Completion( id ) );
    });
}


#[cfg( test )]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;

    use super::*;
    use crate::testing::FakeSink;


    const RECV_TIMEOUT: Duration = Duration::from_secs( 2 );


    #[test]
    fn test_emits_one_completion_when_playback_stops() {
        let sink: Arc<FakeSink> = Arc::new( FakeSink::new() );
        sink.play();

        let ( tx, rx ) = mpsc::channel();
        arm( Arc::downgrade( &( Arc::clone( &sink ) as Arc<dyn AudioSink> ) ), 7, tx );

        // Still playing: no event yet
        assert!( rx.recv_timeout( Duration::from_millis( 20 ) ).is_err() );

        sink.finish();
        assert_eq!(
            rx.recv_timeout( RECV_TIMEOUT ).unwrap(),
            ControlEvent::Completion( 7 )
        );

        // Single-shot: nothing further arrives
        assert!( rx.recv_timeout( Duration::from_millis( 20 ) ).is_err() );
    }


    #[test]
    fn test_released_sink_counts_as_completed() {
        let sink: Arc<FakeSink> = Arc::new( FakeSink::new() );
        sink.play();

        let ( tx, rx ) = mpsc::channel();
        arm( Arc::downgrade( &( Arc::clone( &sink ) as Arc<dyn AudioSink> ) ), 3, tx );

        drop( sink );
        assert_eq!(
            rx.recv_timeout( RECV_TIMEOUT ).unwrap(),
            ControlEvent::Completion( 3 )
        );
    }
}
