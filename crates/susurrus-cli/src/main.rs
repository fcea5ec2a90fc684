//! Susurrus CLI - Terminal UI ambient sound player

mod cli;

use std::io;
use std::sync::mpsc::{ self, Receiver };
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind, KeyModifiers },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{ Block, Borders, Paragraph },
};

use cli::Args;
use susurrus_core::router::ChannelView;
use susurrus_core::{
    ChannelRegistry, CommandRouter, ControlEvent, CpalBackend, DirAssets, Flow, Snapshot,
};


/// Application state.
struct App {
    router: CommandRouter,
    /// Loop monitors post their completion events here
    completions: Receiver<ControlEvent>,
    should_quit: bool,
}


impl App {
    /// Loads the soundscape set and wires up the router.
    fn new( args: &Args ) -> Result<Self> {
        let assets = DirAssets::new( args.path.clone() )?;
        let registry = ChannelRegistry::load( &assets, &CpalBackend )?;
        tracing::info!( "loaded {} soundscapes from {}", registry.count(), args.path.display() );

        let ( events_tx, events_rx ) = mpsc::channel();

        Ok( Self {
            router: CommandRouter::new( registry, events_tx ),
            completions: events_rx,
            should_quit: false,
        })
    }


    /// Drains queued completion events, in arrival order.
    fn tick( &mut self ) -> Result<()> {
        while let Ok( event ) = self.completions.try_recv() {
            self.apply( event )?;
        }
        Ok(())
    }


    /// Routes one event and records a quit request.
    fn apply( &mut self, event: ControlEvent ) -> Result<()> {
        if self.router.handle( event )? == Flow::Quit {
            self.should_quit = true;
        }
        Ok(())
    }


    /// Translates a key press into a control event.
    fn handle_key( &mut self, code: KeyCode, modifiers: KeyModifiers ) -> Result<()> {
        let event = match code {
            KeyCode::Char( 'q' ) => Some( ControlEvent::Quit ),
            KeyCode::Char( 'c' ) if modifiers.contains( KeyModifiers::CONTROL ) => {
                Some( ControlEvent::Quit )
            }
            KeyCode::Tab => Some( ControlEvent::FocusNext ),
            KeyCode::BackTab => Some( ControlEvent::FocusPrevious ),
            KeyCode::Enter => Some( ControlEvent::Toggle ),
            KeyCode::Char( 'k' ) | KeyCode::Up => Some( ControlEvent::VolumeUp ),
            KeyCode::Char( 'i' ) | KeyCode::Down => Some( ControlEvent::VolumeDown ),
            _ => None,
        };

        if let Some( event ) = event {
            self.apply( event )?;
        }
        Ok(())
    }
}


/// Sends tracing output to a file when requested. The terminal itself is in
/// raw mode, so logs never go to stderr.
fn init_logging( args: &Args ) -> Result<()> {
    if let Some( path ) = &args.log {
        let file = std::fs::File::create( path )?;
        tracing_subscriber::fmt()
            .with_writer( std::sync::Arc::new( file ) )
            .with_ansi( false )
            .init();
    }
    Ok(())
}


fn main() -> Result<()> {
    let args = Args::parse();
    init_logging( &args )?;

    // Load everything before touching the terminal, so asset and decode
    // failures print as ordinary error messages
    let mut app = App::new( &args )?;

    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let result = run( &mut terminal, &mut app );

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    result
}


/// The interaction loop: apply completions, draw, poll input.
fn run( terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App ) -> Result<()> {
    loop {
        app.tick()?;

        terminal.draw( |frame| draw_ui( frame, app ) )?;

        if event::poll( Duration::from_millis( 50 ) )? {
            if let Event::Key( key ) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key( key.code, key.modifiers )?;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &App ) {
    let snapshot = app.router.snapshot();
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Channel tiles
            Constraint::Length( 1 ),  // Help line
        ])
        .split( area );

    let header = Paragraph::new( "  SUSURRUS" )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[ 0 ] );

    draw_channels( frame, &snapshot, chunks[ 1 ] );
    draw_help( frame, &snapshot, chunks[ 2 ] );
}


/// Lays the channel tiles out side by side, focused tile highlighted.
fn draw_channels( frame: &mut Frame, snapshot: &Snapshot, area: Rect ) {
    let count = snapshot.channels.len() as u32;
    let constraints: Vec<Constraint> = snapshot.channels
        .iter()
        .map( |_| Constraint::Ratio( 1, count ) )
        .collect();

    let tiles = Layout::default()
        .direction( Direction::Horizontal )
        .constraints( constraints )
        .split( area );

    for ( idx, channel ) in snapshot.channels.iter().enumerate() {
        draw_channel_tile( frame, channel, idx == snapshot.focus, tiles[ idx ] );
    }
}


fn draw_channel_tile( frame: &mut Frame, channel: &ChannelView, focused: bool, area: Rect ) {
    let border_style = if focused {
        Style::default().fg( Color::Cyan )
    } else {
        Style::default().fg( Color::DarkGray )
    };

    let state = if channel.playing {
        Line::styled( "▶ playing", Style::default().fg( Color::Green ) )
    } else {
        Line::styled( "  stopped", Style::default().fg( Color::DarkGray ) )
    };

    let mut lines = vec![
        Line::from( "" ),
        Line::styled( channel.label.clone(), Style::default().bold() ),
        state,
        Line::from( vec![
            Span::styled( "[", Style::default().fg( Color::Gray ) ),
            Span::styled( volume_meter( channel.volume, 10 ), Style::default().fg( Color::Cyan ) ),
            Span::styled( "]", Style::default().fg( Color::Gray ) ),
        ]),
    ];

    if let Some( duration ) = channel.duration {
        lines.push( Line::styled(
            format_duration( duration ),
            Style::default().fg( Color::DarkGray ),
        ));
    }

    let tile = Paragraph::new( lines )
        .alignment( Alignment::Center )
        .block( Block::default().borders( Borders::ALL ).border_style( border_style ) );
    frame.render_widget( tile, area );
}


fn draw_help( frame: &mut Frame, snapshot: &Snapshot, area: Rect ) {
    let focused = &snapshot.channels[ snapshot.focus ].label;
    let hint = format!(
        " [Tab]Focus [Enter]Play/Pause {} [k]Vol+ [i]Vol- [q]Quit ",
        focused
    );
    let help = Paragraph::new( hint ).style( Style::default().fg( Color::DarkGray ) );
    frame.render_widget( help, area );
}


/// Renders a volume level as a fixed-width block meter.
fn volume_meter( volume: f32, width: usize ) -> String {
    let filled = ( ( volume * width as f32 ).round() as usize ).min( width );
    format!( "{}{}", "█".repeat( filled ), "░".repeat( width - filled ) )
}


/// Formats a duration as M:SS.
fn format_duration( duration: Duration ) -> String {
    let secs = duration.as_secs();
    format!( "{}:{:02}", secs / 60, secs % 60 )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_volume_meter_bounds() {
        assert_eq!( volume_meter( 0.1, 10 ), "█░░░░░░░░░" );
        assert_eq!( volume_meter( 1.0, 10 ), "██████████" );
        assert_eq!( volume_meter( 0.5, 10 ), "█████░░░░░" );
    }


    #[test]
    fn test_format_duration() {
        assert_eq!( format_duration( Duration::from_secs( 90 ) ), "1:30" );
        assert_eq!( format_duration( Duration::from_secs( 7 ) ), "0:07" );
    }
}
