//! Command-line argument parsing for Susurrus.

use std::path::PathBuf;

use clap::Parser;


/// Susurrus - an ambient soundscape player for the terminal.
#[derive( Parser, Debug )]
#[command( name = "susurrus" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Directory containing the soundscape audio files.
    #[arg( short, long, default_value = "soundscapes" )]
    pub path: PathBuf,

    /// Write diagnostic logs to this file (stderr would corrupt the UI).
    #[arg( long )]
    pub log: Option<PathBuf>,
}
