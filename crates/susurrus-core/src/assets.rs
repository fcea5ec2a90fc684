//! Soundscape asset loading
//!
//! A soundscape set is a flat collection of named audio byte streams. The
//! default source is a directory of audio files; the trait keeps the registry
//! independent of where the bytes come from.

use std::fs;
use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Audio file extensions considered part of a soundscape set.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "aiff",
];


/// Errors that can occur while enumerating or reading soundscape assets.
///
/// All of these are fatal at startup: a partially loaded soundscape set is
/// never used.
#[derive( Debug, Error )]
pub enum AssetError {
    #[error( "Soundscape directory not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "No audio files in {0}" )]
    Empty( PathBuf ),

    #[error( "Failed to read {name}: {source}" )]
    Read {
        name: String,
        source: std::io::Error,
    },

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// A source of named audio byte streams.
pub trait AssetSource {
    /// Lists the available asset names in display order.
    fn list( &self ) -> Result<Vec<String>, AssetError>;

    /// Reads the raw bytes of a single asset.
    fn read( &self, name: &str ) -> Result<Vec<u8>, AssetError>;
}


/// Returns true if the path looks like a supported audio file.
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Strips the extension off an asset name for display.
pub fn display_label( name: &str ) -> String {
    Path::new( name )
        .file_stem()
        .map( |s| s.to_string_lossy().to_string() )
        .unwrap_or_else( || name.to_string() )
}


/// Asset source backed by a directory of audio files.
pub struct DirAssets {
    root: PathBuf,
}


impl DirAssets {
    /// Creates an asset source over the given directory.
    pub fn new( root: impl Into<PathBuf> ) -> Result<Self, AssetError> {
        let root = root.into();
        if !root.is_dir() {
            return Err( AssetError::NotFound( root ) );
        }
        Ok( Self { root } )
    }


    /// Returns the directory this source reads from.
    pub fn root( &self ) -> &Path {
        &self.root
    }
}


impl AssetSource for DirAssets {
    fn list( &self ) -> Result<Vec<String>, AssetError> {
        let mut names: Vec<String> = fs::read_dir( &self.root )?
            .filter_map( |entry| entry.ok() )
            .map( |entry| entry.path() )
            .filter( |path| path.is_file() && is_audio_file( path ) )
            .filter_map( |path| {
                path.file_name().map( |n| n.to_string_lossy().to_string() )
            })
            .collect();

        // Name order is display/navigation order.
        names.sort();

        if names.is_empty() {
            return Err( AssetError::Empty( self.root.clone() ) );
        }

        tracing::info!( "Found {} soundscapes in {:?}", names.len(), self.root );
        Ok( names )
    }


    fn read( &self, name: &str ) -> Result<Vec<u8>, AssetError> {
        fs::read( self.root.join( name ) ).map_err( |source| AssetError::Read {
            name: name.to_string(),
            source,
        })
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "rain.mp3" ) ) );
        assert!( is_audio_file( Path::new( "bells.FLAC" ) ) );
        assert!( !is_audio_file( Path::new( "notes.txt" ) ) );
        assert!( !is_audio_file( Path::new( "noext" ) ) );
    }


    #[test]
    fn test_display_label() {
        assert_eq!( display_label( "rain.mp3" ), "rain" );
        assert_eq!( display_label( "night birds.ogg" ), "night birds" );
        assert_eq!( display_label( "noext" ), "noext" );
    }


    #[test]
    fn test_dir_assets_missing_dir() {
        let result = DirAssets::new( "/definitely/not/a/real/dir" );
        assert!( matches!( result, Err( AssetError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_dir_assets_lists_sorted_audio_files() {
        let dir = std::env::temp_dir().join( "susurrus-assets-test" );
        let _ = std::fs::remove_dir_all( &dir );
        std::fs::create_dir_all( &dir ).unwrap();
        std::fs::write( dir.join( "waves.mp3" ), b"b" ).unwrap();
        std::fs::write( dir.join( "bells.mp3" ), b"a" ).unwrap();
        std::fs::write( dir.join( "readme.txt" ), b"x" ).unwrap();

        let assets = DirAssets::new( &dir ).unwrap();
        let names = assets.list().unwrap();
        assert_eq!( names, vec![ "bells.mp3".to_string(), "waves.mp3".to_string() ] );

        assert_eq!( assets.read( "bells.mp3" ).unwrap(), b"a" );
        assert!( matches!(
            assets.read( "missing.mp3" ),
            Err( AssetError::Read { .. } )
        ));

        let _ = std::fs::remove_dir_all( &dir );
    }
}
