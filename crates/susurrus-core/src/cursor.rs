//! Focus cursor
//!
//! Tracks which channel the play/pause/volume commands address. The registry
//! length is fixed after load, so the wraparound arithmetic lives here as one
//! tested unit instead of being re-derived in every input handler.


/// Cyclic cursor over a fixed-length channel list.
#[derive( Debug, Clone, Copy )]
pub struct FocusCursor {
    index: usize,
    len: usize,
}


impl FocusCursor {
    /// Creates a cursor over `len` channels, focused on the first.
    ///
    /// `len` is at least 1 once the registry has loaded.
    pub fn new( len: usize ) -> Self {
        debug_assert!( len >= 1 );
        Self { index: 0, len }
    }


    /// The focused channel index, always in [0, len).
    pub fn current( &self ) -> usize {
        self.index
    }


    /// Advances focus by one, wrapping to the first channel after the last.
    pub fn next( &mut self ) {
        self.index = ( self.index + 1 ) % self.len;
    }


    /// Moves focus back by one, wrapping to the last channel from the first.
    pub fn previous( &mut self ) {
        self.index = ( self.index + self.len - 1 ) % self.len;
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_next_wraps_after_last() {
        let mut cursor = FocusCursor::new( 3 );
        cursor.next();
        cursor.next();
        assert_eq!( cursor.current(), 2 );
        cursor.next();
        assert_eq!( cursor.current(), 0 );
    }


    #[test]
    fn test_next_n_times_returns_to_origin() {
        for n in 1..=9 {
            let mut cursor = FocusCursor::new( n );
            for _ in 0..n {
                cursor.next();
            }
            assert_eq!( cursor.current(), 0, "length {}", n );
        }
    }


    #[test]
    fn test_previous_wraps_to_last() {
        let mut cursor = FocusCursor::new( 2 );
        cursor.previous();
        assert_eq!( cursor.current(), 1 );
        cursor.previous();
        assert_eq!( cursor.current(), 0 );
    }


    #[test]
    fn test_single_channel_stays_put() {
        let mut cursor = FocusCursor::new( 1 );
        cursor.next();
        cursor.previous();
        assert_eq!( cursor.current(), 0 );
    }
}
