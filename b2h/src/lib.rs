/// b2h crate contains the full read->pack->format->write pipeline used to turn
/// binary files into C/C++ headers, along with its two leaf utilities.
pub mod cancel;
pub mod convert;
pub mod paths;

/// Contains converter defaults shared with the command line frontend.
pub mod params {
    /// Read buffer granularity, 1MiB.
    pub const CHUNK_SIZE: usize = 1024 * 1024;

    /// Number of source bytes formatted onto each header line.
    pub const BYTES_PER_LINE: usize = 12;
}
