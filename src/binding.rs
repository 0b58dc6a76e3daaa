//! Server selection as seen by an operation: a binding hands out a channel source for a suitable
//! server, avoiding the ones listed as deprioritized when it can.

use crate::{cmap::ChannelSourceHandle, error::Result, sdam::ServerAddress, BoxFuture};

/// Selects servers for read operations.
pub trait ReadBinding: Send + Sync {
    /// Selects a server able to serve reads. Servers in `deprioritized` (the servers a failed
    /// attempt ran on) are only chosen when nothing else is suitable.
    fn get_read_channel_source<'a>(
        &'a self,
        deprioritized: &'a [ServerAddress],
    ) -> BoxFuture<'a, Result<ChannelSourceHandle>>;
}

/// Selects servers for write operations.
pub trait WriteBinding: ReadBinding {
    /// Selects a writable server, treating `deprioritized` as in
    /// [`ReadBinding::get_read_channel_source`].
    fn get_write_channel_source<'a>(
        &'a self,
        deprioritized: &'a [ServerAddress],
    ) -> BoxFuture<'a, Result<ChannelSourceHandle>>;
}
