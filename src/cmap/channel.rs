use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    sdam::ServerAddress,
    BoxFuture,
};

/// An exclusively owned connection to one server, checked out of a pool.
///
/// Dropping the handle returns the connection.
pub trait Channel: Send {
    /// What the handshake reported about the server on the other end.
    fn description(&self) -> &StreamDescription;

    /// Sends a command and waits for its reply. Returns `None` only when the command's
    /// `response_handling` is [`ResponseHandling::Ignore`](crate::cmap::ResponseHandling::Ignore).
    fn command(&mut self, command: Command) -> BoxFuture<'_, Result<Option<RawCommandResponse>>>;
}

/// A source of channels to a single, already selected server.
pub trait ChannelSource: Send + Sync {
    /// The server every channel of this source connects to.
    fn server_address(&self) -> &ServerAddress;

    /// Checks a channel out of the server's pool.
    fn get_channel(&self) -> BoxFuture<'_, Result<ChannelHandle>>;

    /// Creates another handle on the same server, e.g. for a cursor that outlives the operation
    /// that created it.
    fn fork(&self) -> ChannelSourceHandle;
}

pub type ChannelHandle = Box<dyn Channel>;

pub type ChannelSourceHandle = Box<dyn ChannelSource>;
