//! Contracts for reaching a server: channel sources, channels and the command primitive.

mod channel;
mod command;
mod stream_description;

#[cfg(test)]
mod test;

pub use self::{
    channel::{Channel, ChannelHandle, ChannelSource, ChannelSourceHandle},
    command::{Command, DocumentSequence, RawCommandResponse, ResponseHandling},
    stream_description::StreamDescription,
};
