use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::sdam::{ServerAddress, ServerType};

const DEFAULT_MAX_BSON_OBJECT_SIZE: i64 = 16 * 1024 * 1024;
const DEFAULT_MAX_WRITE_BATCH_SIZE: i64 = 100_000;
const DEFAULT_MAX_MESSAGE_SIZE_BYTES: i32 = 48_000_000;

/// What the execution layer knows about the server on the other end of a channel.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(default))]
#[non_exhaustive]
pub struct StreamDescription {
    /// The address of the server.
    pub server_address: ServerAddress,

    /// The type of the server when the handshake occurred.
    pub initial_server_type: ServerType,

    /// The maximum wire version that the server understands.
    #[builder(setter(strip_option))]
    pub max_wire_version: Option<i32>,

    /// How long sessions started on this server stay alive without activity. Servers that do not
    /// report it do not support sessions.
    #[builder(setter(strip_option))]
    pub logical_session_timeout: Option<Duration>,

    /// The maximum size of a single document.
    #[builder(default = DEFAULT_MAX_BSON_OBJECT_SIZE)]
    pub max_bson_object_size: i64,

    /// The maximum number of statements that can be sent in one write command.
    #[builder(default = DEFAULT_MAX_WRITE_BATCH_SIZE)]
    pub max_write_batch_size: i64,

    /// The maximum permitted size of a wire protocol message.
    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE_BYTES)]
    pub max_message_size_bytes: i32,
}

impl StreamDescription {
    /// Whether this server can execute retryable writes: load balancers always can, other
    /// deployments need session support and must not be standalone.
    pub fn supports_retryable_writes(&self) -> bool {
        if self.initial_server_type == ServerType::LoadBalancer {
            return true;
        }
        self.initial_server_type != ServerType::Standalone
            && self.logical_session_timeout.is_some()
            && self.max_wire_version.is_some_and(|version| version >= 6)
    }

    pub(crate) fn max_write_batch_count(&self) -> usize {
        usize::try_from(self.max_write_batch_size).unwrap_or(usize::MAX)
    }

    pub(crate) fn max_message_size(&self) -> usize {
        usize::try_from(self.max_message_size_bytes).unwrap_or(usize::MAX)
    }

    /// A replica set primary on wire version 8.
    #[cfg(test)]
    pub(crate) fn new_testing() -> Self {
        Self::with_wire_version(8)
    }

    #[cfg(test)]
    pub(crate) fn with_wire_version(max_wire_version: i32) -> Self {
        Self::builder()
            .initial_server_type(ServerType::RsPrimary)
            .max_wire_version(max_wire_version)
            .logical_session_timeout(Duration::from_secs(30 * 60))
            .build()
    }
}
