use derive_where::derive_where;
use tokio_util::sync::CancellationToken;

use crate::{
    binding::{ReadBinding, WriteBinding},
    cmap::{Channel, ChannelHandle, ChannelSource, ChannelSourceHandle, StreamDescription},
    error::{Error, Result},
    sdam::ServerAddress,
    session::ClientSession,
    trace::RETRY_TRACING_EVENT_TARGET,
};

/// Accessors and channel replacement shared by both contexts.
macro_rules! context_common {
    ($context:ident, $binding:ident, $acquire:ident) => {
        impl<'a> $context<'a> {
            /// Builds a context around handles that were already acquired.
            pub fn from_parts(
                binding: &'a dyn $binding,
                session: &'a mut ClientSession,
                retry_requested: bool,
                channel_source: ChannelSourceHandle,
                channel: ChannelHandle,
                cancellation_token: CancellationToken,
            ) -> Self {
                Self {
                    binding,
                    session,
                    retry_requested,
                    channel_source,
                    channel,
                    cancellation_token,
                }
            }

            /// Selects a server through `binding` and checks a channel out of it.
            pub async fn create(
                binding: &'a dyn $binding,
                session: &'a mut ClientSession,
                retry_requested: bool,
                cancellation_token: CancellationToken,
            ) -> Result<Self> {
                let (channel_source, channel) =
                    acquire(&cancellation_token, binding.$acquire(&[])).await?;
                Ok(Self::from_parts(
                    binding,
                    session,
                    retry_requested,
                    channel_source,
                    channel,
                    cancellation_token,
                ))
            }

            pub fn binding(&self) -> &'a dyn $binding {
                self.binding
            }

            pub fn session(&self) -> &ClientSession {
                &*self.session
            }

            pub fn session_mut(&mut self) -> &mut ClientSession {
                &mut *self.session
            }

            /// Whether the caller allows one retry after a retryable error.
            pub fn retry_requested(&self) -> bool {
                self.retry_requested
            }

            pub fn channel_source(&self) -> &dyn ChannelSource {
                self.channel_source.as_ref()
            }

            pub fn channel(&self) -> &dyn Channel {
                self.channel.as_ref()
            }

            pub fn channel_mut(&mut self) -> &mut dyn Channel {
                self.channel.as_mut()
            }

            /// What is known about the server the current channel is connected to.
            pub fn description(&self) -> &StreamDescription {
                self.channel.description()
            }

            pub fn cancellation_token(&self) -> &CancellationToken {
                &self.cancellation_token
            }

            pub(crate) fn channel_and_session(&mut self) -> (&mut dyn Channel, &mut ClientSession) {
                (self.channel.as_mut(), &mut *self.session)
            }

            /// Fails with a cancellation error once the token was cancelled.
            pub fn check_cancelled(&self) -> Result<()> {
                if self.cancellation_token.is_cancelled() {
                    Err(Error::cancelled())
                } else {
                    Ok(())
                }
            }

            /// Installs a new channel. The previous channel is dropped first.
            pub fn replace_channel(&mut self, channel: ChannelHandle) {
                self.channel = channel;
            }

            /// Installs a new channel source together with a channel checked out of it. The
            /// previous channel is dropped before the previous source.
            pub fn replace_channel_source(
                &mut self,
                channel_source: ChannelSourceHandle,
                channel: ChannelHandle,
            ) {
                self.channel = channel;
                self.channel_source = channel_source;
            }

            /// Selects a server again, avoiding `deprioritized`, and replaces the current handles
            /// with ones for that server. On failure the current handles are kept.
            pub async fn acquire_or_replace_channel(
                &mut self,
                deprioritized: &[ServerAddress],
            ) -> Result<()> {
                let (channel_source, channel) = acquire(
                    &self.cancellation_token,
                    self.binding.$acquire(deprioritized),
                )
                .await?;
                tracing::debug!(
                    target: RETRY_TRACING_EVENT_TARGET,
                    serverHost = channel_source.server_address().host.as_str(),
                    serverPort = channel_source.server_address().port_or_default(),
                    "Acquired replacement channel"
                );
                self.replace_channel_source(channel_source, channel);
                Ok(())
            }
        }
    };
}

/// Holds the binding, session and channel of one retryable read.
#[derive_where(Debug)]
pub struct RetryableReadContext<'a> {
    #[derive_where(skip)]
    binding: &'a dyn ReadBinding,
    session: &'a mut ClientSession,
    retry_requested: bool,
    #[derive_where(skip)]
    channel_source: ChannelSourceHandle,
    #[derive_where(skip)]
    channel: ChannelHandle,
    cancellation_token: CancellationToken,
}

context_common!(RetryableReadContext, ReadBinding, get_read_channel_source);

/// Holds the binding, session and channel of one retryable write.
#[derive_where(Debug)]
pub struct RetryableWriteContext<'a> {
    #[derive_where(skip)]
    binding: &'a dyn WriteBinding,
    session: &'a mut ClientSession,
    retry_requested: bool,
    #[derive_where(skip)]
    channel_source: ChannelSourceHandle,
    #[derive_where(skip)]
    channel: ChannelHandle,
    cancellation_token: CancellationToken,
}

context_common!(RetryableWriteContext, WriteBinding, get_write_channel_source);

/// Awaits server selection and then a channel from the selected server, checking for
/// cancellation before each step.
async fn acquire(
    cancellation_token: &CancellationToken,
    select: impl std::future::Future<Output = Result<ChannelSourceHandle>>,
) -> Result<(ChannelSourceHandle, ChannelHandle)> {
    if cancellation_token.is_cancelled() {
        return Err(Error::cancelled());
    }
    let channel_source = select.await?;
    if cancellation_token.is_cancelled() {
        return Err(Error::cancelled());
    }
    let channel = channel_source.get_channel().await?;
    Ok((channel_source, channel))
}
