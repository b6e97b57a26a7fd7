pub mod channel;
pub mod config;
pub mod host;
pub mod listener;
pub mod task;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Listener(#[from] listener::ListenerError),

    #[error(transparent)]
    Channel(#[from] channel::ChannelError),

    #[error(transparent)]
    Task(#[from] task::TaskError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Host(#[from] host::HostError),
}
