use crate::{config, packet, router, store};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] store::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::Error),
    #[error("Router error: {0}")]
    Router(#[from] router::Error),
}
