//! Tree subsystem errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("announcement signature chain contains a loop")]
    AnnouncementLoop,

    #[error("announcement is stale relative to the currently chosen one")]
    AnnouncementStale,

    #[error("announcement signature failed verification")]
    SignatureInvalid,

    #[error("announcement's first signer does not match its claimed root")]
    RootMismatch,

    #[error("announcement's last signer does not match the sending peer")]
    LastSignerMismatch,

    #[error("announcement already carries this node's own signature")]
    AlreadySigned,
}
