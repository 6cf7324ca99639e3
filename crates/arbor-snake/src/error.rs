//! Virtual-snake subsystem errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnakeError {
    #[error("pathfind signature chain contains a loop")]
    PathfindLoop,

    #[error("pathfind signature failed verification")]
    PathfindSignatureInvalid,

    #[error("no installed snake entry routes to the requested key")]
    NoRoute,
}
