//! The error taxonomy shared by client and server.
//!
//! The original propagates a bare `int` status where negative values are
//! `-errno`. That convention survives at the wire boundary (every response
//! still carries a plain `status: i32`), but internally both binaries work
//! with this richer enum so `tracing` spans and `?`-propagation read the way
//! the rest of the stack does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("system call failed: {0}")]
    SystemFailure(i32),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("access conflict on path")]
    AccessConflict,

    #[error("lock operation failed")]
    LockFailure,

    #[error("mount registration failed: {0}")]
    RegistrationFailure(String),
}

impl FsError {
    /// Collapses the taxonomy back down to the wire's `-errno` convention.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::TransportFailure(_) => -libc::EIO,
            FsError::SystemFailure(errno) => -errno.abs(),
            FsError::ProtocolViolation(_) => -libc::EMFILE,
            FsError::AccessConflict => -libc::EACCES,
            FsError::LockFailure => -libc::EAGAIN,
            FsError::RegistrationFailure(_) => -libc::EIO,
        }
    }

    /// Rebuilds an error from a wire status code, for the client side of a
    /// call that came back negative.
    pub fn from_errno(status: i32) -> Self {
        FsError::SystemFailure(status.abs())
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => FsError::SystemFailure(errno),
            None => FsError::TransportFailure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_failure_round_trips_through_errno() {
        let err = FsError::SystemFailure(libc::ENOENT);
        assert_eq!(err.to_errno(), -libc::ENOENT);
    }

    #[test]
    fn access_conflict_maps_to_eacces() {
        assert_eq!(FsError::AccessConflict.to_errno(), -libc::EACCES);
    }
}
