//! Wire translation of datastore errors.
//!
//! One table, consulted by every front end, so the same failure carries the
//! same meaning over NETCONF, RESTCONF and SNMP.

use axum::http::StatusCode;

use crate::snmp::ErrorStatus;
use crate::store::{ErrorKind, StoreError};

/// How one [`ErrorKind`] is rendered on each protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireError {
    /// NETCONF `error-type` layer.
    pub error_type: &'static str,
    pub error_tag: &'static str,
    pub error_app_tag: Option<&'static str>,
    pub http_status: StatusCode,
    /// SNMPv2c error-status; v1 agents down-map it.
    pub snmp_status: ErrorStatus,
}

const fn wire(
    error_type: &'static str,
    error_tag: &'static str,
    error_app_tag: Option<&'static str>,
    http_status: StatusCode,
    snmp_status: ErrorStatus,
) -> WireError {
    WireError {
        error_type,
        error_tag,
        error_app_tag,
        http_status,
        snmp_status,
    }
}

pub fn for_kind(kind: ErrorKind) -> WireError {
    use ErrorStatus as S;
    match kind {
        ErrorKind::NotFound => wire("application", "data-missing", None, StatusCode::NOT_FOUND, S::InconsistentName),
        ErrorKind::AlreadyLocked => wire("protocol", "lock-denied", None, StatusCode::CONFLICT, S::ResourceUnavailable),
        ErrorKind::NoCandidateLock => wire(
            "protocol",
            "operation-failed",
            Some("lock-required"),
            StatusCode::CONFLICT,
            S::ResourceUnavailable,
        ),
        ErrorKind::InvalidEdit => wire("application", "invalid-value", None, StatusCode::BAD_REQUEST, S::WrongValue),
        ErrorKind::DataExists => wire("application", "data-exists", None, StatusCode::CONFLICT, S::InconsistentValue),
        ErrorKind::DanglingReference => wire(
            "application",
            "invalid-value",
            Some("instance-required"),
            StatusCode::BAD_REQUEST,
            S::InconsistentValue,
        ),
        ErrorKind::ReferenceConflict => wire("application", "in-use", None, StatusCode::CONFLICT, S::InconsistentValue),
        ErrorKind::CommitConflict => wire(
            "application",
            "operation-failed",
            Some("commit-conflict"),
            StatusCode::CONFLICT,
            S::CommitFailed,
        ),
        ErrorKind::Unavailable => wire(
            "application",
            "resource-denied",
            None,
            StatusCode::SERVICE_UNAVAILABLE,
            S::ResourceUnavailable,
        ),
    }
}

pub fn for_error(err: &StoreError) -> WireError {
    for_kind(err.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ClientId;

    #[test]
    fn test_reference_conflict_is_409_in_use() {
        let w = for_error(&StoreError::ReferenceConflict("qos-profiles/qos-1".into()));
        assert_eq!(w.http_status, StatusCode::CONFLICT);
        assert_eq!(w.error_tag, "in-use");
        assert_eq!(w.snmp_status, ErrorStatus::InconsistentValue);
    }

    #[test]
    fn test_lock_errors() {
        let w = for_error(&StoreError::AlreadyLocked {
            holder: ClientId::netconf(3),
        });
        assert_eq!(w.error_tag, "lock-denied");
        assert_eq!(w.error_type, "protocol");

        let w = for_error(&StoreError::CommitConflict { base: 1, running: 2 });
        assert_eq!(w.error_app_tag, Some("commit-conflict"));
        assert_eq!(w.snmp_status.to_v1(), ErrorStatus::GenErr);
    }

    #[test]
    fn test_client_errors_map_to_4xx() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::AlreadyLocked,
            ErrorKind::NoCandidateLock,
            ErrorKind::InvalidEdit,
            ErrorKind::DataExists,
            ErrorKind::DanglingReference,
            ErrorKind::ReferenceConflict,
            ErrorKind::CommitConflict,
        ];
        for kind in kinds {
            assert!(for_kind(kind).http_status.is_client_error(), "{:?}", kind);
        }
        assert!(for_kind(ErrorKind::Unavailable).http_status.is_server_error());
    }
}
