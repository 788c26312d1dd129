//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes. The 4xxx/5xxx codes
//! mirror the HTTP statuses a REST gateway would return.

use jdmatch_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;

/// RPC Error Codes
pub mod code {
    /// 422-equivalent
    pub const VALIDATION_ERROR: i32 = 4000;
    /// 404-equivalent
    pub const NOT_FOUND: i32 = 4001;
    /// 202-equivalent: job exists but is not terminal yet
    pub const NOT_FINISHED: i32 = 4002;
    pub const JOB_FAILED: i32 = 4003;
    pub const CONFLICT: i32 = 4009;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const BROKER_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::NotFinished { job_id, status } => ErrorObjectOwned::owned(
            code::NOT_FINISHED,
            format!("Job {} is not finished yet", job_id),
            Some(json!({ "job_id": job_id, "status": status })),
        ),
        AppError::JobFailed { job_id, error } => ErrorObjectOwned::owned(
            code::JOB_FAILED,
            format!("Job {} failed", job_id),
            Some(json!({ "job_id": job_id, "status": "FAILURE", "error": error })),
        ),
        AppError::Conflict(msg) | AppError::InvalidState(msg) => {
            ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>)
        }
        AppError::Broker(msg) => ErrorObjectOwned::owned(code::BROKER_ERROR, msg, None::<()>),
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Io(e) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>),
        AppError::Execution(e) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>)
        }
        AppError::Config(msg) | AppError::Internal(msg) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(to_rpc_error(AppError::Validation("x".into())).code(), 4000);
        assert_eq!(to_rpc_error(AppError::NotFound("x".into())).code(), 4001);
        assert_eq!(to_rpc_error(AppError::Broker("x".into())).code(), 5001);
        assert_eq!(to_rpc_error(AppError::InvalidState("x".into())).code(), 4009);
    }

    #[test]
    fn test_not_finished_carries_status() {
        let err = to_rpc_error(AppError::NotFinished {
            job_id: "j1".into(),
            status: "STARTED".into(),
        });
        assert_eq!(err.code(), code::NOT_FINISHED);
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["status"], "STARTED");
    }
}
