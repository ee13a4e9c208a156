// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors`

#[cfg(test)]
mod tests {
    use crate::errors::{aggregate, ApiError, StatusAggregateError};

    #[test]
    fn test_predicates() {
        let nf = ApiError::NotFound {
            kind: "Pod".into(),
            name: "redis-master-cache1".into(),
        };
        assert!(nf.is_not_found());
        assert!(!nf.is_already_exists());

        let ae = ApiError::AlreadyExists {
            kind: "Pod".into(),
            name: "redis-master-cache1".into(),
        };
        assert!(ae.is_already_exists());
        assert!(!ae.is_not_found());
        assert_eq!(ae.to_string(), "Pod 'redis-master-cache1' already exists");
    }

    #[test]
    fn test_aggregate_passes_through_single_failures() {
        assert!(aggregate(Ok(()), Ok(())).is_ok());

        let err = aggregate(Err(anyhow::anyhow!("boom")), Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let err = aggregate(Ok(()), Err(anyhow::anyhow!("status"))).unwrap_err();
        assert_eq!(err.to_string(), "status");
    }

    #[test]
    fn test_aggregate_keeps_both_errors() {
        let err = aggregate(
            Err(anyhow::anyhow!("create failed")),
            Err(anyhow::anyhow!("conflict")),
        )
        .unwrap_err();

        let rendered = err.to_string();
        assert!(rendered.contains("create failed"));
        assert!(rendered.contains("conflict"));
        assert!(err.downcast_ref::<StatusAggregateError>().is_some());
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Box::new(kube::core::Status {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: "rejected".to_string(),
            reason: reason.to_string(),
            code,
            metadata: None,
            details: None,
        }))
    }

    #[test]
    fn test_from_kube_classifies_status_codes() {
        let nf = ApiError::from_kube(api_error(404, "NotFound"), "Pod", "p", "delete Pod");
        assert!(nf.is_not_found());

        let exists = ApiError::from_kube(api_error(409, "AlreadyExists"), "Pod", "p", "create Pod");
        assert!(exists.is_already_exists());

        let conflict = ApiError::from_kube(api_error(409, "Conflict"), "RedisCluster", "c", "status");
        assert!(matches!(conflict, ApiError::Conflict { .. }));

        let other = ApiError::from_kube(api_error(500, "InternalError"), "Pod", "p", "create Pod");
        assert!(matches!(other, ApiError::Kube { .. }));
        assert!(other.to_string().starts_with("create Pod failed"));
    }
}
