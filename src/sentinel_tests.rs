// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `sentinel.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{RedisCluster, RedisClusterSpec};
    use fred::prelude::Value;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_parse_master_addr() {
        let reply = Value::Array(vec![Value::from("10.0.0.5"), Value::from("6379")]);
        assert_eq!(parse_master_addr(reply, "cache1").unwrap(), "10.0.0.5");
    }

    #[test]
    fn test_parse_master_addr_nil_means_no_master() {
        let err = parse_master_addr(Value::Null, "cache1").unwrap_err();
        assert!(matches!(err, DiscoveryError::NoMaster { ref name } if name == "cache1"));
    }

    #[test]
    fn test_parse_master_addr_rejects_empty_array() {
        let err = parse_master_addr(Value::Array(vec![]), "cache1").unwrap_err();
        assert!(matches!(err, DiscoveryError::MalformedReply(_)));
    }

    #[test]
    fn test_count_replica_entries() {
        let replica = Value::Array(vec![Value::from("name"), Value::from("10.0.0.6:6379")]);
        let reply = Value::Array(vec![replica.clone(), replica]);
        assert_eq!(count_replica_entries(reply).unwrap(), 2);
        assert_eq!(count_replica_entries(Value::Array(vec![])).unwrap(), 0);
        assert_eq!(count_replica_entries(Value::Null).unwrap(), 0);
    }

    #[test]
    fn test_count_replica_entries_rejects_scalar() {
        assert!(count_replica_entries(Value::Integer(3)).is_err());
    }

    #[test]
    fn test_endpoint_for_cluster() {
        let cluster = RedisCluster {
            metadata: ObjectMeta {
                name: Some("cache1".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            spec: RedisClusterSpec::default(),
            status: None,
        };

        let endpoint = SentinelEndpoint::for_cluster(&cluster);
        assert_eq!(endpoint.host, "redis-sentinel-cache1.default.svc");
        assert_eq!(endpoint.port, 26379);
        assert_eq!(endpoint.to_string(), "redis-sentinel-cache1.default.svc:26379");
    }
}
