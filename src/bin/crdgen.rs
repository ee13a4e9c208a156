// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `RedisCluster` CRD YAML from the Rust types in src/crd.rs so
//! deploy/crds/ never drifts from the code.
//!
//! Usage:
//!   cargo run --bin crdgen
//!
//! The file is written to deploy/crds/ with a license header and also printed
//! to stdout, so it can be piped straight into `kubectl apply -f -`.

use kube::CustomResourceExt;
use redis_sentinel_operator::crd::RedisCluster;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    let content = render_crd::<RedisCluster>()?;
    let output_path = output_dir.join("redisclusters.crd.yaml");
    fs::write(&output_path, &content)?;

    eprintln!("✓ Generated {}", output_path.display());
    print!("{content}");

    Ok(())
}

fn render_crd<T>() -> Result<String, Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let yaml = serde_yaml::to_string(&T::crd())?;
    Ok(format!("{COPYRIGHT_HEADER}{yaml}"))
}
