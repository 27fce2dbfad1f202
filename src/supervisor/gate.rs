// src/supervisor/gate.rs

//! Pre-execution gate for script jobs.
//!
//! A descriptor that asks for a verified signature is only launched after the
//! gate accepts it. The built-in [`DigestGate`] pins each script to a trusted
//! BLAKE3 digest taken from the config: a script whose contents changed, or
//! that has no pinned digest at all, is rejected.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;
use crate::job::JobDescriptor;
use crate::supervisor::launcher::BoxFuture;

/// Verdict of a pre-execution gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    Rejected(String),
}

pub trait PreExecutionGate: Send + Sync {
    fn verify<'a>(&'a self, descriptor: &'a JobDescriptor) -> BoxFuture<'a, GateDecision>;
}

/// Accepts a script only if its BLAKE3 digest matches the pinned one.
#[derive(Debug, Clone)]
pub struct DigestGate {
    fs: Arc<dyn FileSystem>,
}

impl DigestGate {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl PreExecutionGate for DigestGate {
    fn verify<'a>(&'a self, descriptor: &'a JobDescriptor) -> BoxFuture<'a, GateDecision> {
        Box::pin(async move {
            let Some(expected) = descriptor.trusted_digest() else {
                return GateDecision::Rejected("no trusted digest configured".to_string());
            };
            let Some(path) = descriptor.resolved_path() else {
                return GateDecision::Rejected("path is empty".to_string());
            };

            let fs = Arc::clone(&self.fs);
            let hashed = tokio::task::spawn_blocking(move || compute_digest(fs.as_ref(), path)).await;

            match hashed {
                Ok(Ok(actual)) if actual.eq_ignore_ascii_case(expected.trim()) => {
                    debug!(job = %descriptor.key(), "digest verified");
                    GateDecision::Accepted
                }
                Ok(Ok(actual)) => GateDecision::Rejected(format!(
                    "digest mismatch (expected {}, found {actual})",
                    expected.trim()
                )),
                Ok(Err(e)) => GateDecision::Rejected(format!("{e:#}")),
                Err(e) => GateDecision::Rejected(format!("digest task failed: {e}")),
            }
        })
    }
}

/// BLAKE3 hex digest of a file's contents.
pub fn compute_digest(fs: &dyn FileSystem, path: PathBuf) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(&path)
        .with_context(|| format!("opening script for verification: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
