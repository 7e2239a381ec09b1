use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::Result;

use crate::tables::DEFAULT_SCAN_WINDOW;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_root: PathBuf,
    pub queue_capacity: usize,
    pub scan_window: usize,
    pub suggest_limit: usize,
    pub job_retention_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bind_raw =
            lookup("MANIFEST_INDEX_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_normalized = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        let bind_addr = bind_normalized
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let data_root = PathBuf::from(
            lookup("MANIFEST_INDEX_DATA_ROOT").unwrap_or_else(|| "/data/manifest".to_string()),
        );

        let queue_capacity = lookup("MANIFEST_INDEX_QUEUE_CAPACITY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(16);

        let scan_window = lookup("MANIFEST_INDEX_SCAN_WINDOW")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SCAN_WINDOW);

        let suggest_limit = lookup("MANIFEST_INDEX_SUGGEST_LIMIT")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(25);

        let job_retention_seconds = lookup("MANIFEST_INDEX_JOB_RETENTION_SECONDS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(60 * 60);

        Self {
            bind_addr,
            data_root,
            queue_capacity,
            scan_window,
            suggest_limit,
            job_retention_seconds,
        }
    }
}
