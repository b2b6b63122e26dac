use std::fs;
use std::path::PathBuf;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    address: Address,
}

/// Persists the connected wallet address so a returning user reconnects
/// without going through the explicit connect flow again.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Option<Address> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let cached: CachedSession = serde_json::from_str(&raw).ok()?;
        Some(cached.address)
    }

    pub fn store(&self, address: Address) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("creating session directory")?;
        }
        let raw = serde_json::to_string(&CachedSession { address })?;
        fs::write(&self.path, raw).context("writing session file")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("removing session file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> SessionStore {
        let path = std::env::temp_dir()
            .join(format!("fund_console_session_{}_{}.json", tag, std::process::id()));
        let _ = fs::remove_file(&path);
        SessionStore::new(path)
    }

    #[test]
    fn test_round_trip() {
        let store = temp_store("round_trip");
        let address: Address = "0x589A698b7b7dA0Bec545177D3963A2741105C7C9"
            .parse()
            .unwrap();

        assert_eq!(store.load(), None);
        store.store(address).unwrap();
        assert_eq!(store.load(), Some(address));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = temp_store("clear");
        store.clear().unwrap();
        store.clear().unwrap();
    }
}
