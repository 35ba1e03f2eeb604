use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// `0x` plus 40 hex characters.
pub const ADDRESS_LEN: usize = 42;

/// Characters of the address shown when a wallet has no label.
const LABEL_PREFIX_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("wallet address is empty")]
    Empty,

    #[error("invalid wallet address {0}: must be 0x followed by 40 hex characters")]
    InvalidFormat(String),

    #[error("wallet {0} is already tracked")]
    Duplicate(String),

    #[error("wallet {0} is not tracked")]
    NotFound(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed wallet file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, WalletError>;

/// Labels that occur more than once.
fn repeated(labels: &[String]) -> HashSet<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(label, _)| label)
        .collect()
}

/// Validate and lowercase a wallet address.
pub fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(WalletError::Empty);
    }
    let valid = address.len() == ADDRESS_LEN
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(WalletError::InvalidFormat(address.to_string()));
    }
    Ok(address.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    #[serde(default)]
    pub label: String,
}

impl Wallet {
    /// The label, or the address prefix when unlabelled.
    pub fn display_label(&self) -> String {
        let label = self.label.trim();
        if label.is_empty() {
            self.address.chars().take(LABEL_PREFIX_LEN).collect()
        } else {
            label.to_string()
        }
    }
}

/// Ordered, case-insensitively unique wallet list. Passed into each scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletList {
    wallets: Vec<Wallet>,
}

impl WalletList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.iter()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        let address = address.trim().to_lowercase();
        self.wallets.iter().any(|w| w.address == address)
    }

    /// Validate, dedupe and append. Returns the stored wallet.
    pub fn add(&mut self, address: &str, label: &str) -> Result<&Wallet> {
        let address = normalize_address(address)?;
        if self.contains(&address) {
            return Err(WalletError::Duplicate(address));
        }
        self.wallets.push(Wallet {
            address,
            label: label.trim().to_string(),
        });
        Ok(&self.wallets[self.wallets.len() - 1])
    }

    /// Remove by address, ignoring case.
    pub fn remove(&mut self, address: &str) -> Result<Wallet> {
        let needle = address.trim().to_lowercase();
        let idx = self
            .wallets
            .iter()
            .position(|w| w.address == needle)
            .ok_or(WalletError::NotFound(needle))?;
        Ok(self.wallets.remove(idx))
    }

    /// Display label per wallet, in list order. Labels shared by several
    /// wallets get the address prefix appended; where the prefixes collide
    /// too, the full address is appended instead.
    pub fn display_labels(&self) -> Vec<String> {
        let labels: Vec<String> = self.wallets.iter().map(Wallet::display_label).collect();
        let shared = repeated(&labels);
        let prefixed: Vec<String> = labels
            .iter()
            .zip(&self.wallets)
            .map(|(label, wallet)| {
                if shared.contains(label.as_str()) {
                    let prefix: String = wallet.address.chars().take(LABEL_PREFIX_LEN).collect();
                    format!("{label} ({prefix})")
                } else {
                    label.clone()
                }
            })
            .collect();
        let still_shared = repeated(&prefixed);
        labels
            .iter()
            .zip(&prefixed)
            .zip(&self.wallets)
            .map(|((label, prefixed), wallet)| {
                if still_shared.contains(prefixed.as_str()) {
                    format!("{label} ({})", wallet.address)
                } else {
                    prefixed.clone()
                }
            })
            .collect()
    }

    /// Build from stored entries. Invalid or duplicate entries are skipped.
    fn from_entries(entries: Vec<Wallet>) -> Self {
        let mut list = Self::new();
        for entry in entries {
            if let Err(e) = list.add(&entry.address, &entry.label) {
                debug!("Skipping stored wallet: {e}");
            }
        }
        list
    }
}

/// On-disk wallet file: a pretty-printed JSON list of `{address, label}`.
/// The legacy format, a list of bare address strings, is read too.
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> WalletError {
        WalletError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn json_err(&self, source: serde_json::Error) -> WalletError {
        WalletError::Json {
            path: self.path.clone(),
            source,
        }
    }

    /// Missing file → empty list.
    pub fn load(&self) -> Result<WalletList> {
        if !self.path.exists() {
            return Ok(WalletList::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        if contents.trim().is_empty() {
            return Ok(WalletList::new());
        }
        let raw: Vec<Value> = serde_json::from_str(&contents).map_err(|e| self.json_err(e))?;
        let entries = raw
            .into_iter()
            .map(|item| match item {
                Value::String(address) => Ok(Wallet {
                    address,
                    label: String::new(),
                }),
                other => serde_json::from_value(other),
            })
            .collect::<std::result::Result<Vec<Wallet>, _>>()
            .map_err(|e| self.json_err(e))?;
        let list = WalletList::from_entries(entries);
        debug!("Loaded {} wallet(s) from {}", list.len(), self.path.display());
        Ok(list)
    }

    pub fn save(&self, wallets: &WalletList) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }
        let contents =
            serde_json::to_string_pretty(&wallets.wallets).map_err(|e| self.json_err(e))?;
        std::fs::write(&self.path, contents).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Load, add, save.
    pub fn add(&self, address: &str, label: &str) -> Result<Wallet> {
        let mut list = self.load()?;
        let wallet = list.add(address, label)?.clone();
        self.save(&list)?;
        info!("Added wallet {} ({})", wallet.address, wallet.display_label());
        Ok(wallet)
    }

    /// Load, remove, save.
    pub fn remove(&self, address: &str) -> Result<Wallet> {
        let mut list = self.load()?;
        let wallet = list.remove(address)?;
        self.save(&list)?;
        info!("Removed wallet {}", wallet.address);
        Ok(wallet)
    }

    /// Copy the store to `dest`.
    pub fn backup(&self, dest: &Path) -> Result<()> {
        let list = self.load()?;
        WalletStore::new(dest).save(&list)
    }
}
