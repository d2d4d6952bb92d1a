//! Alias table
//!
//! Resolves a command-line target (a hardware address or an alias prefix)
//! to a device handle using `~/.known_bs21`, a plain-text table of
//! `ADDRESS  PIN  alias` lines. Aliases match case-insensitively by
//! prefix; ambiguous prefixes are an error rather than a guess.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use blueswitch_core::device::{BdAddr, DeviceHandle};

/// One parsed alias table line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    /// Hardware address
    pub address: BdAddr,
    /// PIN recorded for the device
    pub pin: String,
    /// Human-readable name; the rest of the line, spaces included
    pub alias: String,
}

/// Default table location under the home directory
pub fn default_table_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".known_bs21"))
}

/// Load the alias table, returning an empty list when the file is absent
pub fn load(path: Option<&Path>) -> Result<Vec<AliasEntry>> {
    let path = match path.map(Path::to_path_buf).or_else(default_table_path) {
        Some(path) if path.is_file() => path,
        _ => return Ok(Vec::new()),
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading alias table {}", path.display()))?;
    Ok(parse_table(&text))
}

/// Parse table text, skipping blank lines, comments and malformed entries
pub fn parse_table(text: &str) -> Vec<AliasEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((addr, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(address) = addr.parse::<BdAddr>() else {
            continue;
        };
        let rest = rest.trim_start();
        let (pin, alias) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        if pin.len() != 4 || !pin.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        entries.push(AliasEntry {
            address,
            pin: pin.to_string(),
            alias: alias.trim().to_string(),
        });
    }
    entries
}

/// Resolve a target (address or alias prefix) to a device handle.
/// An explicit PIN always wins over the table's PIN.
pub fn resolve(
    target: &str,
    pin_override: Option<&str>,
    entries: &[AliasEntry],
) -> Result<DeviceHandle> {
    if let Ok(address) = target.parse::<BdAddr>() {
        let entry = entries.iter().find(|e| e.address == address);
        let pin = match (pin_override, entry) {
            (Some(pin), _) => pin,
            (None, Some(entry)) => &entry.pin,
            (None, None) => bail!(
                "no PIN given for {address} and no alias table entry to take one from"
            ),
        };
        let mut handle = DeviceHandle::new(target, pin)?;
        if let Some(entry) = entry {
            if !entry.alias.is_empty() {
                handle = handle.with_alias(entry.alias.clone());
            }
        }
        return Ok(handle);
    }

    let needle = target.to_lowercase();
    let matches: Vec<&AliasEntry> = entries
        .iter()
        .filter(|e| e.alias.to_lowercase().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [] => bail!("no alias matching '{target}' in the alias table"),
        [entry] => {
            let pin = pin_override.unwrap_or(&entry.pin);
            Ok(DeviceHandle::new(&entry.address.to_string(), pin)?
                .with_alias(entry.alias.clone()))
        }
        many => {
            let names: Vec<&str> = many.iter().map(|e| e.alias.as_str()).collect();
            bail!(
                "alias '{target}' is ambiguous; candidates: {}",
                names.join(", ")
            )
        }
    }
}
