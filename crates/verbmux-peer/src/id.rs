use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::error::{PeerError, Result};

/// Generate a random id of `length` symbols drawn from `alphabet`.
///
/// Bytes come from the operating system RNG. Bytes that would bias the
/// distribution towards the start of the alphabet are rejected.
pub fn generate_id(length: usize, alphabet: &str) -> Result<String> {
    let symbols: Vec<char> = alphabet.chars().collect();
    if length == 0 {
        return Err(PeerError::IdGeneration("id length must be positive".into()));
    }
    if symbols.is_empty() || symbols.len() > 256 {
        return Err(PeerError::IdGeneration(format!(
            "alphabet must hold 1..=256 symbols, got {}",
            symbols.len()
        )));
    }

    let zone = 256 - (256 % symbols.len());
    let mut id = String::with_capacity(length);
    let mut produced = 0usize;
    let mut buf = [0u8; 64];

    while produced < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| PeerError::IdGeneration(e.to_string()))?;
        for byte in buf.iter().map(|b| *b as usize) {
            if byte >= zone {
                continue;
            }
            id.push(symbols[byte % symbols.len()]);
            produced += 1;
            if produced == length {
                break;
            }
        }
    }

    Ok(id)
}
