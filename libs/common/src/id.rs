//! Opaque identifier minting.

use ulid::Ulid;

/// Prefix carried by broker-assigned client ids.
const CLIENT_PREFIX: &str = "cli";

/// Mint the id for a newly admitted client: `cli_` followed by a fresh
/// ULID. Unique for the life of the process.
pub fn client_id() -> String {
    format!("{CLIENT_PREFIX}_{}", Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn client_ids_are_prefixed_ulids() {
        let id = client_id();
        let rest = id.strip_prefix("cli_").expect("cli prefix");
        assert_eq!(rest.len(), 26);
        assert!(rest.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn ids_do_not_collide() {
        let minted: HashSet<String> = (0..128).map(|_| client_id()).collect();
        assert_eq!(minted.len(), 128);
    }
}
