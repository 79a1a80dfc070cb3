//! C14: the shard-placement hash and hostname matching.
//!
//! A stable rendezvous-hash (highest-random-weight) mapping from
//! `repo_name` to one address in the fleet list. Two shards computing
//! this independently must agree on the owner, and the same shard must
//! agree with itself across restarts — so the hash function must not
//! depend on process-local state (iteration order, `HashMap` seeds) at
//! all; we hash with a fixed-seed FNV-1a variant instead of `DefaultHasher`
//! (whose seed is randomized per-process).

/// FNV-1a, 64-bit. Deterministic across processes and platforms, unlike
/// `std::collections::hash_map::DefaultHasher`.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Pick the address in `addresses` that owns `repo_name`, by rendezvous
/// hashing: the address whose `hash(repo_name, address)` is highest wins.
/// Returns `None` if `addresses` is empty.
pub fn placement_hash<'a>(repo_name: &str, addresses: &'a [String]) -> Option<&'a str> {
    addresses
        .iter()
        .map(|addr| {
            let mut key = Vec::with_capacity(repo_name.len() + addr.len() + 1);
            key.extend_from_slice(repo_name.as_bytes());
            key.push(0);
            key.extend_from_slice(addr.as_bytes());
            (fnv1a_64(&key), addr.as_str())
        })
        .max_by_key(|(score, addr)| (*score, *addr))
        .map(|(_, addr)| addr)
}

/// `true` iff `address` (possibly `host[.domain][:port]`) identifies
/// `hostname`. Matches if the address's first DNS label equals the
/// hostname, or the address with its port stripped equals the hostname
/// exactly — never a plain substring match, so `gitserver-1` must not
/// match `gitserver-10...` (§4.12).
pub fn hostname_matches(address: &str, hostname: &str) -> bool {
    let without_port = address.split(':').next().unwrap_or(address);
    if without_port == hostname {
        return true;
    }
    let first_label = without_port.split('.').next().unwrap_or(without_port);
    first_label == hostname
}

/// `true` iff `repo_name` is owned by `hostname` under `addresses`,
/// combining [`placement_hash`] with [`hostname_matches`] (§4.9 invariant
/// 4: "placement_hash(name, addresses) == hostname ⇔ kept").
pub fn owned_by(repo_name: &str, addresses: &[String], hostname: &str) -> bool {
    match placement_hash(repo_name, addresses) {
        Some(owner) => hostname_matches(owner, hostname),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_is_deterministic_across_calls() {
        let addrs = vec!["gitserver-0".to_string(), "gitserver-1".to_string()];
        let a = placement_hash("github.com/owner/repo", &addrs);
        let b = placement_hash("github.com/owner/repo", &addrs);
        assert_eq!(a, b);
    }

    #[test]
    fn placement_is_order_independent() {
        let a = vec!["gitserver-0".to_string(), "gitserver-1".to_string()];
        let b = vec!["gitserver-1".to_string(), "gitserver-0".to_string()];
        assert_eq!(
            placement_hash("github.com/owner/repo", &a),
            placement_hash("github.com/owner/repo", &b)
        );
    }

    #[test]
    fn empty_addresses_has_no_owner() {
        assert_eq!(placement_hash("x", &[]), None);
    }

    #[test]
    fn hostname_matches_short_form() {
        assert!(hostname_matches(
            "gitserver-0.cluster.local:3178",
            "gitserver-0"
        ));
    }

    #[test]
    fn hostname_matches_bare_equal() {
        assert!(hostname_matches("gitserver-0", "gitserver-0"));
    }

    #[test]
    fn hostname_does_not_substring_match_numeric_suffix() {
        assert!(!hostname_matches(
            "gitserver-10.cluster.local:3178",
            "gitserver-1"
        ));
        assert!(hostname_matches(
            "gitserver-1.cluster.local:3178",
            "gitserver-1"
        ));
    }

    #[test]
    fn distribution_spreads_across_many_addresses() {
        let addrs: Vec<String> = (0..8).map(|i| format!("gitserver-{i}")).collect();
        let mut counts = std::collections::HashMap::new();
        for i in 0..4000 {
            let name = format!("github.com/owner/repo-{i}");
            let owner = placement_hash(&name, &addrs).unwrap();
            *counts.entry(owner.to_string()).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), addrs.len());
        for count in counts.values() {
            assert!(*count > 300, "expected roughly even spread, got {count}");
        }
    }
}
