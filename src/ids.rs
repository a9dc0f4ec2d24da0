use std::sync::{Mutex, OnceLock};

use ulid::{Generator, Ulid};

pub const PAYMENT_PREFIX: &str = "pay";
pub const TRANSACTION_PREFIX: &str = "txn";
pub const ENTRY_PREFIX: &str = "ent";

/// Length of the Crockford base32 token that follows the prefix.
pub const TOKEN_LEN: usize = 26;

static MONOTONIC: OnceLock<Mutex<Generator>> = OnceLock::new();

/// Returns the next ULID token. Tokens are lexicographically monotonic
/// within the process even when generated in the same millisecond.
fn next_token() -> Ulid {
    let generator = MONOTONIC.get_or_init(|| Mutex::new(Generator::new()));
    let mut generator = generator.lock().unwrap_or_else(|e| e.into_inner());
    // The generator only fails when the random component overflows
    // within one millisecond; a fresh ULID keeps uniqueness there.
    generator.generate().unwrap_or_else(|_| Ulid::new())
}

fn prefixed(prefix: &str) -> String {
    format!("{}_{}", prefix, next_token())
}

/// New `pay_`-prefixed payment ID.
pub fn payment_id() -> String {
    prefixed(PAYMENT_PREFIX)
}

/// New `txn_`-prefixed ledger transaction ID.
pub fn transaction_id() -> String {
    prefixed(TRANSACTION_PREFIX)
}

/// New `ent_`-prefixed ledger entry ID.
pub fn entry_id() -> String {
    prefixed(ENTRY_PREFIX)
}
