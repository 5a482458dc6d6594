//! Asset identifier lexical classes
//!
//! Three classes of identifier:
//! - base asset: uppercase alphanumerics with interior dashes (`CRD`, `GOLD-1`)
//! - basic asset: a base asset, optionally dotted with a second (`GOLD.RING`)
//! - mint asset: a basic asset suffixed with `:mint`; holding one unit of
//!   `X:mint` is the right to mint `X`

/// Suffix marking a mint asset
pub const MINT_SUFFIX: &str = ":mint";

/// True for a base asset: `[A-Z0-9]` with `-` allowed away from the ends.
pub fn is_base_asset(s: &str) -> bool {
    if s.is_empty() || s.starts_with('-') || s.ends_with('-') {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-')
}

/// True for a basic asset: a base asset or `BASE.BASE`.
pub fn is_basic_asset(s: &str) -> bool {
    match s.split_once('.') {
        None => is_base_asset(s),
        Some((left, right)) => is_base_asset(left) && is_base_asset(right),
    }
}

/// True for a mint asset: a basic asset suffixed with `:mint`.
pub fn is_mint_asset(s: &str) -> bool {
    s.strip_suffix(MINT_SUFFIX).is_some_and(is_basic_asset)
}

/// True for any of the three classes.
pub fn is_valid_asset(s: &str) -> bool {
    is_basic_asset(s) || is_mint_asset(s)
}

/// The mint asset controlling `base`.
pub fn mint_asset_of(base: &str) -> String {
    format!("{base}{MINT_SUFFIX}")
}

/// For a mint asset, the asset it controls.
pub fn minted_asset(mint: &str) -> Option<&str> {
    mint.strip_suffix(MINT_SUFFIX)
}

/// The base component of a basic asset (`GOLD.RING` -> `GOLD`).
pub fn base_of(basic: &str) -> &str {
    basic.split_once('.').map_or(basic, |(left, _)| left)
}
