use serde::{Deserialize, Serialize};

use crate::models::TickerSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wishlist {
    pub id: String,
    pub name: String,
    pub symbols: TickerSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWishlistRequest {
    pub name: String,
    #[serde(default)]
    pub symbols: TickerSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendWishlistRequest {
    pub symbols: TickerSet,
}

/// Union of every wishlist's symbols, first occurrence wins the position.
pub fn all_symbols(wishlists: &[Wishlist]) -> TickerSet {
    wishlists
        .iter()
        .flat_map(|w| w.symbols.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_symbols_is_ordered_union() {
        let lists = vec![
            Wishlist {
                id: "tech".into(),
                name: "Tech Stocks".into(),
                symbols: TickerSet::parse(["INFY", "TCS"]).unwrap(),
            },
            Wishlist {
                id: "mixed".into(),
                name: "Mixed".into(),
                symbols: TickerSet::parse(["TCS", "RELIANCE"]).unwrap(),
            },
        ];
        assert_eq!(all_symbols(&lists).to_csv(), "INFY,TCS,RELIANCE");
    }
}
