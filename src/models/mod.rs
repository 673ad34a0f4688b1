mod ticker;
mod quote;
mod history;
mod wishlist;
mod holding;
mod news;
mod recommendation;

pub use ticker::{Ticker, TickerError, TickerSet, TimeRange};
pub use quote::{Quote, QuoteView};
pub use history::{bounds_of, HistoricalSeries, PricePoint, SeriesBounds};
pub use wishlist::{all_symbols, AppendWishlistRequest, CreateWishlistRequest, Wishlist};
pub use holding::{Holding, HoldingView};
pub use news::{NewsItem, Sentiment};
pub use recommendation::{Recommendation, RecommendationFilter, RecommendationType, RecommendationView};
