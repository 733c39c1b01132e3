pub mod db;
pub mod identity;
pub mod scorer;

pub use db::DbAdapter;
pub use identity::GoogleIdentityAdapter;
pub use scorer::HttpScorerAdapter;
