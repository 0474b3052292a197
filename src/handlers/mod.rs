//! The four domain handlers (§4.6–§4.9)

pub mod match_handler;
pub mod player;
pub mod ranking;
pub mod weapon;

pub use match_handler::MatchHandler;
pub use player::PlayerHandler;
pub use ranking::RankingHandler;
pub use weapon::WeaponHandler;
