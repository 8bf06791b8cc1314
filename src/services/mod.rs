pub mod history;
pub mod scoring;
pub mod store;

pub use history::{History, HistoryRecord};
pub use scoring::ScoringService;
pub use store::EntryStore;
