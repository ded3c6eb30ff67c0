// Models module - Database entity representations

pub mod business;
pub mod pass_record;
pub mod promotion;

pub use business::{Business, BusinessSettings};
pub use pass_record::{LoyaltyProgress, PassRecord, ResolveError, ResolvedPass};
pub use promotion::Promotion;
