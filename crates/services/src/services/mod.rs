pub mod challenges;
pub mod config;
pub mod ledger;
pub mod referral_expiry;
pub mod referrals;
pub mod side_effects;

pub use challenges::ChallengeService;
pub use config::Config;
pub use ledger::{CreditLedger, WalletLedger};
pub use referral_expiry::ReferralExpiryService;
pub use referrals::ReferralService;
pub use side_effects::{SideEffectService, SideEffectWorker};
