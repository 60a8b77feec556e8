pub mod achievement;
pub mod challenge;
pub mod participant;
pub mod progress;
pub mod referral;
pub mod side_effect;
pub mod user;
pub mod wallet;
