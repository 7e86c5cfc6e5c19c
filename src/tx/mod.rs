//! Payout submission: nonce cache, gas pricing and the payout sender

mod gas;
mod nonce;
mod sender;

pub use gas::GasEstimator;
pub use nonce::NonceCache;
pub use sender::PayoutSender;
