mod customer;
mod gift_card;
mod order;
mod product;
mod referral;
mod subscription;

pub use customer::*;
pub use gift_card::*;
pub use order::*;
pub use product::*;
pub use referral::*;
pub use subscription::*;
