// marketplace/src/models/mod.rs

//! Database records. Each module pairs a `FromRow` struct with the column
//! list used by its runtime queries and any status rules attached to it.

pub mod harvest;
pub mod listing;
pub mod order;
pub mod payment_method;
pub mod qr_code;
pub mod transaction;
pub mod user;

pub use harvest::{Harvest, HarvestStatus};
pub use listing::{Listing, ListingStatus};
pub use order::{Order, OrderParty, OrderStatus};
pub use payment_method::{PaymentMethod, PaymentMethodKind};
pub use qr_code::QrCode;
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
pub use user::{AccountStatus, User, UserRole};
