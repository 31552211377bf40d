pub mod coupons;
pub mod feedback;
pub mod gateway;
pub mod notify;
pub mod orders;
pub mod reconcile;
pub mod registration;
