pub mod attendee;
pub mod coupon;
pub mod feedback;
pub mod order;

pub use attendee::{AttendanceMode, Attendee, PaymentStatus, TicketType};
pub use coupon::{Coupon, DiscountType};
pub use feedback::{AbandonReason, ExitFeedback};
pub use order::{amount_due, NewPaymentOrder, PaymentOrder};
