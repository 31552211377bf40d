pub mod coupons;
pub mod feedback;
pub mod orders;
pub mod registration;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(registration::routes())
        .merge(coupons::routes())
        .merge(orders::routes())
        .merge(feedback::routes())
}
