use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiResult, AppError};
use crate::models::{AttendanceMode, TicketType};
use crate::services::notify::EventType;
use crate::services::registration::{self, NewRegistration};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/registration", post(register))
}

// POST /api/registration
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[validate(length(min = 1, max = 120, message = "first name is required"))]
    first_name: String,
    #[validate(length(min = 1, max = 120, message = "last name is required"))]
    last_name: String,
    #[validate(email(message = "a valid email is required"))]
    email: String,
    organization: Option<String>,
    role: Option<String>,
    dietary: Option<String>,
    ticket_type: TicketType,
    attendance_mode: Option<AttendanceMode>,
    coupon_code: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let attendee = registration::register(
        &state.db.pool,
        NewRegistration {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            organization: req.organization,
            role: req.role,
            dietary: req.dietary,
            ticket_type: req.ticket_type,
            attendance_mode: req.attendance_mode.unwrap_or(AttendanceMode::InPerson),
            coupon_code: req.coupon_code,
        },
    )
    .await?;

    state.notifier.emit(
        EventType::RegistrationConfirmed,
        json!({
            "attendeeId": attendee.id,
            "email": attendee.email,
            "firstName": attendee.first_name,
            "ticketType": attendee.ticket_type,
            "attendanceMode": attendee.attendance_mode,
        }),
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "attendee": attendee })),
    ))
}
