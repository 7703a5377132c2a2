use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use booking_core::{
    domain::repositories::{
        appointments::AppointmentRepository, counsellors::CounsellorRepository,
        payments::PaymentRepository, students::StudentRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            appointments::AppointmentPostgres, counsellors::CounsellorPostgres,
            payments::PaymentPostgres, students::StudentPostgres,
        },
    },
    notifications::dispatcher::NotificationDispatcher,
    payments::razorpay_client::RazorpayClient,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{
        payment_history::PaymentHistoryUseCase,
        payments::{PaymentGateway, PaymentSettings, PaymentUseCase, VerifyPaymentRequest},
    },
};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub appointment_id: Uuid,
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    gateway: Arc<RazorpayClient>,
    dispatcher: NotificationDispatcher,
    settings: PaymentSettings,
) -> Router {
    let payment_usecase = PaymentUseCase::new(
        Arc::new(AppointmentPostgres::new(Arc::clone(&db_pool))),
        Arc::new(CounsellorPostgres::new(Arc::clone(&db_pool))),
        Arc::new(StudentPostgres::new(Arc::clone(&db_pool))),
        gateway,
        settings,
    )
    .with_notifications(dispatcher);
    let history_usecase = PaymentHistoryUseCase::new(Arc::new(PaymentPostgres::new(db_pool)));

    let payments = Router::new()
        .route("/orders", post(create_order))
        .route("/verify", post(verify_payment))
        .route("/webhook", post(webhook))
        .with_state(Arc::new(payment_usecase));

    let history = Router::new()
        .route("/history/student/:student_id", get(student_history))
        .route("/history/counsellor/:counsellor_id", get(counsellor_history))
        .with_state(Arc::new(history_usecase));

    payments.merge(history)
}

pub async fn create_order<A, C, S, G>(
    State(usecase): State<Arc<PaymentUseCase<A, C, S, G>>>,
    auth: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> impl IntoResponse
where
    A: AppointmentRepository + Send + Sync + 'static,
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    info!(user_id = %auth.user_id, appointment_id = %request.appointment_id, "payments: order request received");
    match usecase
        .create_order(&auth.principal(), request.appointment_id)
        .await
    {
        Ok(order) => Json(order).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn verify_payment<A, C, S, G>(
    State(usecase): State<Arc<PaymentUseCase<A, C, S, G>>>,
    auth: AuthUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> impl IntoResponse
where
    A: AppointmentRepository + Send + Sync + 'static,
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    info!(
        user_id = %auth.user_id,
        appointment_id = %request.appointment_id,
        order_id = %request.order_id,
        payment_id = %request.payment_id,
        "payments: verification request received"
    );
    match usecase.verify_payment(&auth.principal(), request).await {
        Ok(confirmation) => Json(confirmation).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

/// Unauthenticated; the provider signature over the raw body is the credential.
pub async fn webhook<A, C, S, G>(
    State(usecase): State<Arc<PaymentUseCase<A, C, S, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse
where
    A: AppointmentRepository + Send + Sync + 'static,
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("payments: webhook without signature header");
        return AppError::BadRequest(format!("missing {SIGNATURE_HEADER} header")).into_response();
    };

    match usecase.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(?outcome, "payments: webhook handled");
            Json(outcome).into_response()
        }
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn student_history<P>(
    State(usecase): State<Arc<PaymentHistoryUseCase<P>>>,
    auth: AuthUser,
    Path(student_id): Path<Uuid>,
) -> impl IntoResponse
where
    P: PaymentRepository + Send + Sync + 'static,
{
    match usecase.for_student(&auth.principal(), student_id).await {
        Ok(payments) => Json(payments).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn counsellor_history<P>(
    State(usecase): State<Arc<PaymentHistoryUseCase<P>>>,
    auth: AuthUser,
    Path(counsellor_id): Path<Uuid>,
) -> impl IntoResponse
where
    P: PaymentRepository + Send + Sync + 'static,
{
    match usecase
        .for_counsellor(&auth.principal(), counsellor_id)
        .await
    {
        Ok(payments) => Json(payments).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}
