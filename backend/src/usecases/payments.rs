use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use booking_core::{
    domain::{
        entities::{appointments::AppointmentEntity, payments::PaymentEntity},
        repositories::{
            appointments::AppointmentRepository, counsellors::CounsellorRepository,
            students::StudentRepository,
        },
        value_objects::{
            appointments::{
                AppointmentPatch, ConfirmationOutcome, ConfirmationSource, OrderBinding,
                PaymentDetails,
            },
            enums::payment_statuses::PaymentStatus,
            principal::Principal,
        },
    },
    notifications::{
        dispatcher::NotificationDispatcher,
        templates::{ConfirmationContext, confirmation_emails},
    },
    payments::razorpay_client::{
        RazorpayClient, RazorpayOrder, RazorpayPayment, RazorpayWebhookEvent,
        appointment_id_from_receipt, receipt_for,
    },
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ReasonedError;

/// Payment provider operations the state machine depends on.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PaymentGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: String,
        receipt: String,
    ) -> Result<RazorpayOrder>;
    async fn fetch_order(&self, order_id: String) -> Result<RazorpayOrder>;
    async fn fetch_payment(&self, payment_id: String) -> Result<RazorpayPayment>;
    async fn capture_payment(
        &self,
        payment_id: String,
        amount_minor: i64,
        currency: String,
    ) -> Result<RazorpayPayment>;
    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str)
    -> Result<()>;
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str)
    -> Result<RazorpayWebhookEvent>;
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: String,
        receipt: String,
    ) -> Result<RazorpayOrder> {
        RazorpayClient::create_order(self, amount_minor, &currency, &receipt).await
    }

    async fn fetch_order(&self, order_id: String) -> Result<RazorpayOrder> {
        RazorpayClient::fetch_order(self, &order_id).await
    }

    async fn fetch_payment(&self, payment_id: String) -> Result<RazorpayPayment> {
        RazorpayClient::fetch_payment(self, &payment_id).await
    }

    async fn capture_payment(
        &self,
        payment_id: String,
        amount_minor: i64,
        currency: String,
    ) -> Result<RazorpayPayment> {
        RazorpayClient::capture_payment(self, &payment_id, amount_minor, &currency).await
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<()> {
        RazorpayClient::verify_payment_signature(self, order_id, payment_id, signature)
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<RazorpayWebhookEvent> {
        RazorpayClient::verify_webhook_signature(self, payload, signature)
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("appointment not found")]
    AppointmentNotFound,
    #[error("appointment belongs to another student")]
    Forbidden,
    #[error("appointment is {0}, not pending payment")]
    NotPending(String),
    #[error("payment window has closed")]
    PaymentWindowClosed,
    #[error("payment signature does not match")]
    SignatureMismatch,
    #[error("order does not belong to this appointment")]
    OrderMismatch,
    #[error("paid amount does not match the session price")]
    AmountMismatch,
    #[error("payment is {0}, not captured")]
    PaymentNotCaptured(String),
    #[error("webhook signature does not match")]
    InvalidWebhookSignature,
    #[error("webhook payload is missing {0}")]
    MalformedWebhook(&'static str),
    #[error("payment provider request failed")]
    Provider(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for PaymentError {
    fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::AppointmentNotFound => StatusCode::NOT_FOUND,
            PaymentError::Forbidden => StatusCode::FORBIDDEN,
            PaymentError::NotPending(_)
            | PaymentError::PaymentWindowClosed
            | PaymentError::OrderMismatch
            | PaymentError::AmountMismatch => StatusCode::CONFLICT,
            PaymentError::SignatureMismatch | PaymentError::MalformedWebhook(_) => {
                StatusCode::BAD_REQUEST
            }
            PaymentError::PaymentNotCaptured(_) => StatusCode::PAYMENT_REQUIRED,
            PaymentError::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            PaymentError::Provider(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            PaymentError::AppointmentNotFound => "appointment_not_found",
            PaymentError::Forbidden => "forbidden",
            PaymentError::NotPending(_) => "appointment_not_pending",
            PaymentError::PaymentWindowClosed => "payment_window_expired",
            PaymentError::SignatureMismatch => "signature_mismatch",
            PaymentError::OrderMismatch => "order_mismatch",
            PaymentError::AmountMismatch => "amount_mismatch",
            PaymentError::PaymentNotCaptured(_) => "payment_not_captured",
            PaymentError::InvalidWebhookSignature => "invalid_webhook_signature",
            PaymentError::MalformedWebhook(_) => "malformed_webhook",
            PaymentError::Provider(_) => "payment_provider_error",
            PaymentError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderCreated {
    pub appointment_id: Uuid,
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub appointment_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub appointment_id: Uuid,
    pub payment_id: String,
    pub status: String,
    pub payment_status: String,
    pub already_processed: bool,
}

impl PaymentConfirmation {
    fn from_entity(appointment: &AppointmentEntity, already_processed: bool) -> Self {
        Self {
            appointment_id: appointment.id,
            payment_id: appointment.payment_id.clone().unwrap_or_default(),
            status: appointment.status.clone(),
            payment_status: appointment.payment_status.clone(),
            already_processed,
        }
    }
}

/// What a webhook delivery did. Every variant is acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed(Uuid),
    AlreadyProcessed(Uuid),
    MarkedFailed(Uuid),
    Rejected(String),
    Ignored(String),
}

pub struct PaymentUseCase<A, C, S, G>
where
    A: AppointmentRepository + Send + Sync + 'static,
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    appointment_repo: Arc<A>,
    counsellor_repo: Arc<C>,
    student_repo: Arc<S>,
    gateway: Arc<G>,
    notifications: Option<NotificationDispatcher>,
    settings: PaymentSettings,
}

impl<A, C, S, G> PaymentUseCase<A, C, S, G>
where
    A: AppointmentRepository + Send + Sync + 'static,
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        appointment_repo: Arc<A>,
        counsellor_repo: Arc<C>,
        student_repo: Arc<S>,
        gateway: Arc<G>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            appointment_repo,
            counsellor_repo,
            student_repo,
            gateway,
            notifications: None,
            settings,
        }
    }

    pub fn with_notifications(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifications = Some(dispatcher);
        self
    }

    async fn load(&self, appointment_id: Uuid) -> UseCaseResult<AppointmentEntity> {
        self.appointment_repo
            .find_by_id(appointment_id)
            .await
            .map_err(|err| {
                error!(%appointment_id, db_error = ?err, "payments: failed to load appointment");
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::AppointmentNotFound)
    }

    fn ensure_owner(principal: &Principal, appointment: &AppointmentEntity) -> UseCaseResult<()> {
        if principal.is_admin() || principal.id == appointment.student_id {
            Ok(())
        } else {
            Err(PaymentError::Forbidden)
        }
    }

    fn ensure_pending(appointment: &AppointmentEntity) -> UseCaseResult<()> {
        if appointment.is_pending_payment() {
            Ok(())
        } else {
            Err(PaymentError::NotPending(appointment.status.clone()))
        }
    }

    /// Creates (or returns the already bound) provider order for a pending appointment.
    pub async fn create_order(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
    ) -> UseCaseResult<OrderCreated> {
        let appointment = self.load(appointment_id).await?;
        Self::ensure_owner(principal, &appointment)?;
        Self::ensure_pending(&appointment)?;
        if appointment
            .payment_expires_at
            .is_some_and(|deadline| deadline <= Utc::now())
        {
            return Err(PaymentError::PaymentWindowClosed);
        }

        if let Some(order_id) = appointment.order_id.clone() {
            let order = self.fetch_order(&order_id).await?;
            info!(%appointment_id, %order_id, "payments: returning existing order");
            return Ok(self.order_created(&appointment, order));
        }

        let order = self
            .gateway
            .create_order(
                appointment.amount_minor,
                appointment.currency.clone(),
                receipt_for(appointment_id),
            )
            .await
            .map_err(|err| {
                error!(%appointment_id, error = ?err, "payments: order creation failed");
                PaymentError::Provider(err)
            })?;

        let binding = self
            .appointment_repo
            .bind_order_id(appointment_id, order.id.clone())
            .await
            .map_err(|err| {
                error!(%appointment_id, order_id = %order.id, db_error = ?err, "payments: failed to bind order");
                PaymentError::Internal(err)
            })?;

        match binding {
            OrderBinding::Bound => {
                info!(%appointment_id, order_id = %order.id, amount_minor = order.amount, "payments: order created");
                Ok(self.order_created(&appointment, order))
            }
            OrderBinding::AlreadyBound(existing) => {
                info!(%appointment_id, order_id = %existing, "payments: concurrent order creation, using first binding");
                let order = self.fetch_order(&existing).await?;
                Ok(self.order_created(&appointment, order))
            }
        }
    }

    fn order_created(&self, appointment: &AppointmentEntity, order: RazorpayOrder) -> OrderCreated {
        OrderCreated {
            appointment_id: appointment.id,
            order_id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
            key_id: self.settings.key_id.clone(),
        }
    }

    async fn fetch_order(&self, order_id: &str) -> UseCaseResult<RazorpayOrder> {
        self.gateway
            .fetch_order(order_id.to_string())
            .await
            .map_err(|err| {
                error!(%order_id, error = ?err, "payments: failed to fetch order");
                PaymentError::Provider(err)
            })
    }

    /// Checkout callback path. Verifies the signature, guards against tampering, captures if
    /// needed and confirms atomically. A repeat for an applied payment is a no-op.
    pub async fn verify_payment(
        &self,
        principal: &Principal,
        request: VerifyPaymentRequest,
    ) -> UseCaseResult<PaymentConfirmation> {
        let appointment_id = request.appointment_id;
        let order_id = request.order_id.as_str();
        let payment_id = request.payment_id.as_str();

        if let Err(err) =
            self.gateway
                .verify_payment_signature(order_id, payment_id, &request.signature)
        {
            warn!(
                conflict = true,
                %appointment_id,
                %order_id,
                %payment_id,
                error = %err,
                "payments: signature mismatch"
            );
            return Err(PaymentError::SignatureMismatch);
        }

        let appointment = self.load(appointment_id).await?;
        Self::ensure_owner(principal, &appointment)?;

        if appointment.payment_already_applied() {
            info!(%appointment_id, %payment_id, "payments: payment already applied");
            return Ok(PaymentConfirmation::from_entity(&appointment, true));
        }
        Self::ensure_pending(&appointment)?;

        let order = self.fetch_order(order_id).await?;
        self.ensure_order_matches(&appointment, &order)?;
        self.ensure_order_bound(&appointment, order_id).await?;

        let payment = self
            .gateway
            .fetch_payment(payment_id.to_string())
            .await
            .map_err(|err| {
                error!(%appointment_id, %payment_id, error = ?err, "payments: failed to fetch payment");
                PaymentError::Provider(err)
            })?;
        if payment.order_id.as_deref() != Some(order_id) {
            warn!(
                conflict = true,
                %appointment_id,
                %order_id,
                %payment_id,
                payment_order_id = ?payment.order_id,
                "payments: payment belongs to another order"
            );
            return Err(PaymentError::OrderMismatch);
        }
        let payment = self.capture_if_authorized(&appointment, payment).await?;

        let (appointment, already_processed) = self
            .confirm(
                appointment,
                &payment,
                order_id,
                Some(request.signature.clone()),
                ConfirmationSource::Verification,
            )
            .await?;
        Ok(PaymentConfirmation::from_entity(&appointment, already_processed))
    }

    /// Binds the presented order on first confirmation; a different bound order is a replay signal.
    async fn ensure_order_bound(
        &self,
        appointment: &AppointmentEntity,
        order_id: &str,
    ) -> UseCaseResult<()> {
        let appointment_id = appointment.id;
        match appointment.order_id.as_deref() {
            Some(bound) if bound == order_id => Ok(()),
            Some(bound) => {
                warn!(conflict = true, %appointment_id, %order_id, bound_order_id = %bound, "payments: order id mismatch");
                Err(PaymentError::OrderMismatch)
            }
            None => {
                let binding = self
                    .appointment_repo
                    .bind_order_id(appointment_id, order_id.to_string())
                    .await
                    .map_err(|err| {
                        error!(%appointment_id, %order_id, db_error = ?err, "payments: failed to bind order");
                        PaymentError::Internal(err)
                    })?;
                match binding {
                    OrderBinding::Bound => Ok(()),
                    OrderBinding::AlreadyBound(bound) if bound == order_id => Ok(()),
                    OrderBinding::AlreadyBound(bound) => {
                        warn!(conflict = true, %appointment_id, %order_id, bound_order_id = %bound, "payments: order id mismatch");
                        Err(PaymentError::OrderMismatch)
                    }
                }
            }
        }
    }

    fn ensure_order_matches(
        &self,
        appointment: &AppointmentEntity,
        order: &RazorpayOrder,
    ) -> UseCaseResult<()> {
        let appointment_id = appointment.id;
        if let Some(receipt_appointment) = order.receipt.as_deref().and_then(appointment_id_from_receipt)
        {
            if receipt_appointment != appointment_id {
                warn!(conflict = true, %appointment_id, order_id = %order.id, %receipt_appointment, "payments: order receipt names another appointment");
                return Err(PaymentError::OrderMismatch);
            }
        }
        Self::ensure_amount(appointment, order.amount, &order.currency)
    }

    fn ensure_amount(
        appointment: &AppointmentEntity,
        amount_minor: i64,
        currency: &str,
    ) -> UseCaseResult<()> {
        if amount_minor == appointment.amount_minor
            && currency.eq_ignore_ascii_case(&appointment.currency)
        {
            return Ok(());
        }
        warn!(
            conflict = true,
            appointment_id = %appointment.id,
            expected_minor = appointment.amount_minor,
            expected_currency = %appointment.currency,
            reported_minor = amount_minor,
            reported_currency = %currency,
            "payments: amount mismatch"
        );
        Err(PaymentError::AmountMismatch)
    }

    async fn capture_if_authorized(
        &self,
        appointment: &AppointmentEntity,
        payment: RazorpayPayment,
    ) -> UseCaseResult<RazorpayPayment> {
        Self::ensure_amount(appointment, payment.amount, &payment.currency)?;
        let payment = if payment.is_authorized() {
            info!(appointment_id = %appointment.id, payment_id = %payment.id, "payments: capturing authorized payment");
            self.gateway
                .capture_payment(payment.id.clone(), appointment.amount_minor, appointment.currency.clone())
                .await
                .map_err(|err| {
                    error!(appointment_id = %appointment.id, payment_id = %payment.id, error = ?err, "payments: capture failed");
                    PaymentError::Provider(err)
                })?
        } else {
            payment
        };

        if !payment.is_captured() {
            return Err(PaymentError::PaymentNotCaptured(payment.status));
        }
        Ok(payment)
    }

    /// Atomic confirmation shared by the checkout and webhook paths.
    async fn confirm(
        &self,
        appointment: AppointmentEntity,
        payment: &RazorpayPayment,
        order_id: &str,
        signature: Option<String>,
        source: ConfirmationSource,
    ) -> UseCaseResult<(AppointmentEntity, bool)> {
        let appointment_id = appointment.id;
        let now = Utc::now();
        let details = PaymentDetails {
            order_id: order_id.to_string(),
            payment_id: payment.id.clone(),
            amount_minor: payment.amount,
            currency: payment.currency.clone(),
            method: payment.method.clone(),
            payer_email: payment.email.clone(),
            payer_contact: payment.contact.clone(),
            provider_status: payment.status.clone(),
            source,
        };
        let patch = AppointmentPatch::confirmed(&details, signature, now)?;
        let record = PaymentEntity {
            id: payment.id.clone(),
            appointment_id,
            order_id: order_id.to_string(),
            counsellor_id: appointment.counsellor_id,
            student_id: appointment.student_id,
            student_email: appointment.student_email.clone().or_else(|| payment.email.clone()),
            counsellor_name: Some(appointment.counsellor_profile().display_name()),
            amount_minor: payment.amount,
            currency: payment.currency.clone(),
            status: PaymentStatus::Success.to_string(),
            method: payment.method.clone(),
            date: appointment.date,
            time_slot: appointment.time_slot.clone(),
            source: source.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        let outcome = self
            .appointment_repo
            .confirm_payment(appointment_id, patch, record)
            .await
            .map_err(|err| {
                error!(%appointment_id, payment_id = %payment.id, db_error = ?err, "payments: confirmation write failed");
                PaymentError::Internal(err)
            })?;

        match outcome {
            ConfirmationOutcome::Confirmed(confirmed) => {
                info!(
                    %appointment_id,
                    payment_id = %payment.id,
                    %order_id,
                    source = source.as_str(),
                    "payments: appointment confirmed"
                );
                self.notify(&confirmed).await;
                Ok((confirmed, false))
            }
            ConfirmationOutcome::AlreadyConfirmed(existing) => {
                info!(%appointment_id, payment_id = %payment.id, source = source.as_str(), "payments: confirmation already applied");
                Ok((existing, true))
            }
            ConfirmationOutcome::NotPending(status) => {
                warn!(%appointment_id, payment_id = %payment.id, %status, "payments: captured payment for appointment no longer pending");
                Err(PaymentError::NotPending(status.to_string()))
            }
            ConfirmationOutcome::NotFound => Err(PaymentError::AppointmentNotFound),
        }
    }

    /// Builds the confirmation emails and hands them to the dispatcher. Never fails.
    async fn notify(&self, appointment: &AppointmentEntity) {
        let Some(dispatcher) = &self.notifications else {
            return;
        };
        let appointment_id = appointment.id;

        let student_name = match appointment.meta.get("student_name").and_then(|v| v.as_str()) {
            Some(name) => name.to_string(),
            None => match self.student_repo.find_by_id(appointment.student_id).await {
                Ok(Some(student)) => student.display_name(),
                Ok(None) => "there".to_string(),
                Err(err) => {
                    warn!(%appointment_id, db_error = ?err, "payments: student lookup for email failed");
                    "there".to_string()
                }
            },
        };
        let counsellor_email = match self.counsellor_repo.find_by_id(appointment.counsellor_id).await {
            Ok(counsellor) => counsellor.map(|c| c.email),
            Err(err) => {
                warn!(%appointment_id, db_error = ?err, "payments: counsellor lookup for email failed");
                None
            }
        };
        let Some(student_email) = appointment.student_email.clone() else {
            warn!(%appointment_id, "payments: no student email, skipping confirmation emails");
            return;
        };

        let ctx = ConfirmationContext {
            student_name,
            student_email,
            counsellor_name: appointment.counsellor_profile().display_name(),
            counsellor_email,
            date: appointment.date,
            time_slot: appointment.time_slot.clone(),
            join_url: Some(appointment.join_url.clone()).filter(|url| !url.is_empty()),
            start_url: Some(appointment.start_url.clone()).filter(|url| !url.is_empty()),
            payment_id: appointment.payment_id.clone().unwrap_or_default(),
            order_id: appointment.order_id.clone().unwrap_or_default(),
            amount_minor: appointment.amount_minor,
            currency: appointment.currency.clone(),
            paid_at: appointment.paid_at.unwrap_or_else(Utc::now),
        };
        drop(dispatcher.dispatch(confirmation_emails(&ctx)));
    }

    /// Provider webhook. The signature is checked over the raw body before anything is parsed.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> UseCaseResult<WebhookOutcome> {
        let event = self
            .gateway
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(conflict = true, error = %err, "payments: webhook signature rejected");
                PaymentError::InvalidWebhookSignature
            })?;

        match event.event.as_str() {
            "payment.captured" => self.webhook_captured(&event).await,
            "payment.failed" => self.webhook_failed(&event).await,
            other => {
                info!(event = %other, "payments: webhook event ignored");
                Ok(WebhookOutcome::Ignored(other.to_string()))
            }
        }
    }

    async fn appointment_for_order(&self, order_id: &str) -> UseCaseResult<Option<Uuid>> {
        let order = self.fetch_order(order_id).await?;
        Ok(order.receipt.as_deref().and_then(appointment_id_from_receipt))
    }

    async fn webhook_captured(&self, event: &RazorpayWebhookEvent) -> UseCaseResult<WebhookOutcome> {
        let payment = event.payment().ok_or(PaymentError::MalformedWebhook("payment entity"))?;
        let order_id = payment
            .order_id
            .clone()
            .ok_or(PaymentError::MalformedWebhook("order id"))?;

        let Some(appointment_id) = self.appointment_for_order(&order_id).await? else {
            warn!(%order_id, payment_id = %payment.id, "payments: captured order has no appointment receipt");
            return Ok(WebhookOutcome::Ignored("unknown_receipt".to_string()));
        };
        let appointment = match self.load(appointment_id).await {
            Ok(appointment) => appointment,
            Err(PaymentError::AppointmentNotFound) => {
                warn!(%appointment_id, %order_id, "payments: captured payment for unknown appointment");
                return Ok(WebhookOutcome::Ignored("unknown_appointment".to_string()));
            }
            Err(err) => return Err(err),
        };

        if appointment.payment_already_applied() {
            info!(%appointment_id, payment_id = %payment.id, "payments: webhook repeat for applied payment");
            return Ok(WebhookOutcome::AlreadyProcessed(appointment_id));
        }
        if !appointment.is_pending_payment() {
            warn!(%appointment_id, payment_id = %payment.id, status = %appointment.status, "payments: captured payment for appointment no longer pending");
            return Ok(WebhookOutcome::Ignored("not_pending".to_string()));
        }

        let guards = match Self::ensure_amount(&appointment, payment.amount, &payment.currency) {
            Ok(()) => self.ensure_order_bound(&appointment, &order_id).await,
            Err(err) => Err(err),
        };
        if let Err(err) = guards {
            return match err {
                PaymentError::OrderMismatch | PaymentError::AmountMismatch => {
                    Ok(WebhookOutcome::Rejected(err.reason().to_string()))
                }
                other => Err(other),
            };
        }

        let (_, already_processed) = self
            .confirm(appointment, payment, &order_id, None, ConfirmationSource::Webhook)
            .await?;
        if already_processed {
            Ok(WebhookOutcome::AlreadyProcessed(appointment_id))
        } else {
            Ok(WebhookOutcome::Confirmed(appointment_id))
        }
    }

    async fn webhook_failed(&self, event: &RazorpayWebhookEvent) -> UseCaseResult<WebhookOutcome> {
        let payment = event.payment().ok_or(PaymentError::MalformedWebhook("payment entity"))?;
        let order_id = payment
            .order_id
            .clone()
            .ok_or(PaymentError::MalformedWebhook("order id"))?;
        let Some(appointment_id) = self.appointment_for_order(&order_id).await? else {
            warn!(%order_id, payment_id = %payment.id, "payments: failed order has no appointment receipt");
            return Ok(WebhookOutcome::Ignored("unknown_receipt".to_string()));
        };

        let marked = self
            .appointment_repo
            .mark_payment_failed(appointment_id, AppointmentPatch::payment_failed(Some(payment.id.clone())))
            .await
            .map_err(|err| {
                error!(%appointment_id, db_error = ?err, "payments: failed to mark payment failed");
                PaymentError::Internal(err)
            })?;

        if marked {
            info!(
                %appointment_id,
                payment_id = %payment.id,
                error_code = ?payment.error_code,
                error_description = ?payment.error_description,
                "payments: payment failed, slot released"
            );
            Ok(WebhookOutcome::MarkedFailed(appointment_id))
        } else {
            info!(%appointment_id, payment_id = %payment.id, "payments: failure signal for appointment no longer pending");
            Ok(WebhookOutcome::Ignored("not_pending".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use booking_core::{
        domain::{
            repositories::{
                appointments::MockAppointmentRepository, counsellors::MockCounsellorRepository,
                students::MockStudentRepository,
            },
            value_objects::enums::{appointment_statuses::AppointmentStatus, roles::Role},
        },
        payments::razorpay_client::{RazorpayEntityWrapper, RazorpayWebhookPayload},
    };
    use chrono::{Duration, NaiveDate};
    use serde_json::json;

    type TestUseCase = PaymentUseCase<
        MockAppointmentRepository,
        MockCounsellorRepository,
        MockStudentRepository,
        MockPaymentGateway,
    >;

    fn build(appointments: MockAppointmentRepository, gateway: MockPaymentGateway) -> TestUseCase {
        PaymentUseCase::new(
            Arc::new(appointments),
            Arc::new(MockCounsellorRepository::new()),
            Arc::new(MockStudentRepository::new()),
            Arc::new(gateway),
            PaymentSettings {
                currency: "INR".to_string(),
                key_id: "rzp_test_key".to_string(),
            },
        )
    }

    fn pending(student_id: Uuid, order_id: Option<&str>) -> AppointmentEntity {
        let now = Utc::now();
        AppointmentEntity {
            id: Uuid::new_v4(),
            counsellor_id: Uuid::new_v4(),
            student_id,
            student_email: Some("asha@example.com".to_string()),
            counsellor_snapshot: json!({ "first_name": "Dev" }),
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            time_slot: "09:00-09:30".to_string(),
            slot_id: "slot".to_string(),
            meeting_id: "m".to_string(),
            join_url: "https://zoom.example.com/j/1".to_string(),
            start_url: "https://zoom.example.com/s/1".to_string(),
            amount_minor: 50_000,
            currency: "INR".to_string(),
            meta: json!({ "student_name": "Asha" }),
            status: AppointmentStatus::PendingPayment.to_string(),
            payment_status: PaymentStatus::Pending.to_string(),
            payment_expires_at: Some(now + Duration::minutes(10)),
            order_id: order_id.map(str::to_string),
            payment_id: None,
            payment_signature: None,
            payment_details: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn order(id: &str, appointment_id: Uuid, amount: i64) -> RazorpayOrder {
        RazorpayOrder {
            id: id.to_string(),
            amount,
            amount_paid: None,
            currency: "INR".to_string(),
            receipt: Some(receipt_for(appointment_id)),
            status: "created".to_string(),
        }
    }

    fn payment(id: &str, order_id: &str, amount: i64, status: &str) -> RazorpayPayment {
        RazorpayPayment {
            id: id.to_string(),
            order_id: Some(order_id.to_string()),
            amount,
            currency: "INR".to_string(),
            status: status.to_string(),
            method: Some("upi".to_string()),
            captured: status == "captured",
            email: None,
            contact: None,
            error_code: None,
            error_description: None,
        }
    }

    fn student(id: Uuid) -> Principal {
        Principal {
            id,
            email: None,
            role: Role::Student,
        }
    }

    fn verify_request(appointment_id: Uuid) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            appointment_id,
            order_id: "order_1".to_string(),
            payment_id: "pay_1".to_string(),
            signature: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn signature_mismatch_touches_nothing() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_verify_payment_signature()
            .returning(|_, _, _| Err(anyhow!("invalid payment signature")));
        let mut appointments = MockAppointmentRepository::new();
        appointments.expect_find_by_id().never();
        appointments.expect_confirm_payment().never();

        let err = build(appointments, gateway)
            .verify_payment(&student(Uuid::new_v4()), verify_request(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::SignatureMismatch));
    }

    #[tokio::test]
    async fn tampered_amount_leaves_appointment_pending() {
        let student_id = Uuid::new_v4();
        let appointment = pending(student_id, Some("order_1"));
        let appointment_id = appointment.id;

        let mut appointments = MockAppointmentRepository::new();
        appointments.expect_find_by_id().returning(move |_| {
            let appointment = appointment.clone();
            Box::pin(async move { Ok(Some(appointment)) })
        });
        appointments.expect_confirm_payment().never();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_payment_signature().returning(|_, _, _| Ok(()));
        gateway
            .expect_fetch_order()
            .returning(move |id| Box::pin(async move { Ok(order(&id, appointment_id, 100)) }));
        gateway.expect_fetch_payment().never();

        let err = build(appointments, gateway)
            .verify_payment(&student(student_id), verify_request(appointment_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AmountMismatch));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn repeat_verification_is_idempotent() {
        let student_id = Uuid::new_v4();
        let mut appointment = pending(student_id, Some("order_1"));
        appointment.status = AppointmentStatus::Confirmed.to_string();
        appointment.payment_status = PaymentStatus::Success.to_string();
        appointment.payment_id = Some("pay_1".to_string());
        let appointment_id = appointment.id;

        let mut appointments = MockAppointmentRepository::new();
        appointments.expect_find_by_id().returning(move |_| {
            let appointment = appointment.clone();
            Box::pin(async move { Ok(Some(appointment)) })
        });
        appointments.expect_confirm_payment().never();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_payment_signature().returning(|_, _, _| Ok(()));
        gateway.expect_fetch_payment().never();

        let confirmation = build(appointments, gateway)
            .verify_payment(&student(student_id), verify_request(appointment_id))
            .await
            .unwrap();
        assert!(confirmation.already_processed);
        assert_eq!(confirmation.status, "confirmed");
    }

    #[tokio::test]
    async fn authorized_payment_is_captured_then_confirmed() {
        let student_id = Uuid::new_v4();
        let appointment = pending(student_id, None);
        let appointment_id = appointment.id;

        let mut appointments = MockAppointmentRepository::new();
        appointments.expect_find_by_id().returning(move |_| {
            let appointment = appointment.clone();
            Box::pin(async move { Ok(Some(appointment)) })
        });
        appointments
            .expect_bind_order_id()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(OrderBinding::Bound) }));
        appointments
            .expect_confirm_payment()
            .times(1)
            .returning(move |_, patch, record| {
                let mut confirmed = pending(student_id, Some("order_1"));
                confirmed.id = appointment_id;
                patch.apply_to(&mut confirmed, Utc::now());
                assert_eq!(record.id, "pay_1");
                assert_eq!(record.source, "verification");
                Box::pin(async move { Ok(ConfirmationOutcome::Confirmed(confirmed)) })
            });

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_payment_signature().returning(|_, _, _| Ok(()));
        gateway
            .expect_fetch_order()
            .returning(move |id| Box::pin(async move { Ok(order(&id, appointment_id, 50_000)) }));
        gateway
            .expect_fetch_payment()
            .returning(|_| Box::pin(async { Ok(payment("pay_1", "order_1", 50_000, "authorized")) }));
        gateway
            .expect_capture_payment()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(payment("pay_1", "order_1", 50_000, "captured")) }));

        let confirmation = build(appointments, gateway)
            .verify_payment(&student(student_id), verify_request(appointment_id))
            .await
            .unwrap();
        assert!(!confirmation.already_processed);
        assert_eq!(confirmation.status, "confirmed");
        assert_eq!(confirmation.payment_status, "success");
    }

    #[tokio::test]
    async fn other_students_cannot_create_orders() {
        let appointment = pending(Uuid::new_v4(), None);
        let appointment_id = appointment.id;
        let mut appointments = MockAppointmentRepository::new();
        appointments.expect_find_by_id().returning(move |_| {
            let appointment = appointment.clone();
            Box::pin(async move { Ok(Some(appointment)) })
        });
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_order().never();

        let err = build(appointments, gateway)
            .create_order(&student(Uuid::new_v4()), appointment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Forbidden));
    }

    #[tokio::test]
    async fn unknown_webhook_events_are_acknowledged() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_webhook_signature().returning(|_, _| {
            Ok(RazorpayWebhookEvent {
                event: "refund.created".to_string(),
                payload: RazorpayWebhookPayload { payment: None },
            })
        });

        let outcome = build(MockAppointmentRepository::new(), gateway)
            .handle_webhook(b"{}", "sig")
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored("refund.created".to_string()));
    }

    #[tokio::test]
    async fn failed_webhook_marks_payment_failed() {
        let appointment_id = Uuid::new_v4();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_webhook_signature().returning(|_, _| {
            Ok(RazorpayWebhookEvent {
                event: "payment.failed".to_string(),
                payload: RazorpayWebhookPayload {
                    payment: Some(RazorpayEntityWrapper {
                        entity: payment("pay_9", "order_9", 50_000, "failed"),
                    }),
                },
            })
        });
        gateway
            .expect_fetch_order()
            .returning(move |id| Box::pin(async move { Ok(order(&id, appointment_id, 50_000)) }));
        let mut appointments = MockAppointmentRepository::new();
        appointments
            .expect_mark_payment_failed()
            .withf(move |id, patch| {
                *id == appointment_id && patch.payment_id.as_deref() == Some("pay_9")
            })
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let outcome = build(appointments, gateway)
            .handle_webhook(b"{}", "sig")
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::MarkedFailed(appointment_id));
    }

    #[tokio::test]
    async fn bad_webhook_signature_is_unauthorized() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_verify_webhook_signature()
            .returning(|_, _| Err(anyhow!("invalid webhook signature")));

        let err = build(MockAppointmentRepository::new(), gateway)
            .handle_webhook(b"{}", "nope")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
