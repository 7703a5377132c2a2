use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::{
    Connection, PgConnection, RunQueryDsl, insert_into,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    update,
};
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            appointment_mirrors::{CounsellorAppointmentEntity, StudentAppointmentEntity},
            appointments::AppointmentEntity,
            payments::PaymentEntity,
        },
        repositories::appointments::AppointmentRepository,
        value_objects::{
            appointments::{
                AppointmentPatch, ConfirmationOutcome, ExpiryCandidate, ExpirySummary,
                OrderBinding, ReservationOutcome,
            },
            enums::{appointment_statuses::AppointmentStatus, payment_statuses::PaymentStatus},
        },
    },
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{
            appointments, counsellor_appointments, payments, student_appointments, time_slots,
        },
    },
};

#[derive(Debug, AsChangeset)]
#[diesel(table_name = appointments, treat_none_as_null = true)]
struct AppointmentChangeset<'a> {
    status: &'a str,
    payment_status: &'a str,
    payment_expires_at: Option<DateTime<Utc>>,
    order_id: Option<&'a str>,
    payment_id: Option<&'a str>,
    payment_signature: Option<&'a str>,
    payment_details: Option<&'a serde_json::Value>,
    paid_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a AppointmentEntity> for AppointmentChangeset<'a> {
    fn from(appointment: &'a AppointmentEntity) -> Self {
        Self {
            status: &appointment.status,
            payment_status: &appointment.payment_status,
            payment_expires_at: appointment.payment_expires_at,
            order_id: appointment.order_id.as_deref(),
            payment_id: appointment.payment_id.as_deref(),
            payment_signature: appointment.payment_signature.as_deref(),
            payment_details: appointment.payment_details.as_ref(),
            paid_at: appointment.paid_at,
            updated_at: appointment.updated_at,
        }
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DieselError>(),
        Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
    )
}

fn lock_appointment(
    tx: &mut PgConnection,
    appointment_id: Uuid,
) -> Result<Option<AppointmentEntity>> {
    let appointment = appointments::table
        .find(appointment_id)
        .select(AppointmentEntity::as_select())
        .for_update()
        .first::<AppointmentEntity>(tx)
        .optional()?;
    Ok(appointment)
}

/// Writes the master row changes and re-serialises both mirrors.
fn save_appointment(tx: &mut PgConnection, appointment: &AppointmentEntity) -> Result<()> {
    update(appointments::table.find(appointment.id))
        .set(AppointmentChangeset::from(appointment))
        .execute(tx)?;
    write_mirrors(tx, appointment)
}

fn write_mirrors(tx: &mut PgConnection, appointment: &AppointmentEntity) -> Result<()> {
    let document = serde_json::to_value(appointment)?;

    let counsellor_row = CounsellorAppointmentEntity {
        counsellor_id: appointment.counsellor_id,
        appointment_id: appointment.id,
        document: document.clone(),
        updated_at: appointment.updated_at,
    };
    insert_into(counsellor_appointments::table)
        .values(&counsellor_row)
        .on_conflict((
            counsellor_appointments::counsellor_id,
            counsellor_appointments::appointment_id,
        ))
        .do_update()
        .set(&counsellor_row)
        .execute(tx)?;

    let student_row = StudentAppointmentEntity {
        student_id: appointment.student_id,
        appointment_id: appointment.id,
        document,
        updated_at: appointment.updated_at,
    };
    insert_into(student_appointments::table)
        .values(&student_row)
        .on_conflict((
            student_appointments::student_id,
            student_appointments::appointment_id,
        ))
        .do_update()
        .set(&student_row)
        .execute(tx)?;

    Ok(())
}

/// Clears the booking flag only while the slot is still held by `student_id`.
fn release_slot(tx: &mut PgConnection, slot_id: &str, student_id: Uuid) -> Result<bool> {
    let released = update(
        time_slots::table
            .filter(time_slots::id.eq(slot_id))
            .filter(time_slots::is_booked.eq(true))
            .filter(time_slots::booked_by.eq(student_id)),
    )
    .set((
        time_slots::is_booked.eq(false),
        time_slots::booked_by.eq(None::<Uuid>),
        time_slots::booked_at.eq(None::<DateTime<Utc>>),
    ))
    .execute(tx)?;
    Ok(released > 0)
}

fn decode_documents(documents: Vec<serde_json::Value>) -> Vec<AppointmentEntity> {
    let mut decoded: Vec<AppointmentEntity> = documents
        .into_iter()
        .filter_map(|document| match serde_json::from_value(document) {
            Ok(appointment) => Some(appointment),
            Err(err) => {
                warn!(error = %err, "appointments: skipping malformed mirror document");
                None
            }
        })
        .collect();
    decoded.sort_by(|a, b| {
        (b.date, &b.time_slot, b.created_at).cmp(&(a.date, &a.time_slot, a.created_at))
    });
    decoded
}

pub struct AppointmentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl AppointmentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AppointmentRepository for AppointmentPostgres {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<AppointmentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<AppointmentEntity>> {
            let mut conn = db_pool.get()?;

            let appointment = appointments::table
                .find(appointment_id)
                .select(AppointmentEntity::as_select())
                .first::<AppointmentEntity>(&mut conn)
                .optional()?;

            Ok(appointment)
        })
        .await??)
    }

    async fn find_active_for_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        time_slot: String,
    ) -> Result<Option<AppointmentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<AppointmentEntity>> {
            let mut conn = db_pool.get()?;

            let appointment = appointments::table
                .filter(appointments::counsellor_id.eq(counsellor_id))
                .filter(appointments::date.eq(date))
                .filter(appointments::time_slot.eq(&time_slot))
                .filter(appointments::status.eq_any(AppointmentStatus::occupying_values()))
                .select(AppointmentEntity::as_select())
                .first::<AppointmentEntity>(&mut conn)
                .optional()?;

            Ok(appointment)
        })
        .await??)
    }

    async fn create_with_reservation(
        &self,
        appointment: AppointmentEntity,
    ) -> Result<ReservationOutcome> {
        let db_pool = Arc::clone(&self.db_pool);

        let result = task::spawn_blocking(move || -> Result<ReservationOutcome> {
            let mut conn = db_pool.get()?;

            conn.transaction::<ReservationOutcome, anyhow::Error, _>(|tx| {
                let slot_booked = time_slots::table
                    .find(&appointment.slot_id)
                    .select(time_slots::is_booked)
                    .for_update()
                    .first::<bool>(tx)
                    .optional()?;

                match slot_booked {
                    None => return Ok(ReservationOutcome::SlotMissing),
                    Some(true) => return Ok(ReservationOutcome::SlotAlreadyBooked),
                    Some(false) => {}
                }

                let tuple_taken = appointments::table
                    .filter(appointments::counsellor_id.eq(appointment.counsellor_id))
                    .filter(appointments::date.eq(appointment.date))
                    .filter(appointments::time_slot.eq(&appointment.time_slot))
                    .filter(appointments::status.eq_any(AppointmentStatus::occupying_values()))
                    .select(appointments::id)
                    .first::<Uuid>(tx)
                    .optional()?;
                if tuple_taken.is_some() {
                    return Ok(ReservationOutcome::SlotTupleTaken);
                }

                let reserved = update(
                    time_slots::table
                        .filter(time_slots::id.eq(&appointment.slot_id))
                        .filter(time_slots::is_booked.eq(false)),
                )
                .set((
                    time_slots::is_booked.eq(true),
                    time_slots::booked_by.eq(Some(appointment.student_id)),
                    time_slots::booked_at.eq(Some(appointment.created_at)),
                ))
                .execute(tx)?;
                if reserved == 0 {
                    return Ok(ReservationOutcome::SlotAlreadyBooked);
                }

                insert_into(appointments::table)
                    .values(&appointment)
                    .execute(tx)?;
                write_mirrors(tx, &appointment)?;

                Ok(ReservationOutcome::Reserved(appointment))
            })
        })
        .await?;

        match result {
            Err(err) if is_unique_violation(&err) => Ok(ReservationOutcome::SlotTupleTaken),
            other => other,
        }
    }

    async fn bind_order_id(&self, appointment_id: Uuid, order_id: String) -> Result<OrderBinding> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<OrderBinding> {
            let mut conn = db_pool.get()?;

            conn.transaction::<OrderBinding, anyhow::Error, _>(|tx| {
                let mut appointment = lock_appointment(tx, appointment_id)?
                    .ok_or_else(|| anyhow!("appointment {appointment_id} not found"))?;

                match appointment.order_id.clone() {
                    Some(existing) if existing == order_id => Ok(OrderBinding::Bound),
                    Some(existing) => Ok(OrderBinding::AlreadyBound(existing)),
                    None => {
                        AppointmentPatch::bind_order(order_id).apply_to(&mut appointment, Utc::now());
                        save_appointment(tx, &appointment)?;
                        Ok(OrderBinding::Bound)
                    }
                }
            })
        })
        .await??)
    }

    async fn confirm_payment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        payment: PaymentEntity,
    ) -> Result<ConfirmationOutcome> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<ConfirmationOutcome> {
            let mut conn = db_pool.get()?;

            conn.transaction::<ConfirmationOutcome, anyhow::Error, _>(|tx| {
                let Some(mut appointment) = lock_appointment(tx, appointment_id)? else {
                    return Ok(ConfirmationOutcome::NotFound);
                };

                if appointment.payment_already_applied() {
                    return Ok(ConfirmationOutcome::AlreadyConfirmed(appointment));
                }
                match appointment.status() {
                    Some(AppointmentStatus::PendingPayment) => {}
                    Some(status) => return Ok(ConfirmationOutcome::NotPending(status)),
                    None => {
                        return Err(anyhow!(
                            "appointment {appointment_id} has unknown status `{}`",
                            appointment.status
                        ));
                    }
                }

                patch.apply_to(&mut appointment, payment.updated_at);
                save_appointment(tx, &appointment)?;

                insert_into(payments::table)
                    .values(&payment)
                    .on_conflict(payments::id)
                    .do_nothing()
                    .execute(tx)?;

                Ok(ConfirmationOutcome::Confirmed(appointment))
            })
        })
        .await??)
    }

    async fn mark_payment_failed(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            conn.transaction::<bool, anyhow::Error, _>(|tx| {
                let Some(mut appointment) = lock_appointment(tx, appointment_id)? else {
                    return Ok(false);
                };
                if !appointment.is_pending_payment() {
                    return Ok(false);
                }

                patch.apply_to(&mut appointment, Utc::now());
                save_appointment(tx, &appointment)?;
                release_slot(tx, &appointment.slot_id, appointment.student_id)?;

                Ok(true)
            })
        })
        .await??)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<AppointmentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<AppointmentEntity>> {
            let mut conn = db_pool.get()?;

            let expired = appointments::table
                .filter(appointments::status.eq(AppointmentStatus::PendingPayment.as_str()))
                .filter(appointments::payment_status.eq(PaymentStatus::Pending.as_str()))
                .filter(appointments::payment_expires_at.lt(now))
                .select(AppointmentEntity::as_select())
                .order(appointments::payment_expires_at.asc())
                .load::<AppointmentEntity>(&mut conn)?;

            Ok(expired)
        })
        .await??)
    }

    async fn expire_batch(
        &self,
        candidates: Vec<ExpiryCandidate>,
        now: DateTime<Utc>,
    ) -> Result<ExpirySummary> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<ExpirySummary> {
            let mut conn = db_pool.get()?;

            conn.transaction::<ExpirySummary, anyhow::Error, _>(|tx| {
                let mut summary = ExpirySummary::default();
                let patch = AppointmentPatch::expired();

                for candidate in &candidates {
                    let Some(mut appointment) = lock_appointment(tx, candidate.appointment_id)?
                    else {
                        summary.skipped += 1;
                        continue;
                    };
                    let still_due = appointment.is_pending_payment()
                        && appointment
                            .payment_expires_at
                            .is_some_and(|deadline| deadline < now);
                    if !still_due {
                        summary.skipped += 1;
                        continue;
                    }

                    patch.apply_to(&mut appointment, now);
                    save_appointment(tx, &appointment)?;
                    summary.expired += 1;

                    if release_slot(tx, &candidate.slot_id, candidate.student_id)? {
                        summary.released_slots += 1;
                    } else {
                        warn!(
                            appointment_id = %candidate.appointment_id,
                            slot_id = %candidate.slot_id,
                            "appointments: slot for expired appointment was not held"
                        );
                    }
                }

                Ok(summary)
            })
        })
        .await??)
    }

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<AppointmentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<AppointmentEntity>> {
            let mut conn = db_pool.get()?;

            let documents = student_appointments::table
                .filter(student_appointments::student_id.eq(student_id))
                .select(student_appointments::document)
                .load::<serde_json::Value>(&mut conn)?;

            Ok(decode_documents(documents))
        })
        .await??)
    }

    async fn list_for_counsellor(&self, counsellor_id: Uuid) -> Result<Vec<AppointmentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<AppointmentEntity>> {
            let mut conn = db_pool.get()?;

            let documents = counsellor_appointments::table
                .filter(counsellor_appointments::counsellor_id.eq(counsellor_id))
                .select(counsellor_appointments::document)
                .load::<serde_json::Value>(&mut conn)?;

            Ok(decode_documents(documents))
        })
        .await??)
    }
}
