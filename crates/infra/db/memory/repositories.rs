use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use super::{MemoryState, MemoryStore};
use crate::domain::{
    entities::{
        appointments::AppointmentEntity,
        counsellors::CounsellorEntity,
        payments::PaymentEntity,
        students::StudentEntity,
        time_slots::{InsertTimeSlotEntity, TimeSlotEntity},
    },
    repositories::{
        appointments::AppointmentRepository, counsellors::CounsellorRepository,
        payments::PaymentRepository, students::StudentRepository,
        time_slots::TimeSlotRepository,
    },
    value_objects::{
        appointments::{
            AppointmentPatch, ConfirmationOutcome, ExpiryCandidate, ExpirySummary, OrderBinding,
            ReservationOutcome,
        },
        enums::{
            appointment_statuses::AppointmentStatus, payment_statuses::PaymentStatus,
            periods::Period,
        },
        schedule::{DateException, ScheduleExceptions, TimeConfig, WeeklyAvailability},
        time_slots::SlotDeletion,
    },
};

fn counsellor_mut(state: &mut MemoryState, counsellor_id: Uuid) -> Result<&mut CounsellorEntity> {
    state
        .counsellors
        .get_mut(&counsellor_id)
        .ok_or_else(|| anyhow!("counsellor {counsellor_id} not found"))
}

fn modify_exceptions<T>(
    counsellor: &mut CounsellorEntity,
    change: impl FnOnce(&mut ScheduleExceptions) -> T,
) -> Result<T> {
    let mut exceptions = counsellor.exceptions()?;
    let outcome = change(&mut exceptions);
    counsellor.schedule_exceptions =
        serde_json::to_value(&exceptions).context("failed to encode schedule exceptions")?;
    counsellor.updated_at = Utc::now();
    Ok(outcome)
}

fn sorted_newest_first(mut appointments: Vec<AppointmentEntity>) -> Vec<AppointmentEntity> {
    appointments.sort_by(|a, b| {
        (b.date, &b.time_slot, b.created_at).cmp(&(a.date, &a.time_slot, a.created_at))
    });
    appointments
}

#[async_trait]
impl CounsellorRepository for MemoryStore {
    async fn find_by_id(&self, counsellor_id: Uuid) -> Result<Option<CounsellorEntity>> {
        Ok(self.state.read().await.counsellors.get(&counsellor_id).cloned())
    }

    async fn update_weekly_availability(
        &self,
        counsellor_id: Uuid,
        weekly: WeeklyAvailability,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let counsellor = counsellor_mut(&mut state, counsellor_id)?;
        counsellor.weekly_schedule = Some(serde_json::to_value(&weekly)?);
        counsellor.updated_at = Utc::now();
        Ok(())
    }

    async fn update_time_config(&self, counsellor_id: Uuid, config: TimeConfig) -> Result<()> {
        let mut state = self.state.write().await;
        let counsellor = counsellor_mut(&mut state, counsellor_id)?;
        counsellor.time_config = serde_json::to_value(config)?;
        counsellor.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_exception(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        exception: DateException,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let counsellor = counsellor_mut(&mut state, counsellor_id)?;
        modify_exceptions(counsellor, |exceptions| exceptions.insert(date, exception))
    }

    async fn delete_exception(&self, counsellor_id: Uuid, date: NaiveDate) -> Result<bool> {
        let mut state = self.state.write().await;
        let counsellor = counsellor_mut(&mut state, counsellor_id)?;
        modify_exceptions(counsellor, |exceptions| exceptions.remove(date))
    }

    async fn prune_exceptions_before(&self, counsellor_id: Uuid, date: NaiveDate) -> Result<usize> {
        let mut state = self.state.write().await;
        let counsellor = counsellor_mut(&mut state, counsellor_id)?;
        modify_exceptions(counsellor, |exceptions| exceptions.prune_before(date))
    }

    async fn list_schedulable_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        let mut counsellors: Vec<&CounsellorEntity> = state
            .counsellors
            .values()
            .filter(|counsellor| {
                counsellor.is_verified
                    && counsellor
                        .weekly_schedule
                        .as_ref()
                        .is_some_and(|weekly| !weekly.is_null())
            })
            .collect();
        counsellors.sort_by_key(|counsellor| counsellor.created_at);
        Ok(counsellors.into_iter().map(|counsellor| counsellor.id).collect())
    }
}

#[async_trait]
impl StudentRepository for MemoryStore {
    async fn find_by_id(&self, student_id: Uuid) -> Result<Option<StudentEntity>> {
        Ok(self.state.read().await.students.get(&student_id).cloned())
    }
}

#[async_trait]
impl TimeSlotRepository for MemoryStore {
    async fn slots_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlotEntity>> {
        let state = self.state.read().await;
        let mut slots: Vec<TimeSlotEntity> = state
            .time_slots
            .values()
            .filter(|slot| slot.counsellor_id == counsellor_id && slot.date == date)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }

    async fn find_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlotEntity>> {
        let state = self.state.read().await;
        Ok(state
            .time_slots
            .values()
            .find(|slot| {
                slot.counsellor_id == counsellor_id
                    && slot.date == date
                    && slot.start_time == start_time
            })
            .cloned())
    }

    async fn upsert_unbooked_slots(&self, slots: Vec<InsertTimeSlotEntity>) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut written = 0;

        for slot in slots {
            match state.time_slots.get_mut(&slot.id) {
                Some(existing) if existing.is_booked => {}
                Some(existing) => {
                    existing.period = slot.period;
                    existing.end_time = slot.end_time;
                    existing.expires_at = slot.expires_at;
                    written += 1;
                }
                None => {
                    state.time_slots.insert(slot.id.clone(), slot.into_unbooked());
                    written += 1;
                }
            }
        }

        Ok(written)
    }

    async fn delete_unbooked_slots(&self, slot_ids: Vec<String>) -> Result<SlotDeletion> {
        let mut state = self.state.write().await;
        let mut summary = SlotDeletion::default();

        for slot_id in slot_ids {
            match state.time_slots.get(&slot_id) {
                Some(slot) if slot.is_booked => summary.skipped_booked += 1,
                Some(_) => {
                    state.time_slots.remove(&slot_id);
                    summary.deleted += 1;
                }
                None => {}
            }
        }

        Ok(summary)
    }

    async fn delete_unbooked_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        period: Option<Period>,
    ) -> Result<SlotDeletion> {
        let mut state = self.state.write().await;
        let mut summary = SlotDeletion::default();

        state.time_slots.retain(|_, slot| {
            let in_scope = slot.counsellor_id == counsellor_id
                && slot.date == date
                && period.is_none_or(|period| slot.period == period.as_str());
            if !in_scope {
                return true;
            }
            if slot.is_booked {
                summary.skipped_booked += 1;
                true
            } else {
                summary.deleted += 1;
                false
            }
        });

        Ok(summary)
    }

    async fn delete_expired_unbooked(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.time_slots.len();
        state
            .time_slots
            .retain(|_, slot| slot.is_booked || slot.expires_at >= now);
        Ok(before - state.time_slots.len())
    }
}

#[async_trait]
impl AppointmentRepository for MemoryStore {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<AppointmentEntity>> {
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn find_active_for_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        time_slot: String,
    ) -> Result<Option<AppointmentEntity>> {
        let state = self.state.read().await;
        Ok(state
            .appointments
            .values()
            .find(|appointment| {
                appointment.counsellor_id == counsellor_id
                    && appointment.date == date
                    && appointment.time_slot == time_slot
                    && appointment.status().is_some_and(|status| status.occupies_slot())
            })
            .cloned())
    }

    async fn create_with_reservation(
        &self,
        appointment: AppointmentEntity,
    ) -> Result<ReservationOutcome> {
        let mut state = self.state.write().await;

        match state.time_slots.get(&appointment.slot_id) {
            None => return Ok(ReservationOutcome::SlotMissing),
            Some(slot) if slot.is_booked => return Ok(ReservationOutcome::SlotAlreadyBooked),
            Some(_) => {}
        }

        let tuple_taken = state.appointments.values().any(|existing| {
            existing.counsellor_id == appointment.counsellor_id
                && existing.date == appointment.date
                && existing.time_slot == appointment.time_slot
                && existing.status().is_some_and(|status| status.occupies_slot())
        });
        if tuple_taken {
            return Ok(ReservationOutcome::SlotTupleTaken);
        }

        if let Some(slot) = state.time_slots.get_mut(&appointment.slot_id) {
            slot.is_booked = true;
            slot.booked_by = Some(appointment.student_id);
            slot.booked_at = Some(appointment.created_at);
        }
        state.save_appointment(&appointment);

        Ok(ReservationOutcome::Reserved(appointment))
    }

    async fn bind_order_id(&self, appointment_id: Uuid, order_id: String) -> Result<OrderBinding> {
        let mut state = self.state.write().await;
        let mut appointment = state
            .appointments
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| anyhow!("appointment {appointment_id} not found"))?;

        match appointment.order_id.clone() {
            Some(existing) if existing == order_id => Ok(OrderBinding::Bound),
            Some(existing) => Ok(OrderBinding::AlreadyBound(existing)),
            None => {
                AppointmentPatch::bind_order(order_id).apply_to(&mut appointment, Utc::now());
                state.save_appointment(&appointment);
                Ok(OrderBinding::Bound)
            }
        }
    }

    async fn confirm_payment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        payment: PaymentEntity,
    ) -> Result<ConfirmationOutcome> {
        let mut state = self.state.write().await;
        let Some(mut appointment) = state.appointments.get(&appointment_id).cloned() else {
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
        state.save_appointment(&appointment);
        state
            .payments
            .entry(payment.id.clone())
            .or_insert(payment);

        Ok(ConfirmationOutcome::Confirmed(appointment))
    }

    async fn mark_payment_failed(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(mut appointment) = state.appointments.get(&appointment_id).cloned() else {
            return Ok(false);
        };
        if !appointment.is_pending_payment() {
            return Ok(false);
        }

        patch.apply_to(&mut appointment, Utc::now());
        state.save_appointment(&appointment);
        state.release_slot(&appointment.slot_id, appointment.student_id);
        Ok(true)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<AppointmentEntity>> {
        let state = self.state.read().await;
        let mut expired: Vec<AppointmentEntity> = state
            .appointments
            .values()
            .filter(|appointment| {
                appointment.is_pending_payment()
                    && appointment.payment_state() == Some(PaymentStatus::Pending)
                    && appointment
                        .payment_expires_at
                        .is_some_and(|deadline| deadline < now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|appointment| appointment.payment_expires_at);
        Ok(expired)
    }

    async fn expire_batch(
        &self,
        candidates: Vec<ExpiryCandidate>,
        now: DateTime<Utc>,
    ) -> Result<ExpirySummary> {
        let mut state = self.state.write().await;
        let mut summary = ExpirySummary::default();
        let patch = AppointmentPatch::expired();

        for candidate in candidates {
            let Some(mut appointment) = state.appointments.get(&candidate.appointment_id).cloned()
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
            state.save_appointment(&appointment);
            summary.expired += 1;
            if state.release_slot(&candidate.slot_id, candidate.student_id) {
                summary.released_slots += 1;
            }
        }

        Ok(summary)
    }

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<AppointmentEntity>> {
        let state = self.state.read().await;
        Ok(sorted_newest_first(
            state
                .student_mirrors
                .iter()
                .filter(|((owner, _), _)| *owner == student_id)
                .map(|(_, appointment)| appointment.clone())
                .collect(),
        ))
    }

    async fn list_for_counsellor(&self, counsellor_id: Uuid) -> Result<Vec<AppointmentEntity>> {
        let state = self.state.read().await;
        Ok(sorted_newest_first(
            state
                .counsellor_mirrors
                .iter()
                .filter(|((owner, _), _)| *owner == counsellor_id)
                .map(|(_, appointment)| appointment.clone())
                .collect(),
        ))
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn find_by_id(&self, payment_id: String) -> Result<Option<PaymentEntity>> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<PaymentEntity>> {
        let state = self.state.read().await;
        let mut history: Vec<PaymentEntity> = state
            .payments
            .values()
            .filter(|payment| payment.student_id == student_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    async fn list_for_counsellor(&self, counsellor_id: Uuid) -> Result<Vec<PaymentEntity>> {
        let state = self.state.read().await;
        let mut history: Vec<PaymentEntity> = state
            .payments
            .values()
            .filter(|payment| payment.counsellor_id == counsellor_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }
}
