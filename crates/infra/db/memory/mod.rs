//! Document-style store held in process memory.
//!
//! Every multi-location change takes the single write lock once, checks its preconditions and
//! mutates, so a booking and its mirrors land together or not at all. Used by the behavioural
//! tests and local tooling; production runs against Postgres.

mod repositories;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entities::{
    appointments::AppointmentEntity, counsellors::CounsellorEntity, payments::PaymentEntity,
    students::StudentEntity, time_slots::TimeSlotEntity,
};

#[derive(Debug, Default)]
struct MemoryState {
    counsellors: HashMap<Uuid, CounsellorEntity>,
    students: HashMap<Uuid, StudentEntity>,
    time_slots: BTreeMap<String, TimeSlotEntity>,
    appointments: HashMap<Uuid, AppointmentEntity>,
    counsellor_mirrors: HashMap<(Uuid, Uuid), AppointmentEntity>,
    student_mirrors: HashMap<(Uuid, Uuid), AppointmentEntity>,
    payments: HashMap<String, PaymentEntity>,
}

impl MemoryState {
    fn save_appointment(&mut self, appointment: &AppointmentEntity) {
        self.appointments
            .insert(appointment.id, appointment.clone());
        self.counsellor_mirrors.insert(
            (appointment.counsellor_id, appointment.id),
            appointment.clone(),
        );
        self.student_mirrors
            .insert((appointment.student_id, appointment.id), appointment.clone());
    }

    fn release_slot(&mut self, slot_id: &str, student_id: Uuid) -> bool {
        match self.time_slots.get_mut(slot_id) {
            Some(slot) if slot.is_booked && slot.booked_by == Some(student_id) => {
                slot.is_booked = false;
                slot.booked_by = None;
                slot.booked_at = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_counsellor(&self, counsellor: CounsellorEntity) {
        self.state
            .write()
            .await
            .counsellors
            .insert(counsellor.id, counsellor);
    }

    pub async fn insert_student(&self, student: StudentEntity) {
        self.state.write().await.students.insert(student.id, student);
    }

    pub async fn insert_slot(&self, slot: TimeSlotEntity) {
        self.state
            .write()
            .await
            .time_slots
            .insert(slot.id.clone(), slot);
    }

    /// Writes the master record and both mirrors.
    pub async fn insert_appointment(&self, appointment: AppointmentEntity) {
        self.state.write().await.save_appointment(&appointment);
    }

    /// Shifts an appointment's payment deadline, e.g. into the past for sweep tests.
    pub async fn set_payment_deadline(&self, appointment_id: Uuid, deadline: DateTime<Utc>) {
        let mut state = self.state.write().await;
        if let Some(mut appointment) = state.appointments.get(&appointment_id).cloned() {
            appointment.payment_expires_at = Some(deadline);
            state.save_appointment(&appointment);
        }
    }

    pub async fn slot(&self, slot_id: &str) -> Option<TimeSlotEntity> {
        self.state.read().await.time_slots.get(slot_id).cloned()
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Option<AppointmentEntity> {
        self.state
            .read()
            .await
            .appointments
            .get(&appointment_id)
            .cloned()
    }

    pub async fn appointment_count(&self) -> usize {
        self.state.read().await.appointments.len()
    }

    pub async fn counsellor_mirror(
        &self,
        counsellor_id: Uuid,
        appointment_id: Uuid,
    ) -> Option<AppointmentEntity> {
        self.state
            .read()
            .await
            .counsellor_mirrors
            .get(&(counsellor_id, appointment_id))
            .cloned()
    }

    pub async fn student_mirror(
        &self,
        student_id: Uuid,
        appointment_id: Uuid,
    ) -> Option<AppointmentEntity> {
        self.state
            .read()
            .await
            .student_mirrors
            .get(&(student_id, appointment_id))
            .cloned()
    }

    pub async fn payments(&self) -> Vec<PaymentEntity> {
        self.state.read().await.payments.values().cloned().collect()
    }

    pub async fn counsellor(&self, counsellor_id: Uuid) -> Option<CounsellorEntity> {
        self.state
            .read()
            .await
            .counsellors
            .get(&counsellor_id)
            .cloned()
    }
}
