use anyhow::Result;
use booking_core::domain::{
    entities::appointments::AppointmentEntity,
    repositories::appointments::AppointmentRepository,
    value_objects::{appointments::ExpiryCandidate, enums::appointment_statuses::AppointmentStatus},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_REPORTED_IDS: usize = 20;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpirePendingAppointmentsResult {
    pub scanned: usize,
    pub expired: usize,
    pub released_slots: usize,
    /// Confirmed or otherwise settled between the scan and the write.
    pub skipped_settled: usize,
    pub skipped_malformed: usize,
    pub malformed_ids: Vec<Uuid>,
}

pub struct ExpirePendingAppointmentsUseCase {
    repository: Arc<dyn AppointmentRepository + Send + Sync>,
}

impl ExpirePendingAppointmentsUseCase {
    pub fn new(repository: Arc<dyn AppointmentRepository + Send + Sync>) -> Self {
        Self { repository }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<ExpirePendingAppointmentsResult> {
        let appointments = self.repository.list_expired_pending(now).await?;

        let mut result = ExpirePendingAppointmentsResult {
            scanned: appointments.len(),
            ..Default::default()
        };

        let mut candidates = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            match candidate_for(&appointment) {
                Ok(candidate) => candidates.push(candidate),
                Err(problem) => {
                    warn!(
                        appointment_id = %appointment.id,
                        problem,
                        "expire_pending: skipping malformed appointment"
                    );
                    result.skipped_malformed += 1;
                    if result.malformed_ids.len() < MAX_REPORTED_IDS {
                        result.malformed_ids.push(appointment.id);
                    }
                }
            }
        }

        if candidates.is_empty() {
            info!(scanned = result.scanned, "expire_pending: nothing to expire");
            return Ok(result);
        }

        let summary = self.repository.expire_batch(candidates, now).await?;
        result.expired = summary.expired;
        result.released_slots = summary.released_slots;
        result.skipped_settled = summary.skipped;

        if summary.released_slots < summary.expired {
            warn!(
                expired = summary.expired,
                released_slots = summary.released_slots,
                "expire_pending: some expired appointments had no matching booked slot"
            );
        }
        info!(
            scanned = result.scanned,
            expired = result.expired,
            released_slots = result.released_slots,
            skipped_settled = result.skipped_settled,
            skipped_malformed = result.skipped_malformed,
            "expire_pending: sweep finished"
        );

        Ok(result)
    }
}

fn candidate_for(appointment: &AppointmentEntity) -> Result<ExpiryCandidate, &'static str> {
    if appointment.status() != Some(AppointmentStatus::PendingPayment) {
        return Err("unrecognised status");
    }
    if appointment.slot_id.trim().is_empty() {
        return Err("missing slot id");
    }
    if appointment.time_slot.split('-').next().is_none_or(|start| start.trim().is_empty()) {
        return Err("missing time slot");
    }
    if appointment.payment_expires_at.is_none() {
        return Err("missing payment deadline");
    }

    Ok(ExpiryCandidate {
        appointment_id: appointment.id,
        counsellor_id: appointment.counsellor_id,
        student_id: appointment.student_id,
        slot_id: appointment.slot_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::domain::{
        repositories::appointments::MockAppointmentRepository,
        value_objects::appointments::ExpirySummary,
    };
    use chrono::{Duration, NaiveDate};
    use serde_json::json;

    fn pending(slot_id: &str) -> AppointmentEntity {
        let now = Utc::now();
        AppointmentEntity {
            id: Uuid::new_v4(),
            counsellor_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_email: None,
            counsellor_snapshot: json!({}),
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            time_slot: "09:00-09:30".to_string(),
            slot_id: slot_id.to_string(),
            meeting_id: "m-1".to_string(),
            join_url: "https://zoom.example/j/1".to_string(),
            start_url: "https://zoom.example/s/1".to_string(),
            amount_minor: 50_000,
            currency: "INR".to_string(),
            meta: json!({}),
            status: "pending_payment".to_string(),
            payment_status: "pending".to_string(),
            payment_expires_at: Some(now - Duration::minutes(1)),
            order_id: None,
            payment_id: None,
            payment_signature: None,
            payment_details: None,
            paid_at: None,
            created_at: now - Duration::minutes(20),
            updated_at: now - Duration::minutes(20),
        }
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_and_the_rest_expired() {
        let good = pending("slot-a");
        let good_id = good.id;
        let no_slot = pending("  ");
        let no_slot_id = no_slot.id;
        let mut odd_status = pending("slot-b");
        odd_status.status = "archived".to_string();

        let mut repository = MockAppointmentRepository::new();
        repository
            .expect_list_expired_pending()
            .times(1)
            .returning(move |_| {
                let rows = vec![good.clone(), no_slot.clone(), odd_status.clone()];
                Box::pin(async move { Ok(rows) })
            });
        repository
            .expect_expire_batch()
            .withf(move |candidates, _| {
                candidates.len() == 1 && candidates[0].appointment_id == good_id
            })
            .times(1)
            .returning(|_, _| {
                Box::pin(async {
                    Ok(ExpirySummary {
                        expired: 1,
                        released_slots: 1,
                        skipped: 0,
                    })
                })
            });

        let usecase = ExpirePendingAppointmentsUseCase::new(Arc::new(repository));
        let result = usecase.run(Utc::now()).await.unwrap();

        assert_eq!(result.scanned, 3);
        assert_eq!(result.expired, 1);
        assert_eq!(result.released_slots, 1);
        assert_eq!(result.skipped_malformed, 2);
        assert!(result.malformed_ids.contains(&no_slot_id));
    }

    #[tokio::test]
    async fn empty_scan_never_opens_a_batch() {
        let mut repository = MockAppointmentRepository::new();
        repository
            .expect_list_expired_pending()
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));
        repository.expect_expire_batch().never();

        let usecase = ExpirePendingAppointmentsUseCase::new(Arc::new(repository));
        let result = usecase.run(Utc::now()).await.unwrap();

        assert_eq!(result.scanned, 0);
        assert_eq!(result.expired, 0);
    }

    #[tokio::test]
    async fn repository_failure_propagates() {
        let mut repository = MockAppointmentRepository::new();
        repository
            .expect_list_expired_pending()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("connection reset")) }));

        let usecase = ExpirePendingAppointmentsUseCase::new(Arc::new(repository));
        assert!(usecase.run(Utc::now()).await.is_err());
    }
}
