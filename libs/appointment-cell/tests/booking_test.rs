mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Datelike, Duration, Months, Utc, Weekday};
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::models::{AppointmentError, AppointmentStatus, Counterpart, Requestor};
use appointment_cell::services::{
    AppointmentRepository, AppointmentService, InMemoryUserDirectory, MessageTemplates,
    NotificationSender, SchedulingRules,
};

use common::{
    at, upcoming_saturday, upcoming_slot, upcoming_weekday, BrokenSender, Clinic, OfflineRepository,
    RecordingSender, SnapshotRepository,
};

// ==============================================================================
// CREATE
// ==============================================================================

#[tokio::test]
async fn test_create_books_scheduled_appointment_and_notifies_both_parties() {
    let clinic = Clinic::open().await;
    let slot = upcoming_slot(10, 30);

    let committed = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, slot, Some("Chest pain".to_string()))
        .await
        .unwrap();

    assert_eq!(committed.appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(committed.appointment.date, slot);
    assert_eq!(committed.appointment.notes.as_deref(), Some("Chest pain"));

    let report = committed.delivery.await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(clinic.sender.sent_to(&clinic.doctor.email).len(), 1);
    let to_patient = clinic.sender.sent_to(&clinic.patient.email);
    assert_eq!(to_patient.len(), 1);
    assert!(to_patient[0].body.contains("Dr. Amina Diallo"));
}

#[tokio::test]
async fn test_concurrent_creates_for_same_slot_have_exactly_one_winner() {
    let clinic = Clinic::open().await;
    let slot = upcoming_slot(11, 0);

    let attempts = (0..16).map(|i| {
        let service = Arc::clone(&clinic.service);
        let patient_id = if i % 2 == 0 { clinic.patient.id } else { clinic.other_patient.id };
        let doctor_id = clinic.doctor.id;
        tokio::spawn(async move { service.create_appointment(patient_id, doctor_id, slot, None).await })
    });

    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(AppointmentError::SchedulingConflict { .. }));
    }
    assert_eq!(clinic.repository.len().await, 1);
}

#[tokio::test]
async fn test_conflict_reports_existing_appointment_id() {
    let clinic = Clinic::open().await;
    let slot = upcoming_slot(9, 0);

    let first = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, slot, None)
        .await
        .unwrap();

    let second = clinic
        .service
        .create_appointment(clinic.other_patient.id, clinic.doctor.id, slot, None)
        .await;

    assert_matches!(
        second,
        Err(AppointmentError::SchedulingConflict { conflicting_id: Some(id) }) if id == first.appointment.id
    );
    assert_eq!(clinic.service.check_slot(clinic.doctor.id, slot).await.unwrap(), Some(first.appointment.id));
}

#[tokio::test]
async fn test_rejects_past_instant() {
    let clinic = Clinic::open().await;
    let mut day = Utc::now().date_naive() - Duration::days(7);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day.pred_opt().unwrap();
    }

    let result = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, at(day, 10, 0), None)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidDate(msg)) if msg == "must be in the future");
}

#[tokio::test]
async fn test_rejects_instant_beyond_horizon() {
    let clinic = Clinic::open().await;
    let mut day = Utc::now().date_naive().checked_add_months(Months::new(7)).unwrap();
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day.succ_opt().unwrap();
    }

    let result = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, at(day, 10, 0), None)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidDate(msg)) if msg == "exceeds booking horizon");
}

#[tokio::test]
async fn test_rejects_weekend() {
    let clinic = Clinic::open().await;

    let result = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, at(upcoming_saturday(), 10, 0), None)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidDate(msg)) if msg == "weekends not bookable");
}

#[tokio::test]
async fn test_rejects_outside_working_hours() {
    let clinic = Clinic::open().await;

    for (hour, minute) in [(7, 30), (18, 0), (22, 0)] {
        let result = clinic
            .service
            .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(hour, minute), None)
            .await;
        assert_matches!(result, Err(AppointmentError::InvalidDate(msg)) if msg == "outside working hours");
    }
}

#[tokio::test]
async fn test_rejects_misaligned_slot() {
    let clinic = Clinic::open().await;

    let result = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(10, 15), None)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidSlot(msg)) if msg == "must align to half-hour");
    assert!(clinic.repository.is_empty().await);
}

#[tokio::test]
async fn test_create_requires_existing_doctor_and_patient() {
    let clinic = Clinic::open().await;
    let slot = upcoming_slot(10, 0);

    let unknown_doctor = clinic
        .service
        .create_appointment(clinic.patient.id, Uuid::new_v4(), slot, None)
        .await;
    assert_matches!(unknown_doctor, Err(AppointmentError::NotFound(_)));

    // A patient id in the doctor field is not a doctor.
    let wrong_role = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.other_patient.id, slot, None)
        .await;
    assert_matches!(wrong_role, Err(AppointmentError::NotFound(msg)) if msg.contains("doctor"));
}

// ==============================================================================
// STATUS CHANGES
// ==============================================================================

#[tokio::test]
async fn test_cancel_frees_slot_for_rebooking() {
    let clinic = Clinic::open().await;
    let slot = upcoming_slot(14, 0);

    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, slot, None)
        .await
        .unwrap();

    let cancelled = clinic
        .service
        .cancel_appointment(booked.appointment.id, Requestor::patient(clinic.patient.id))
        .await
        .unwrap();
    assert_eq!(cancelled.appointment.status, AppointmentStatus::Cancelled);

    let rebooked = clinic
        .service
        .create_appointment(clinic.other_patient.id, clinic.doctor.id, slot, None)
        .await
        .unwrap();
    assert_eq!(rebooked.appointment.status, AppointmentStatus::Scheduled);
    assert_ne!(rebooked.appointment.id, booked.appointment.id);
}

#[tokio::test]
async fn test_cancel_notifies_both_parties() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(15, 30), None)
        .await
        .unwrap();
    booked.delivery.await.unwrap();

    let cancelled = clinic
        .service
        .cancel_appointment(booked.appointment.id, Requestor::doctor(clinic.doctor.id))
        .await
        .unwrap();
    let report = cancelled.delivery.await.unwrap();

    assert_eq!(report.delivered, 2);
    let to_patient = clinic.sender.sent_to(&clinic.patient.email);
    assert_eq!(to_patient.len(), 2);
    assert_eq!(to_patient[1].subject, "Appointment cancelled");
    assert!(to_patient[1].body.contains("by the doctor"));
}

#[tokio::test]
async fn test_only_participants_may_cancel() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(16, 0), None)
        .await
        .unwrap();

    let result = clinic
        .service
        .cancel_appointment(booked.appointment.id, Requestor::patient(clinic.other_patient.id))
        .await;

    assert_matches!(result, Err(AppointmentError::Forbidden(_)));
}

#[tokio::test]
async fn test_patient_cannot_update_status() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(10, 0), None)
        .await
        .unwrap();

    let result = clinic
        .service
        .update_appointment_status(
            booked.appointment.id,
            Requestor::patient(clinic.patient.id),
            AppointmentStatus::Completed,
            None,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Forbidden(_)));
}

#[tokio::test]
async fn test_other_doctor_cannot_update_status() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(10, 0), None)
        .await
        .unwrap();

    let result = clinic
        .service
        .update_appointment_status(
            booked.appointment.id,
            Requestor::doctor(Uuid::new_v4()),
            AppointmentStatus::NoShow,
            None,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Forbidden(_)));
}

#[tokio::test]
async fn test_terminal_states_reject_further_transitions() {
    let clinic = Clinic::open().await;
    let doctor = Requestor::doctor(clinic.doctor.id);

    for (hour, terminal) in [
        (9, AppointmentStatus::Completed),
        (10, AppointmentStatus::Cancelled),
        (11, AppointmentStatus::NoShow),
    ] {
        let booked = clinic
            .service
            .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(hour, 0), None)
            .await
            .unwrap();
        clinic
            .service
            .update_appointment_status(booked.appointment.id, doctor, terminal, None)
            .await
            .unwrap();

        let again = clinic
            .service
            .update_appointment_status(booked.appointment.id, doctor, AppointmentStatus::Completed, None)
            .await;
        assert_matches!(again, Err(AppointmentError::InvalidTransition { from, .. }) if from == terminal);

        let cancel = clinic
            .service
            .cancel_appointment(booked.appointment.id, Requestor::patient(clinic.patient.id))
            .await;
        assert_matches!(cancel, Err(AppointmentError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn test_scheduled_to_scheduled_is_invalid() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(12, 0), None)
        .await
        .unwrap();

    let result = clinic
        .service
        .update_appointment_status(
            booked.appointment.id,
            Requestor::doctor(clinic.doctor.id),
            AppointmentStatus::Scheduled,
            None,
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Scheduled
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_complete_and_cancel_have_one_winner() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(14, 30), None)
        .await
        .unwrap();
    let id = booked.appointment.id;

    let doctor_side = {
        let service = Arc::clone(&clinic.service);
        let doctor = Requestor::doctor(clinic.doctor.id);
        tokio::spawn(async move {
            service
                .update_appointment_status(id, doctor, AppointmentStatus::Completed, None)
                .await
        })
    };
    let patient_side = {
        let service = Arc::clone(&clinic.service);
        let patient = Requestor::patient(clinic.patient.id);
        tokio::spawn(async move { service.cancel_appointment(id, patient).await })
    };

    let completed = doctor_side.await.unwrap();
    let cancelled = patient_side.await.unwrap();

    let winner = match (&completed, &cancelled) {
        (Ok(c), Err(e)) => {
            assert_matches!(e, AppointmentError::InvalidTransition { .. });
            c.appointment.status
        }
        (Err(e), Ok(c)) => {
            assert_matches!(e, AppointmentError::InvalidTransition { .. });
            c.appointment.status
        }
        other => panic!("expected exactly one winner, got {:?}", other),
    };

    let stored = clinic.repository.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, winner);
}

#[tokio::test]
async fn test_lost_status_race_reports_current_status() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(15, 0), None)
        .await
        .unwrap();
    clinic
        .service
        .cancel_appointment(booked.appointment.id, Requestor::patient(clinic.patient.id))
        .await
        .unwrap();

    // A second service whose read still sees SCHEDULED; only the write can notice.
    let users = Arc::new(InMemoryUserDirectory::new());
    users.insert(clinic.doctor.clone()).await;
    users.insert(clinic.patient.clone()).await;
    let rules = SchedulingRules::default();
    let lagging = AppointmentService::new(
        Arc::new(SnapshotRepository {
            inner: Arc::clone(&clinic.repository),
        }),
        users,
        Arc::new(RecordingSender::default()) as Arc<dyn NotificationSender>,
        rules.clone(),
        MessageTemplates::new(Default::default(), rules.clinic_offset),
    );

    let result = lagging
        .update_appointment_status(
            booked.appointment.id,
            Requestor::doctor(clinic.doctor.id),
            AppointmentStatus::Completed,
            None,
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Completed
        })
    );
    let stored = clinic.repository.get(booked.appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let clinic = Clinic::open().await;

    let result = clinic
        .service
        .cancel_appointment(Uuid::new_v4(), Requestor::patient(clinic.patient.id))
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound(_)));
}

#[tokio::test]
async fn test_completion_notifies_patient_and_slot_stays_held() {
    let clinic = Clinic::open().await;
    let slot = upcoming_slot(13, 30);

    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, slot, None)
        .await
        .unwrap();
    booked.delivery.await.unwrap();

    let completed = clinic
        .service
        .update_appointment_status(
            booked.appointment.id,
            Requestor::doctor(clinic.doctor.id),
            AppointmentStatus::Completed,
            Some("Follow up in three months".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(completed.appointment.status, AppointmentStatus::Completed);
    assert_eq!(completed.appointment.notes.as_deref(), Some("Follow up in three months"));

    let report = completed.delivery.await.unwrap();
    assert_eq!(report.delivered, 1);
    let to_patient = clinic.sender.sent_to(&clinic.patient.email);
    assert_eq!(to_patient.last().unwrap().subject, "Appointment completed");
    assert!(to_patient.last().unwrap().body.contains("Follow up in three months"));
    // Booking notice only; completion goes to the patient alone.
    assert_eq!(clinic.sender.sent_to(&clinic.doctor.email).len(), 1);

    let rebook = clinic
        .service
        .create_appointment(clinic.other_patient.id, clinic.doctor.id, slot, None)
        .await;
    assert_matches!(rebook, Err(AppointmentError::SchedulingConflict { .. }));
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_booking() {
    let recorder = Arc::new(RecordingSender::default());
    let clinic = Clinic::open_with_sender(Arc::new(BrokenSender), recorder).await;

    let committed = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(10, 0), None)
        .await
        .unwrap();

    let report = committed.delivery.await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(clinic.repository.len().await, 1);
}

#[tokio::test]
async fn test_repository_outage_surfaces_as_unavailable() {
    let users = Arc::new(InMemoryUserDirectory::new());
    let doctor = shared_models::UserProfile::doctor("Gregory House", "house@clinic.test", "Diagnostics");
    let patient = shared_models::UserProfile::patient("Jane Doe", "jane@example.com");
    users.insert(doctor.clone()).await;
    users.insert(patient.clone()).await;

    let rules = SchedulingRules::default();
    let service = AppointmentService::new(
        Arc::new(OfflineRepository),
        users,
        Arc::new(RecordingSender::default()) as Arc<dyn NotificationSender>,
        rules.clone(),
        MessageTemplates::new(Default::default(), rules.clinic_offset),
    );

    let result = service
        .create_appointment(patient.id, doctor.id, upcoming_slot(10, 0), None)
        .await;

    assert_matches!(result, Err(ref e @ AppointmentError::Unavailable(_)) if e.is_retryable());
}

// ==============================================================================
// READS
// ==============================================================================

#[tokio::test]
async fn test_list_is_ordered_with_counterpart_summaries() {
    let clinic = Clinic::open().await;

    for (patient_id, hour) in [
        (clinic.patient.id, 15),
        (clinic.other_patient.id, 9),
        (clinic.patient.id, 11),
    ] {
        clinic
            .service
            .create_appointment(patient_id, clinic.doctor.id, upcoming_slot(hour, 0), None)
            .await
            .unwrap();
    }

    let for_doctor = clinic
        .service
        .list_appointments(Requestor::doctor(clinic.doctor.id))
        .await
        .unwrap();
    assert_eq!(for_doctor.len(), 3);
    assert!(for_doctor.windows(2).all(|w| w[0].date <= w[1].date));
    assert_matches!(&for_doctor[0].counterpart, Counterpart::Patient { name, .. } if name == "Lea Roy");

    let for_patient = clinic
        .service
        .list_appointments(Requestor::patient(clinic.patient.id))
        .await
        .unwrap();
    assert_eq!(for_patient.len(), 2);
    assert_matches!(
        &for_patient[0].counterpart,
        Counterpart::Doctor { specialty: Some(s), .. } if s == "Cardiology"
    );
}

#[tokio::test]
async fn test_get_is_limited_to_participants() {
    let clinic = Clinic::open().await;
    let booked = clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, upcoming_slot(10, 0), None)
        .await
        .unwrap();

    let seen = clinic
        .service
        .get_appointment(booked.appointment.id, Requestor::doctor(clinic.doctor.id))
        .await
        .unwrap();
    assert_eq!(seen.id, booked.appointment.id);

    let stranger = clinic
        .service
        .get_appointment(booked.appointment.id, Requestor::patient(clinic.other_patient.id))
        .await;
    assert_matches!(stranger, Err(AppointmentError::Forbidden(_)));
}

#[tokio::test]
async fn test_available_slots_exclude_booked_instants() {
    let clinic = Clinic::open().await;
    let day = upcoming_weekday();

    let all = clinic.service.available_slots(clinic.doctor.id, day).await.unwrap();
    assert_eq!(all.len(), 20);
    assert_eq!(all[0], at(day, 8, 0));
    assert_eq!(*all.last().unwrap(), at(day, 17, 30));

    clinic
        .service
        .create_appointment(clinic.patient.id, clinic.doctor.id, at(day, 8, 30), None)
        .await
        .unwrap();

    let remaining = clinic.service.available_slots(clinic.doctor.id, day).await.unwrap();
    assert_eq!(remaining.len(), 19);
    assert!(!remaining.contains(&at(day, 8, 30)));
}

#[tokio::test]
async fn test_available_slots_on_weekend_is_empty() {
    let clinic = Clinic::open().await;

    let slots = clinic
        .service
        .available_slots(clinic.doctor.id, upcoming_saturday())
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn test_available_slots_for_unknown_doctor() {
    let clinic = Clinic::open().await;

    let result = clinic.service.available_slots(Uuid::new_v4(), upcoming_weekday()).await;

    assert_matches!(result, Err(AppointmentError::NotFound(_)));
}
