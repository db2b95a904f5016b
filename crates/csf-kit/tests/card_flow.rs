mod common;

use std::time::{Duration, Instant};

use common::*;
use csf_core::{
    errors::{CommandError, FrameLoadReason, PayloadError, ProtocolAnomaly},
    types::{Brand, ErrorCode, FieldName},
    wire::MessageType,
};
use csf_kit::{events::CsfEvent, setup::Delivery};
use serde_json::json;

#[tokio::test]
async fn test_all_frames_ready_once() {
    let (mut handle, log) = card(config()).await;
    let events = record(&mut handle);

    handshake_all(&mut handle, &log);

    assert_eq!(*events.borrow(), vec![CsfEvent::AllFramesReady]);
    assert!(handle.composite_state().all_frames_ready);
}

#[tokio::test]
async fn test_luhn_failure() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);

    for (field, value) in [
        (FieldName::ExpiryDate, "enc-exp"),
        (FieldName::SecurityCode, "enc-cvc"),
    ] {
        frame_says(
            &mut handle,
            &log,
            &field,
            "valid",
            json!({ "encryptedValue": value }),
        );
    }
    let events = record(&mut handle);

    let delivery = frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "invalid",
        json!({ "errorCode": "luhnCheckFailed" }),
    );

    assert_eq!(delivery, Delivery::Applied);

    let state = handle.field_state(&FieldName::CardNumber).unwrap();
    assert!(!state.is_valid());
    assert!(!state.is_empty());
    assert_eq!(state.error_code(), Some(&ErrorCode::LUHN_CHECK_FAILED));

    let composite = handle.composite_state();
    assert!(!composite.all_valid);
    assert_eq!(composite.number_of_valid_fields, 2);
    assert_eq!(composite.last_error_field, Some(FieldName::CardNumber));

    let events = events.borrow();
    let validations: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CsfEvent::FieldValidation { field, state } => Some((field, state)),
            _ => None,
        })
        .collect();
    assert_eq!(validations.len(), 1);
    assert_eq!(validations[0].0, &FieldName::CardNumber);
    assert_eq!(
        validations[0].1.error_code(),
        Some(&ErrorCode::LUHN_CHECK_FAILED)
    );
    assert!(!validations[0].1.is_empty());
    assert!(!events.iter().any(|e| matches!(e, CsfEvent::AllValid(_))));

    assert_eq!(
        handle.request_payload(),
        Err(PayloadError::NotReady {
            pending: vec![FieldName::CardNumber]
        })
    );
}

#[tokio::test]
async fn test_visa_card_becomes_valid() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);
    let events = record(&mut handle);

    frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "brand-detected",
        json!({ "brand": "visa" }),
    );
    // Arrival order differs from field order.
    for (field, value) in [
        (FieldName::SecurityCode, "enc-cvc"),
        (FieldName::CardNumber, "enc-pan"),
        (FieldName::ExpiryDate, "enc-exp"),
    ] {
        assert!(!handle.composite_state().all_valid);
        frame_says(
            &mut handle,
            &log,
            &field,
            "valid",
            json!({ "encryptedValue": value }),
        );
    }

    let composite = handle.composite_state();
    assert!(composite.all_valid);
    assert_eq!(composite.detected_brand, Some(Brand::new("visa")));
    assert_eq!(composite.number_of_valid_fields, 3);

    let events = events.borrow();
    assert_eq!(events[0], CsfEvent::BrandDetected(Some(Brand::new("visa"))));
    assert_eq!(events.last(), Some(&CsfEvent::AllValid(true)));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CsfEvent::AllValid(_)))
            .count(),
        1
    );

    let payload = serde_json::to_value(handle.request_payload().unwrap()).unwrap();
    assert_eq!(
        payload,
        json!({
            "encryptedCardNumber": "enc-pan",
            "encryptedExpiryDate": "enc-exp",
            "encryptedSecurityCode": "enc-cvc",
            "brand": "visa"
        })
    );
}

#[tokio::test]
async fn test_all_valid_toggles() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);
    let events = record(&mut handle);

    for field in CARD_SLOTS {
        frame_says(
            &mut handle,
            &log,
            field,
            "valid",
            json!({ "encryptedValue": "enc" }),
        );
    }
    frame_says(
        &mut handle,
        &log,
        &FieldName::ExpiryDate,
        "invalid",
        json!({ "errorCode": "expired" }),
    );

    let toggles: Vec<bool> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            CsfEvent::AllValid(valid) => Some(*valid),
            _ => None,
        })
        .collect();
    assert_eq!(toggles, vec![true, false]);
    assert_eq!(
        handle.request_payload(),
        Err(PayloadError::NotReady {
            pending: vec![FieldName::ExpiryDate]
        })
    );
}

#[tokio::test]
async fn test_payload_not_ready() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);

    frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "valid",
        json!({ "encryptedValue": "enc-pan" }),
    );

    assert_eq!(
        handle.request_payload(),
        Err(PayloadError::NotReady {
            pending: vec![FieldName::ExpiryDate, FieldName::SecurityCode]
        })
    );
}

#[tokio::test]
async fn test_forged_messages_leave_state_unchanged() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);
    let events = record(&mut handle);
    let before = handle.composite_state();

    let forged = message(
        "valid",
        &FieldName::CardNumber,
        "not-the-token",
        json!({ "encryptedValue": "enc" }),
    );
    assert_eq!(
        handle.receive(ORIGIN, &forged),
        Delivery::Dropped(ProtocolAnomaly::TokenMismatch {
            field: FieldName::CardNumber
        })
    );

    let token = log.borrow().token(&FieldName::CardNumber);
    let foreign = message(
        "valid",
        &FieldName::CardNumber,
        &token,
        json!({ "encryptedValue": "enc" }),
    );
    assert!(matches!(
        handle.receive("https://evil.example.com", &foreign),
        Delivery::Dropped(ProtocolAnomaly::OriginMismatch { .. })
    ));

    // A token is only good for the frame it was issued to.
    let crossed = message(
        "valid",
        &FieldName::SecurityCode,
        &token,
        json!({ "encryptedValue": "enc" }),
    );
    assert!(matches!(
        handle.receive(ORIGIN, &crossed),
        Delivery::Dropped(ProtocolAnomaly::TokenMismatch { .. })
    ));

    assert!(matches!(
        handle.receive(ORIGIN, "{ not json"),
        Delivery::Dropped(ProtocolAnomaly::Malformed { .. })
    ));
    assert!(matches!(
        handle.receive(
            ORIGIN,
            &message("valid", &FieldName::generic("pin"), &token, json!({}))
        ),
        Delivery::Dropped(ProtocolAnomaly::UnknownField { .. })
    ));

    assert_eq!(handle.composite_state(), before);
    assert!(events.borrow().is_empty());
}

#[tokio::test]
async fn test_unmasked_preview_rejected() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);

    let delivery = frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "valid",
        json!({ "encryptedValue": "enc", "maskedPreview": "4111111111111111" }),
    );

    assert_eq!(
        delivery,
        Delivery::Dropped(ProtocolAnomaly::RawDataRejected {
            field: FieldName::CardNumber
        })
    );
    assert!(!handle.field_state(&FieldName::CardNumber).unwrap().is_valid());
}

#[tokio::test]
async fn test_unknown_message_type_ignored() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);

    assert_eq!(
        frame_says(
            &mut handle,
            &log,
            &FieldName::CardNumber,
            "bin-lookup",
            json!({ "issuer": "x" })
        ),
        Delivery::Ignored
    );
}

#[tokio::test]
async fn test_hidden_security_code() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);

    frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "brand-detected",
        json!({ "brand": "bcmc", "cvcPolicy": "hidden" }),
    );
    for field in [FieldName::CardNumber, FieldName::ExpiryDate] {
        frame_says(
            &mut handle,
            &log,
            &field,
            "valid",
            json!({ "encryptedValue": "enc" }),
        );
    }

    let composite = handle.composite_state();
    assert!(composite.all_valid);
    assert_eq!(
        composite.required_fields,
        vec![FieldName::CardNumber, FieldName::ExpiryDate]
    );

    let payload = handle.request_payload().unwrap();
    assert_eq!(payload.fields.len(), 2);
    assert_eq!(payload.brand, Some(Brand::new("bcmc")));
}

#[tokio::test]
async fn test_unsupported_card() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);

    frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "brand-detected",
        json!({ "brand": "diners", "supported": false }),
    );

    let composite = handle.composite_state();
    assert!(composite.has_unsupported_card);
    assert_eq!(
        handle
            .field_state(&FieldName::CardNumber)
            .unwrap()
            .error_code(),
        Some(&ErrorCode::UNSUPPORTED_CARD)
    );
}

#[tokio::test]
async fn test_auto_focus_moves_to_next_field() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);
    let events = record(&mut handle);

    frame_says(&mut handle, &log, &FieldName::CardNumber, "focus", json!({}));
    frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "valid",
        json!({ "encryptedValue": "enc" }),
    );

    assert_eq!(
        log.borrow().sent(&FieldName::ExpiryDate, MessageType::Focus),
        1
    );
    assert_eq!(
        events.borrow()[0],
        CsfEvent::Focus {
            field: FieldName::CardNumber,
            focused: true
        }
    );
}

#[tokio::test]
async fn test_auto_focus_disabled() {
    let mut config = config();
    config.auto_focus = false;
    let (mut handle, log) = card(config).await;
    handshake_all(&mut handle, &log);

    frame_says(&mut handle, &log, &FieldName::CardNumber, "focus", json!({}));
    frame_says(
        &mut handle,
        &log,
        &FieldName::CardNumber,
        "valid",
        json!({ "encryptedValue": "enc" }),
    );

    assert_eq!(
        log.borrow().sent(&FieldName::ExpiryDate, MessageType::Focus),
        0
    );
}

#[tokio::test]
async fn test_load_timeout() {
    let (mut handle, log) = card(config()).await;
    let events = record(&mut handle);
    frame_says(&mut handle, &log, &FieldName::CardNumber, "handshake", json!({}));

    assert!(handle.poll_timeouts(Instant::now()).is_empty());

    let failures = handle.poll_timeouts(Instant::now() + Duration::from_secs(16));
    let failed: Vec<FieldName> = failures.iter().map(|f| f.field.clone()).collect();
    assert_eq!(failed, vec![FieldName::ExpiryDate, FieldName::SecurityCode]);
    assert!(matches!(
        failures[0].reason,
        FrameLoadReason::Timeout { .. }
    ));

    assert!(
        handle
            .field_state(&FieldName::ExpiryDate)
            .unwrap()
            .is_degraded()
    );
    assert_eq!(
        events
            .borrow()
            .iter()
            .filter(|e| matches!(e, CsfEvent::FrameLoadFailed(_)))
            .count(),
        2
    );

    // The card number keeps working.
    assert_eq!(
        frame_says(&mut handle, &log, &FieldName::CardNumber, "focus", json!({})),
        Delivery::Applied
    );
    assert!(
        handle
            .poll_timeouts(Instant::now() + Duration::from_secs(60))
            .is_empty()
    );
}

#[tokio::test]
async fn test_recreate_field_rejects_old_token() {
    let (mut handle, log) = card(config()).await;
    handshake_all(&mut handle, &log);
    frame_says(
        &mut handle,
        &log,
        &FieldName::SecurityCode,
        "valid",
        json!({ "encryptedValue": "enc" }),
    );
    let old = log.borrow().token(&FieldName::SecurityCode);

    handle.recreate_field(&FieldName::SecurityCode).unwrap();

    let new = log.borrow().token(&FieldName::SecurityCode);
    assert_ne!(old, new);
    assert_eq!(log.borrow().unmounted, vec![FieldName::SecurityCode]);
    assert!(!handle.field_state(&FieldName::SecurityCode).unwrap().is_valid());

    let late = message(
        "valid",
        &FieldName::SecurityCode,
        &old,
        json!({ "encryptedValue": "enc" }),
    );
    assert!(matches!(
        handle.receive(ORIGIN, &late),
        Delivery::Dropped(ProtocolAnomaly::TokenMismatch { .. })
    ));

    assert_eq!(
        frame_says(&mut handle, &log, &FieldName::SecurityCode, "handshake", json!({})),
        Delivery::Applied
    );
    assert_eq!(
        handle.recreate_field(&FieldName::ExpiryMonth),
        Err(CommandError::UnknownField(FieldName::ExpiryMonth))
    );
}

#[tokio::test]
async fn test_runtime_configuration() {
    let (mut handle, log) = card(config()).await;

    assert!(matches!(
        handle.set_focus(&FieldName::CardNumber),
        Err(CommandError::FieldNotReady { .. })
    ));

    handshake_all(&mut handle, &log);
    handle
        .update_styles(json!({ "base": { "color": "#000" } }))
        .unwrap();
    handle.set_disabled(true).unwrap();
    handle
        .set_placeholder(&FieldName::SecurityCode, "123")
        .unwrap();

    let log = log.borrow();
    assert_eq!(log.sent(&FieldName::CardNumber, MessageType::Configure), 2);
    assert_eq!(log.sent(&FieldName::SecurityCode, MessageType::Configure), 3);

    let last = log.posted.last().unwrap();
    assert_eq!(last.payload, json!({ "placeholder": "123" }));
    assert_eq!(
        handle.set_placeholder(&FieldName::ExpiryYear, "YY"),
        Err(CommandError::UnknownField(FieldName::ExpiryYear))
    );
}
