//! A card form with simulated frames: each frame answers its handshake, the shopper types a
//! visa card, and the encrypted payload is printed on submit.

use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

use csf_core::{
    types::FieldName,
    wire::{EncryptionKey, Envelope, MessageType},
};
use csf_kit::{
    concepts::{FrameHost, FrameTransport, MountRequest},
    config::{Callbacks, SetupConfig},
    keys::StaticKeyProvider,
    setup::initialize,
};
use serde_json::json;
use url_macro::url;

const ORIGIN: &str = "https://checkoutshopper-test.example.com";

type Outbox = Rc<RefCell<VecDeque<Envelope>>>;

struct PageTransport(Outbox);

impl FrameTransport for PageTransport {
    type Error = Infallible;

    fn post(&mut self, envelope: &Envelope) -> Result<(), Self::Error> {
        self.0.borrow_mut().push_back(envelope.clone());
        Ok(())
    }

    fn unmount(&mut self) {}
}

struct Page(Outbox);

impl FrameHost for Page {
    type Transport = PageTransport;
    type Error = Infallible;

    fn resolve_root(&self, selector: &str) -> bool {
        selector == "#card-container"
    }

    fn field_slots(&self, _selector: &str) -> Vec<FieldName> {
        vec![
            FieldName::CardNumber,
            FieldName::ExpiryDate,
            FieldName::SecurityCode,
        ]
    }

    fn mount(&mut self, request: MountRequest<'_>) -> Result<Self::Transport, Self::Error> {
        tracing::info!("Mounting {} from {}", request.field, request.src);
        Ok(PageTransport(self.0.clone()))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let outbox = Outbox::default();
    let keys = StaticKeyProvider::shared(EncryptionKey {
        key_id: "10001".to_string(),
        public_key: "10001|B7C2".to_string(),
    });

    let config = SetupConfig::builder()
        .root("#card-container")
        .client_key("test_CLIENTKEY")
        .loading_context(url!("https://checkoutshopper-test.example.com/checkoutshopper/"))
        .callbacks(
            Callbacks::new()
                .on_brand_detected(|brand| tracing::info!("Brand: {brand:?}"))
                .on_all_valid(|valid| tracing::info!("All valid: {valid}")),
        )
        .build();

    let mut handle = initialize(Some(config), Page(outbox.clone()), &keys)
        .await
        .expect("Secured fields failed to initialize");

    // Frames echo the token from their handshake.
    let mut tokens = Vec::new();
    while let Some(envelope) = outbox.borrow_mut().pop_front() {
        if envelope.kind == MessageType::Handshake {
            tokens.push((envelope.field_name, envelope.session_token));
        }
    }
    for (field, token) in &tokens {
        reply(&mut handle, field, token, "handshake", json!({}));
    }

    for (field, token) in &tokens {
        if field.is_card_number() {
            reply(&mut handle, field, token, "brand-detected", json!({ "brand": "visa" }));
        }
        reply(
            &mut handle,
            field,
            token,
            "valid",
            json!({ "encryptedValue": format!("enc_v1${field}") }),
        );
    }

    let payload = handle
        .request_payload()
        .expect("Card should be complete");
    println!("{}", serde_json::to_string_pretty(&payload).unwrap());
}

fn reply<H: FrameHost>(
    handle: &mut csf_kit::setup::SecuredFieldsHandle<H>,
    field: &FieldName,
    token: &str,
    kind: &str,
    payload: serde_json::Value,
) {
    let message = json!({
        "type": kind,
        "fieldName": field,
        "sessionToken": token,
        "payload": payload
    });
    let delivery = handle.receive(ORIGIN, &message.to_string());
    tracing::debug!("{kind} from {field}: {delivery:?}");
}
