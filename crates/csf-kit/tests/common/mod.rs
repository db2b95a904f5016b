#![allow(dead_code)]

use std::{cell::RefCell, convert::Infallible, fmt::Display, rc::Rc};

use csf_core::{
    types::FieldName,
    wire::{EncryptionKey, Envelope, MessageType},
};
use csf_kit::{
    concepts::{FrameHost, FrameTransport, MountRequest},
    config::SetupConfig,
    events::CsfEvent,
    keys::StaticKeyProvider,
    setup::{SecuredFieldsHandle, initialize},
};
use serde_json::{Value, json};
use url::Url;
use url_macro::url;

pub const ORIGIN: &str = "https://checkout.example.com";

pub const CARD_SLOTS: &[FieldName] = &[
    FieldName::CardNumber,
    FieldName::ExpiryDate,
    FieldName::SecurityCode,
];

/// Everything the test host observed.
#[derive(Debug, Default)]
pub struct HostLog {
    pub mounts: Vec<(FieldName, Url)>,
    pub posted: Vec<Envelope>,
    pub unmounted: Vec<FieldName>,
}

impl HostLog {
    /// Session token from the latest handshake sent to `field`.
    pub fn token(&self, field: &FieldName) -> String {
        self.posted
            .iter()
            .rev()
            .find(|e| &e.field_name == field && e.kind == MessageType::Handshake)
            .map(|e| e.session_token.clone())
            .expect("no handshake sent to field")
    }

    pub fn sent(&self, field: &FieldName, kind: MessageType) -> usize {
        self.posted
            .iter()
            .filter(|e| &e.field_name == field && e.kind == kind)
            .count()
    }
}

#[derive(Debug)]
pub struct MountRefused(pub FieldName);

impl Display for MountRefused {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Refused to mount {}", self.0)
    }
}

impl std::error::Error for MountRefused {}

pub struct TestTransport {
    field: FieldName,
    log: Rc<RefCell<HostLog>>,
}

impl FrameTransport for TestTransport {
    type Error = Infallible;

    fn post(&mut self, envelope: &Envelope) -> Result<(), Self::Error> {
        self.log.borrow_mut().posted.push(envelope.clone());
        Ok(())
    }

    fn unmount(&mut self) {
        self.log.borrow_mut().unmounted.push(self.field.clone());
    }
}

pub struct TestHost {
    pub roots: Vec<String>,
    pub slots: Vec<FieldName>,
    pub refuse: Option<FieldName>,
    pub log: Rc<RefCell<HostLog>>,
}

impl TestHost {
    pub fn card() -> Self {
        TestHost {
            roots: vec!["#card".to_string()],
            slots: CARD_SLOTS.to_vec(),
            refuse: None,
            log: Rc::default(),
        }
    }
}

impl FrameHost for TestHost {
    type Transport = TestTransport;
    type Error = MountRefused;

    fn resolve_root(&self, selector: &str) -> bool {
        self.roots.iter().any(|r| r == selector)
    }

    fn field_slots(&self, _selector: &str) -> Vec<FieldName> {
        self.slots.clone()
    }

    fn mount(&mut self, request: MountRequest<'_>) -> Result<Self::Transport, Self::Error> {
        if self.refuse.as_ref() == Some(request.field) {
            return Err(MountRefused(request.field.clone()));
        }

        self.log
            .borrow_mut()
            .mounts
            .push((request.field.clone(), request.src.clone()));

        Ok(TestTransport {
            field: request.field.clone(),
            log: self.log.clone(),
        })
    }
}

pub fn config() -> SetupConfig {
    SetupConfig::builder()
        .root("#card")
        .client_key("test_KEY")
        .loading_context(url!("https://checkout.example.com/checkoutshopper/"))
        .build()
}

pub fn keys() -> StaticKeyProvider {
    StaticKeyProvider::shared(EncryptionKey {
        key_id: "10001".to_string(),
        public_key: "10001|C4A1B2".to_string(),
    })
}

pub type Handle = SecuredFieldsHandle<TestHost>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A card setup with every frame mounted, plus the host log.
pub async fn card(config: SetupConfig) -> (Handle, Rc<RefCell<HostLog>>) {
    init_tracing();
    let host = TestHost::card();
    let log = host.log.clone();
    let handle = initialize(Some(config), host, &keys()).await.unwrap();
    (handle, log)
}

/// Collects every event delivered to a subscriber.
pub fn record(handle: &mut Handle) -> Rc<RefCell<Vec<CsfEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    handle.subscribe(move |e: &CsfEvent| sink.borrow_mut().push(e.clone()));
    events
}

pub fn message(kind: &str, field: &FieldName, token: &str, payload: Value) -> String {
    json!({
        "type": kind,
        "fieldName": field.as_str(),
        "sessionToken": token,
        "payload": payload
    })
    .to_string()
}

/// Frame side of the conversation: replies with the token the host handed over.
pub fn frame_says(
    handle: &mut Handle,
    log: &Rc<RefCell<HostLog>>,
    field: &FieldName,
    kind: &str,
    payload: Value,
) -> csf_kit::setup::Delivery {
    let token = log.borrow().token(field);
    handle.receive(ORIGIN, &message(kind, field, &token, payload))
}

pub fn handshake_all(handle: &mut Handle, log: &Rc<RefCell<HostLog>>) {
    for field in handle.fields() {
        frame_says(handle, log, &field, "handshake", json!({}));
    }
}
