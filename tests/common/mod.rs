//! Test utilities and fixtures for mokkalab integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

pub use mokkalab::db::{init_db, queries};
pub use mokkalab::email::{EmailSendResult, Mailer, OutgoingEmail};
pub use mokkalab::error::{AppError, Result};
pub use mokkalab::fulfillment::{
    CheckoutEvent, CheckoutOutcome, EventAddress, EventLineItem, RefundOutcome, Services,
};
pub use mokkalab::invoice::{CreatedDocument, DocumentRequest, InvoiceProvider};
pub use mokkalab::models::*;
pub use mokkalab::order_number::RandomSource;
pub use mokkalab::payments::{CheckoutKind, StandardOrderMeta};

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}

// ============ Mock providers ============

/// Invoice provider that records requests instead of calling out.
#[derive(Default)]
pub struct MockInvoiceProvider {
    pub requests: Mutex<Vec<DocumentRequest>>,
    pub fail: AtomicBool,
    counter: AtomicUsize,
}

impl MockInvoiceProvider {
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvoiceProvider for MockInvoiceProvider {
    async fn create_document(&self, request: &DocumentRequest) -> Result<CreatedDocument> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("invoice provider unavailable".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        Ok(CreatedDocument {
            id: format!("doc_{}", n),
            number: request.number.clone(),
        })
    }

    async fn fetch_pdf(&self, _document_id: &str) -> Result<Vec<u8>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("invoice provider unavailable".into()));
        }
        Ok(b"%PDF-1.4 mock".to_vec())
    }
}

/// Mailer that records outgoing mail instead of sending.
#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: AtomicBool,
}

impl MockMailer {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailSendResult> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("mail provider unavailable".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(EmailSendResult::Sent)
    }
}

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Deterministic randomness: scripted values first, then a counter encoded
/// in base36 (unique per call).
#[derive(Default)]
pub struct TestRng {
    counter: AtomicUsize,
    scripted: Mutex<VecDeque<String>>,
}

impl TestRng {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue fixed values to be returned by the next `base36` calls.
    pub fn script(&self, values: &[&str]) {
        let mut scripted = self.scripted.lock().unwrap();
        for v in values {
            scripted.push_back(v.to_string());
        }
    }
}

impl RandomSource for TestRng {
    fn base36(&self, len: usize) -> String {
        if let Some(v) = self.scripted.lock().unwrap().pop_front() {
            return v;
        }
        let mut n = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut chars = vec![b'0'; len];
        for slot in chars.iter_mut().rev() {
            *slot = BASE36[n % 36];
            n /= 36;
        }
        String::from_utf8(chars).unwrap()
    }

    fn pick_index(&self, _len: usize) -> usize {
        0
    }
}

/// Bundle of mock services plus handles to inspect them.
pub struct TestServices {
    pub services: Services,
    pub invoices: Arc<MockInvoiceProvider>,
    pub mailer: Arc<MockMailer>,
    pub rng: Arc<TestRng>,
}

pub fn test_services() -> TestServices {
    let invoices = Arc::new(MockInvoiceProvider::default());
    let mailer = Arc::new(MockMailer::default());
    let rng = Arc::new(TestRng::new());
    let services = Services {
        invoices: invoices.clone(),
        mailer: mailer.clone(),
        rng: rng.clone(),
        internal_notification_email: Some("bestellungen@mokkalab.de".to_string()),
    };
    TestServices {
        services,
        invoices,
        mailer,
        rng,
    }
}

// ============ Fixtures ============

pub fn create_test_product(conn: &Connection, name: &str, brand: &str) -> Product {
    queries::create_product(
        conn,
        &CreateProduct {
            name: name.to_string(),
            brand: brand.to_string(),
            active: true,
        },
    )
    .expect("Failed to create test product")
}

pub fn create_test_variant(
    conn: &Connection,
    product_id: &str,
    name: &str,
    price_cents: i64,
    stock: i64,
) -> ProductVariant {
    queries::create_product_variant(
        conn,
        product_id,
        &CreateProductVariant {
            name: name.to_string(),
            price_cents,
            stock,
        },
    )
    .expect("Failed to create test variant")
}

/// A standard-order checkout event with no line items yet.
pub fn standard_event(session_id: &str, email: &str) -> CheckoutEvent {
    CheckoutEvent {
        checkout_session_id: session_id.to_string(),
        payment_intent_id: Some(format!("pi_{}", session_id)),
        provider_subscription_id: None,
        contact: CustomerContact {
            email: email.to_string(),
            first_name: Some("Anna".to_string()),
            last_name: Some("Bergmann".to_string()),
            phone: None,
            stripe_customer_id: Some("cus_test".to_string()),
        },
        shipping: Some(EventAddress {
            name: Some("Anna Bergmann".to_string()),
            street: Some("Hauptstr. 1".to_string()),
            postal_code: Some("50667".to_string()),
            city: Some("Koeln".to_string()),
            country: Some("DE".to_string()),
        }),
        billing: None,
        line_items: Vec::new(),
        currency: "eur".to_string(),
        subtotal_cents: 0,
        discount_cents: 0,
        shipping_cents: 0,
        total_cents: 0,
        kind: CheckoutKind::StandardOrder(StandardOrderMeta::default()),
    }
}

/// Add a purchased line for a catalog variant and keep the totals in sync.
pub fn push_line(
    event: &mut CheckoutEvent,
    product: &Product,
    variant: &ProductVariant,
    quantity: i64,
) {
    let total = variant.price_cents * quantity;
    event.line_items.push(EventLineItem {
        product_id: product.id.clone(),
        variant_id: variant.id.clone(),
        product_name: product.name.clone(),
        variant_name: variant.name.clone(),
        quantity,
        unit_price_cents: variant.price_cents,
        total_price_cents: total,
    });
    event.subtotal_cents += total;
    event.total_cents = event.subtotal_cents - event.discount_cents + event.shipping_cents;
}

/// Replace the standard-order metadata of an event.
pub fn set_standard_meta(event: &mut CheckoutEvent, meta: StandardOrderMeta) {
    event.kind = CheckoutKind::StandardOrder(meta);
}

/// Create a customer with a referral code, the starting point for referral
/// scenarios.
pub fn setup_referrer(
    conn: &Connection,
    rng: &dyn RandomSource,
    email: &str,
) -> (Customer, ReferralCode) {
    let customer = queries::upsert_customer(
        conn,
        &CustomerContact {
            email: email.to_string(),
            first_name: Some("Referrer".to_string()),
            last_name: None,
            phone: None,
            stripe_customer_id: None,
        },
    )
    .expect("Failed to create referrer");
    let code = queries::ensure_referral_code(conn, &customer.id, rng)
        .expect("Failed to create referral code");
    (customer, code)
}
