// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared setup for the integration tests.

#![allow(dead_code)]

use tandem::Doc;
use tandem::StateVector;
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tandem=info".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

/// Send `from` everything `to` is missing, V1.
pub fn sync_into(from: &Doc, to: &mut Doc) {
    let update = from.encode_state_as_update_v1(&to.state_vector());
    to.apply_update_v1(&update).unwrap();
}

/// Bring two documents up to date with each other.
pub fn sync_both(a: &mut Doc, b: &mut Doc) {
    sync_into(a, b);
    sync_into(b, a);
}

/// A full V1 update of `doc`.
pub fn full_update(doc: &Doc) -> Vec<u8> {
    return doc.encode_state_as_update_v1(&StateVector::new());
}
