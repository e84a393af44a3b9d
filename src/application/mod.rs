//! Application layer holding the stateful parts of the bridge.
//!
//! `PaymentBridge` owns the session and is the only entry point the host and
//! the native SDK talk to. It drives the `EphemeralKeyRelay` and the
//! `WalletContinuationBridge`, both of which park long waits as one-shot
//! handles instead of holding the session lock.

pub mod coordinator;
pub mod key_relay;
pub mod wallet_bridge;
