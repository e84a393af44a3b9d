//! Value types shared by the bridge components and the ports through which
//! the bridge talks to the native SDK, the wallet and preference storage.

pub mod amount;
pub mod callback;
pub mod config;
pub mod ports;
pub mod session;
pub mod wallet;
