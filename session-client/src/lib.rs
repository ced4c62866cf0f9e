//! Client-side half of the session: keeps a signed-in browser or service
//! session alive by renewing its access token before it expires.

pub mod renewal;

pub use common_auth::PrincipalKind;
pub use renewal::{
    HttpRenewalClient, RenewalClient, RenewalError, RenewalHandle, RenewalSchedule,
    RenewalScheduler, DEFAULT_RENEWAL_PERIOD, DEFAULT_RENEWAL_TIMEOUT,
};
