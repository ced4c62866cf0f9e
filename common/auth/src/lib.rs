pub mod claims;
pub mod codec;
pub mod config;
pub mod cookies;
pub mod error;
pub mod extractors;
pub mod gate;
pub mod guards;
pub mod principal;

pub use claims::{AccessClaims, RenewalClaims, ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS};
pub use codec::{decode_unverified, EdgeCodec, JwtCodec, TokenCodec, TokenKind, UnverifiedToken};
pub use config::{CodecConfig, TokenSecret};
pub use cookies::{CookieSet, CookieSettings, SameSite, SessionCookieStore};
pub use error::{AuthError, AuthResult};
pub use extractors::{AdminSession, CustomerSession};
pub use gate::{
    canonical_path, classify, inject_context_headers, normalize_path, strip_context_headers,
    AuthorizationGate, GateDecision, GateOutcome, RouteClass,
};
pub use guards::{ensure_branch_scope, ensure_org_admin, GuardError};
pub use principal::{
    AdminPrincipal, AdminRole, CustomerPrincipal, Principal, PrincipalKind, Session,
};
