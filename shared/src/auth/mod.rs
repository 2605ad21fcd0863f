//! # Authentication
//!
//! API-key → environment handshake, JWT issuance/verification, and the
//! request-scoped context used to carry the result without a process-global
//! (§4.4, §9).
//!
//! ```text
//! ┌────────┐  POST /client/auth  ┌──────────────┐   lookup   ┌──────────────┐
//! │  SDK   │────{apiKey}────────>│ Auth service │───────────>│ AuthRepository│
//! └───┬────┘                     └──────┬───────┘            └──────────────┘
//!     │                                 │ mint
//!     │ {authToken}                     ▼
//!     │<─────────────────────── JwtService
//!     │
//!     │ subsequent requests carry `Authorization: Bearer <authToken>`,
//!     │ verified back into a RequestContext { environment }
//! ```

pub mod context;
pub mod jwt;
pub mod service;

pub use context::RequestContext;
pub use jwt::{Claims, JwtService};
pub use service::AuthService;
