//! Credentials, session records and the authority-facing verifier interface.
//! Keep the public surface thin and split implementation across sub-modules.

mod token;
mod session;
mod credential;
mod verifier;
mod introspection;

pub use token::{Token, BEARER};
pub use session::{SessionRecord, AuthenticatedIdentity};
pub use credential::{Credential, extract_credential, bearer_token};
pub use verifier::{Introspection, TokenVerifier};
pub use introspection::{HttpTokenVerifier, IntrospectionResponse, permissions_from_scope};
