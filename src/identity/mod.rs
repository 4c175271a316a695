//! Accounts, password hashing and the login strategies built on them.
//! Keep the public surface thin and split implementation across sub-modules.

mod account;
mod password;
mod strategy;

pub use account::{
    register_account, Account, AccountStore, JsonFileAccountStore, MemoryAccountStore, RegistrationError,
    SharedAccountStore, StoreError,
};
pub use password::{hash_password, verify_password};
pub use strategy::{
    enroll_face, AccountId, AuthnError, Authenticator, BiometricAssertion, BiometricStrategy, Denial,
    EnrollmentError, PasswordEvidence, PasswordStrategy, ACCESS_DENIED, BAD_CREDENTIALS, FACE_VERIFICATION_FAILED,
};
