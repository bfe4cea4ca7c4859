pub mod cache;
pub mod link;
pub mod mailer;
pub mod policy;
pub mod proof;
pub mod store;

pub use cache::{AccountSettings, SettingsCaches, SettingsDelta};
pub use link::LinkService;
pub use mailer::{MockMailer, SmtpMailer, VerificationMailer};
pub use policy::{UnlinkDecision, UnlinkPolicy};
pub use proof::{LinkProof, ProofVerifier};
pub use store::{
    ExternalIdentity, MemoryStore, RegistryStore, SignupMethod, StoreError, UnlinkOutcome,
};
