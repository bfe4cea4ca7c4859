pub mod api_key;
pub mod challenge;
pub mod provider;
pub mod registry;

pub use api_key::ApiKeyCredential;
pub use challenge::{
    ChallengeError, ChallengeState, ConfirmationChallenge, ConfirmationToken, UnlinkIntent, LAST_METHOD_WARNING,
};
pub use provider::{ProviderId, LOGIN_PROVIDERS};
pub use registry::{AuthMethodRegistry, AuthMethodsView, EmailBinding, LinkedState};
