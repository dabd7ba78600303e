use serde::{Deserialize, Serialize};

use super::{Entity, HasPhase, Resource};

pub struct ApiKey;

impl Entity for ApiKey {
    const KIND: &'static str = "ApiKey";
    type Spec = ApiKeySpec;
    type Status = ApiKeyStatus;
}

pub type ApiKeyResource = Resource<ApiKey>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySpec {
    /// A one-way hash of the secret key material; the plaintext key is
    /// handed to the user once at creation time by the (out-of-scope)
    /// gateway and never stored here.
    pub key_hash: String,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ApiKeyPhase {
    Pending,
    Created,
    Expired,
}

impl Default for ApiKeyPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl ApiKeyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
            Self::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeyStatus {
    pub phase: ApiKeyPhase,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl HasPhase for ApiKeyStatus {
    fn phase(&self) -> &str {
        self.phase.as_str()
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
