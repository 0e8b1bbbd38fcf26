//! Read-only health report over credential, artifact and session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::artifact::{self, ArtifactReport};
use crate::catalogue::ToolDescriptor;
use crate::model::ModelGateway;
use crate::supervisor::{GatewayFactory, SessionSupervisor};
use crate::transport::Launcher;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialCheck {
    pub exists: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionCheck {
    pub initialized: bool,
    pub tools_available: bool,
    pub tools: Vec<ToolDescriptor>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    /// RFC 3339.
    pub timestamp: DateTime<Utc>,
    pub credential: CredentialCheck,
    pub artifact: ArtifactReport,
    pub session: SessionCheck,
}

/// Gathers a [`DiagnosticsReport`] without touching session state.
///
/// Each check fails on its own; a failed check never hides the others.
pub struct DiagnosticsProbe<'a, F: GatewayFactory, L: Launcher> {
    supervisor: &'a SessionSupervisor<F, L>,
}

impl<'a, F: GatewayFactory, L: Launcher> DiagnosticsProbe<'a, F, L> {
    pub fn new(supervisor: &'a SessionSupervisor<F, L>) -> Self {
        Self { supervisor }
    }

    pub async fn run(&self) -> DiagnosticsReport {
        let config = self.supervisor.config();
        let credential = self.check_credential().await;
        // Inspection heals missing execute permission, as connecting would.
        let artifact = artifact::inspect(&config.artifact);
        let status = self.supervisor.status();

        debug!(
            credential_valid = credential.valid,
            artifact_exists = artifact.exists,
            initialized = status.initialized,
            "diagnostics collected"
        );

        DiagnosticsReport {
            timestamp: Utc::now(),
            credential,
            artifact,
            session: SessionCheck {
                initialized: status.initialized,
                tools_available: status.tools_available,
                tools: status.tools,
                error: status.last_error,
            },
        }
    }

    async fn check_credential(&self) -> CredentialCheck {
        let Some(credential) = &self.supervisor.config().credential else {
            return CredentialCheck {
                error: Some("ANTHROPIC_API_KEY is not set".to_string()),
                ..CredentialCheck::default()
            };
        };

        let gateway = self.supervisor.gateway_factory().build(credential);
        match gateway.list_models().await {
            Ok(models) => CredentialCheck {
                exists: true,
                valid: true,
                models,
                error: None,
            },
            Err(e) => CredentialCheck {
                exists: true,
                valid: false,
                models: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}
